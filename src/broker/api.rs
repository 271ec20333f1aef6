//! Traits describing the broker client surface the facade is built on.
//!
//! This is the shape of an NMS-style messaging client: a connector hands
//! out connections, a connection owns sessions, a session creates
//! consumers and producers. The facade depends only on these traits, so
//! any broker client with this surface can sit behind it — the in-process
//! broker in [`crate::broker::memory`] and the WebSocket connector in
//! [`crate::transport::connector`] are the two implementations shipped
//! here.

use std::sync::Arc;
use std::time::Duration;

use crate::client::endpoint::{AckMode, Destination};
use crate::client::message::Message;
use crate::utils::error::{CloseError, ConnectError, SendError, SubscribeError};

/// Callback invoked for every message delivered to a consumer.
///
/// Implementations of [`BrokerSession::create_consumer`] must call the
/// listener with at most one in-flight invocation at a time: the next
/// message is handed over only after the previous call returns. This
/// single-threaded delivery is a load-bearing invariant of the facade,
/// not an accident — handlers that need parallelism must fan out to
/// their own workers.
///
/// The listener is shared, so implementations can clone it out of any
/// internal registry and invoke it without holding their own locks;
/// handlers are allowed to re-enter the consumer surface (for example to
/// unsubscribe themselves).
pub type MessageListener = Arc<dyn Fn(Message) + Send + Sync>;

/// Connection-level event callbacks, registered before the connection
/// is started. All three fire on broker client threads.
#[derive(Clone)]
pub struct ConnectionEvents {
    pub on_exception: Arc<dyn Fn(String) + Send + Sync>,
    pub on_interrupted: Arc<dyn Fn() + Send + Sync>,
    pub on_resumed: Arc<dyn Fn() + Send + Sync>,
}

impl ConnectionEvents {
    /// Events that ignore every callback. Used as the initial state
    /// before the facade registers its own.
    pub fn noop() -> Self {
        Self {
            on_exception: Arc::new(|_| {}),
            on_interrupted: Arc::new(|| {}),
            on_resumed: Arc::new(|| {}),
        }
    }
}

/// Entry point of a broker client: resolves a URI into a connection.
pub trait BrokerConnector: Send + Sync {
    fn create_connection(&self, uri: &str) -> Result<Box<dyn BrokerConnection>, ConnectError>;
}

/// A live (or at least established) connection to the broker.
pub trait BrokerConnection: Send + Sync {
    fn set_client_id(&self, client_id: &str);

    fn set_request_timeout(&self, timeout: Duration);

    fn set_event_listeners(&self, events: ConnectionEvents);

    fn start(&self) -> Result<(), ConnectError>;

    fn stop(&self) -> Result<(), CloseError>;

    fn create_session(&self, ack_mode: AckMode) -> Result<Box<dyn BrokerSession>, ConnectError>;

    fn close(&self) -> Result<(), CloseError>;
}

impl std::fmt::Debug for dyn BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection").finish_non_exhaustive()
    }
}

/// A session scoped to one connection. Cannot outlive it: closing the
/// connection invalidates every session created from it.
pub trait BrokerSession: Send + Sync {
    fn create_consumer(
        &self,
        destination: &Destination,
        listener: MessageListener,
    ) -> Result<Box<dyn BrokerConsumer>, SubscribeError>;

    fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn BrokerProducer>, SendError>;

    /// Whether the session (and its parent connection) is still usable.
    /// Used to re-validate state after a connection resume.
    fn is_open(&self) -> bool;

    fn close(&self) -> Result<(), CloseError>;
}

/// A registered consumer. Dropping it without calling `close` leaks the
/// broker-side subscription until the session closes.
pub trait BrokerConsumer: Send + Sync {
    fn close(&self) -> Result<(), CloseError>;
}

/// A producer bound to one destination.
pub trait BrokerProducer: Send + Sync {
    fn send(&self, message: Message) -> Result<(), SendError>;

    fn close(&self) -> Result<(), CloseError>;
}
