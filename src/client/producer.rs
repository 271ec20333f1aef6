//! Publishing side of the facade.
//!
//! A [`ProducerSession`] opens a connection, session and producer for
//! every send and releases all three on every exit path. The per-call
//! setup cost buys isolation: a failure on one send cannot corrupt state
//! for the next, and concurrent callers never share anything, so no
//! locking is needed. Instances are caller-owned; there is no hidden
//! process-wide producer state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::broker::api::{BrokerConnection, BrokerConnector, BrokerSession};
use crate::client::endpoint::{BrokerEndpoint, Destination, DestinationKind};
use crate::client::message::Message;
use crate::codec::Codec;
use crate::observer::{BrokerEvent, EventObserver};
use crate::utils::error::SendError;

/// Default time-to-live for queue messages when the message leaves it unset.
pub const DEFAULT_QUEUE_TTL: Duration = Duration::from_secs(3600);
/// Default time-to-live for topic messages. Broadcasts age out faster
/// than point-to-point work items.
pub const DEFAULT_TOPIC_TTL: Duration = Duration::from_secs(1800);

/// Producer-side facade. Arm it with [`ProducerSession::init`] before
/// sending; an unarmed producer refuses every send without touching the
/// network.
pub struct ProducerSession {
    connector: Arc<dyn BrokerConnector>,
    observer: Arc<dyn EventObserver>,
    endpoint: Option<BrokerEndpoint>,
    queue_ttl: Duration,
    topic_ttl: Duration,
}

impl ProducerSession {
    pub fn new(connector: Arc<dyn BrokerConnector>, observer: Arc<dyn EventObserver>) -> Self {
        Self {
            connector,
            observer,
            endpoint: None,
            queue_ttl: DEFAULT_QUEUE_TTL,
            topic_ttl: DEFAULT_TOPIC_TTL,
        }
    }

    /// Arms the producer with a broker endpoint.
    pub fn init(&mut self, endpoint: BrokerEndpoint) {
        self.endpoint = Some(endpoint);
    }

    pub fn is_initialized(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Overrides the per-kind default time-to-live values.
    pub fn with_default_ttls(mut self, queue_ttl: Duration, topic_ttl: Duration) -> Self {
        self.queue_ttl = queue_ttl;
        self.topic_ttl = topic_ttl;
        self
    }

    /// Sends one message: connection, session and producer are opened for
    /// this call and released again on every path, including failures.
    ///
    /// A message without an explicit time-to-live gets the default for
    /// the destination kind.
    pub fn send(&self, destination: &Destination, mut message: Message) -> Result<(), SendError> {
        let endpoint = self.endpoint.as_ref().ok_or(SendError::NotInitialized)?;

        if message.time_to_live.is_none() {
            message.time_to_live = Some(match destination.kind {
                DestinationKind::Queue => self.queue_ttl,
                DestinationKind::Topic => self.topic_ttl,
            });
        }

        let connection = self.connector.create_connection(&endpoint.uri)?;
        connection.set_request_timeout(endpoint.request_timeout);

        let result = self.send_on_connection(connection.as_ref(), endpoint, destination, message);

        if let Err(e) = connection.close() {
            self.observer.notify(BrokerEvent::warn(
                "teardown",
                format!("failed to close producer connection: {e}"),
            ));
        }
        result
    }

    fn send_on_connection(
        &self,
        connection: &dyn BrokerConnection,
        endpoint: &BrokerEndpoint,
        destination: &Destination,
        message: Message,
    ) -> Result<(), SendError> {
        connection.start().map_err(SendError::from)?;
        let session = connection
            .create_session(endpoint.ack_mode)
            .map_err(SendError::from)?;

        let result = self.send_on_session(session.as_ref(), destination, message);

        if let Err(e) = session.close() {
            self.observer.notify(BrokerEvent::warn(
                "teardown",
                format!("failed to close producer session: {e}"),
            ));
        }
        result
    }

    fn send_on_session(
        &self,
        session: &dyn BrokerSession,
        destination: &Destination,
        message: Message,
    ) -> Result<(), SendError> {
        let producer = session.create_producer(destination)?;
        let result = producer.send(message);

        if let Err(e) = producer.close() {
            self.observer.notify(BrokerEvent::warn(
                "teardown",
                format!("failed to close producer: {e}"),
            ));
        }
        result
    }

    /// Convenience: sends `text` with default delivery guarantees.
    pub fn send_text(&self, destination: &Destination, text: &str) -> Result<(), SendError> {
        self.send(destination, Message::text(text))
    }

    /// Serializes `value` through `codec` and sends the result as text.
    /// An encoding failure makes no broker call at all.
    pub fn send_object<T, C>(
        &self,
        destination: &Destination,
        value: &T,
        codec: &C,
    ) -> Result<(), SendError>
    where
        T: Serialize,
        C: Codec,
    {
        let text = codec
            .encode(value)
            .map_err(|e| SendError::EncodingFailed(e.to_string()))?;
        self.send(destination, Message::text(text))
    }
}
