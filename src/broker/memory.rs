//! In-process broker backing the facade in tests and demos.
//!
//! `InMemoryBroker` implements the full connector surface from
//! [`crate::broker::api`] on top of the routing [`Engine`]. Each consumer
//! gets its own forward loop spawned on the broker's runtime, fed by an
//! unbounded channel, so listener invocations are strictly serialized per
//! consumer. The broker also counts every open/close/send and exposes
//! hooks to simulate connection-level events, which is what the facade
//! tests drive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;

use crate::broker::api::{
    BrokerConnection, BrokerConnector, BrokerConsumer, BrokerProducer, BrokerSession,
    ConnectionEvents, MessageListener,
};
use crate::broker::engine::Engine;
use crate::broker::route::SubscriberId;
use crate::client::endpoint::{AckMode, Destination};
use crate::client::message::Message;
use crate::utils::error::{CloseError, ConnectError, SendError, SubscribeError};

/// Counts of every call crossing the broker boundary. Tests assert on
/// these to verify, for example, that an uninitialized producer performs
/// zero broker calls or that every opened resource was closed.
#[derive(Debug, Default)]
pub struct BrokerCounters {
    pub connections_opened: AtomicUsize,
    pub connections_closed: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub consumers_opened: AtomicUsize,
    pub consumers_closed: AtomicUsize,
    pub producers_opened: AtomicUsize,
    pub producers_closed: AtomicUsize,
    pub messages_sent: AtomicUsize,
}

struct ConnEntry {
    closed: Arc<AtomicBool>,
    events: Arc<Mutex<ConnectionEvents>>,
}

/// In-memory broker client. Share it as `Arc<InMemoryBroker>`; the `Arc`
/// coerces into the `Arc<dyn BrokerConnector>` the facade takes.
pub struct InMemoryBroker {
    engine: Arc<Mutex<Engine>>,
    runtime: Runtime,
    counters: Arc<BrokerCounters>,
    connections: Mutex<Vec<ConnEntry>>,
    sessions: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    unreachable: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine::new())),
            runtime: Runtime::new().expect("failed to start in-memory broker runtime"),
            counters: Arc::new(BrokerCounters::default()),
            connections: Mutex::new(Vec::new()),
            sessions: Arc::new(Mutex::new(Vec::new())),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn counters(&self) -> &BrokerCounters {
        &self.counters
    }

    /// Number of delivery channels the engine still holds. Zero after a
    /// complete teardown.
    pub fn subscriber_count(&self) -> usize {
        self.engine.lock().unwrap().subscriber_count()
    }

    /// When set, `create_connection` fails with `ConnectError::Unreachable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fires the exception callback on every live connection.
    pub fn simulate_exception(&self, reason: &str) {
        for callback in self.live_callbacks(|e| e.on_exception.clone()) {
            callback(reason.to_string());
        }
    }

    /// Fires the interrupted callback on every live connection.
    pub fn simulate_interruption(&self) {
        for callback in self.live_callbacks(|e| e.on_interrupted.clone()) {
            callback();
        }
    }

    /// Fires the resumed callback on every live connection.
    pub fn simulate_resume(&self) {
        for callback in self.live_callbacks(|e| e.on_resumed.clone()) {
            callback();
        }
    }

    /// Marks every session created so far as no longer open, as a broker
    /// would after dropping session state across a failover.
    pub fn invalidate_sessions(&self) {
        for open in self.sessions.lock().unwrap().iter() {
            open.store(false, Ordering::SeqCst);
        }
    }

    // Clones the selected callback out of each live connection so the
    // invocation happens without holding any broker lock. Closed entries
    // are dropped on the way.
    fn live_callbacks<T>(&self, select: impl Fn(&ConnectionEvents) -> T) -> Vec<T> {
        let mut connections = self.connections.lock().unwrap();
        connections.retain(|entry| !entry.closed.load(Ordering::SeqCst));
        connections
            .iter()
            .map(|entry| select(&entry.events.lock().unwrap()))
            .collect()
    }

    /// Connection entries still tracked; closed entries are pruned when
    /// the next connection is created or an event is simulated.
    pub fn tracked_connections(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Session flags still tracked; stale ones are pruned when the next
    /// session is created.
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerConnector for InMemoryBroker {
    fn create_connection(&self, uri: &str) -> Result<Box<dyn BrokerConnection>, ConnectError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable(format!(
                "in-memory broker refused {uri}"
            )));
        }

        self.counters
            .connections_opened
            .fetch_add(1, Ordering::SeqCst);

        let closed = Arc::new(AtomicBool::new(false));
        let events = Arc::new(Mutex::new(ConnectionEvents::noop()));
        {
            // Producer sends open one connection per call; prune the
            // entries whose connection has since closed so the registry
            // stays bounded by the live set.
            let mut connections = self.connections.lock().unwrap();
            connections.retain(|entry| !entry.closed.load(Ordering::SeqCst));
            connections.push(ConnEntry {
                closed: closed.clone(),
                events: events.clone(),
            });
        }

        Ok(Box::new(MemoryConnection {
            engine: self.engine.clone(),
            handle: self.runtime.handle().clone(),
            counters: self.counters.clone(),
            session_registry: self.sessions.clone(),
            events,
            closed,
            started: AtomicBool::new(false),
            client_id: Mutex::new(String::new()),
            request_timeout: Mutex::new(Duration::from_secs(20)),
        }))
    }
}

struct MemoryConnection {
    engine: Arc<Mutex<Engine>>,
    handle: Handle,
    counters: Arc<BrokerCounters>,
    session_registry: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    events: Arc<Mutex<ConnectionEvents>>,
    closed: Arc<AtomicBool>,
    started: AtomicBool,
    client_id: Mutex<String>,
    request_timeout: Mutex<Duration>,
}

impl BrokerConnection for MemoryConnection {
    fn set_client_id(&self, client_id: &str) {
        *self.client_id.lock().unwrap() = client_id.to_string();
    }

    fn set_request_timeout(&self, timeout: Duration) {
        *self.request_timeout.lock().unwrap() = timeout;
    }

    fn set_event_listeners(&self, events: ConnectionEvents) {
        *self.events.lock().unwrap() = events;
    }

    fn start(&self) -> Result<(), ConnectError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable("connection closed".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        tracing::debug!(
            client_id = %self.client_id.lock().unwrap(),
            timeout = ?self.request_timeout.lock().unwrap(),
            "in-memory connection started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), CloseError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn create_session(&self, _ack_mode: AckMode) -> Result<Box<dyn BrokerSession>, ConnectError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectError::Unreachable("connection closed".to_string()));
        }
        self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);

        let open = Arc::new(AtomicBool::new(true));
        {
            let mut registry = self.session_registry.lock().unwrap();
            registry.retain(|flag| flag.load(Ordering::SeqCst));
            registry.push(open.clone());
        }

        Ok(Box::new(MemorySession {
            engine: self.engine.clone(),
            handle: self.handle.clone(),
            counters: self.counters.clone(),
            open,
            connection_closed: self.closed.clone(),
            consumer_ids: Mutex::new(Vec::new()),
        }))
    }

    fn close(&self) -> Result<(), CloseError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters
                .connections_closed
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MemorySession {
    engine: Arc<Mutex<Engine>>,
    handle: Handle,
    counters: Arc<BrokerCounters>,
    open: Arc<AtomicBool>,
    connection_closed: Arc<AtomicBool>,
    consumer_ids: Mutex<Vec<SubscriberId>>,
}

impl BrokerSession for MemorySession {
    fn create_consumer(
        &self,
        destination: &Destination,
        listener: MessageListener,
    ) -> Result<Box<dyn BrokerConsumer>, SubscribeError> {
        if !self.is_open() {
            return Err(SubscribeError::NotConnected);
        }
        if destination.name.trim().is_empty() {
            return Err(SubscribeError::InvalidDestination(
                "destination name is empty".to_string(),
            ));
        }

        let id: SubscriberId = uuid::Uuid::new_v4().to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut engine = self.engine.lock().unwrap();
            engine.register_subscriber(id.clone(), tx);
            engine.subscribe(destination, id.clone());
        }
        self.consumer_ids.lock().unwrap().push(id.clone());
        self.counters.consumers_opened.fetch_add(1, Ordering::SeqCst);

        // One forward loop per consumer: the next message is handed to
        // the listener only after the previous invocation returns.
        self.handle.spawn(async move {
            while let Some(delivery) = rx.recv().await {
                listener(delivery.message);
            }
        });

        Ok(Box::new(MemoryConsumer {
            engine: self.engine.clone(),
            counters: self.counters.clone(),
            id,
            destination: destination.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn BrokerProducer>, SendError> {
        if !self.is_open() {
            return Err(SendError::BrokerRejected("session closed".to_string()));
        }
        self.counters.producers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryProducer {
            engine: self.engine.clone(),
            counters: self.counters.clone(),
            destination: destination.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.connection_closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<(), CloseError> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        let mut engine = self.engine.lock().unwrap();
        for id in self.consumer_ids.lock().unwrap().drain(..) {
            engine.remove_subscriber(&id);
        }
        Ok(())
    }
}

struct MemoryConsumer {
    engine: Arc<Mutex<Engine>>,
    counters: Arc<BrokerCounters>,
    id: SubscriberId,
    destination: Destination,
    closed: AtomicBool,
}

impl BrokerConsumer for MemoryConsumer {
    fn close(&self) -> Result<(), CloseError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut engine = self.engine.lock().unwrap();
            engine.unsubscribe(&self.destination, &self.id);
            engine.remove_subscriber(&self.id);
            self.counters.consumers_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MemoryProducer {
    engine: Arc<Mutex<Engine>>,
    counters: Arc<BrokerCounters>,
    destination: Destination,
    closed: AtomicBool,
}

impl BrokerProducer for MemoryProducer {
    fn send(&self, message: Message) -> Result<(), SendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SendError::BrokerRejected("producer closed".to_string()));
        }
        self.counters.messages_sent.fetch_add(1, Ordering::SeqCst);
        self.engine.lock().unwrap().publish(&self.destination, message);
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.producers_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
