//! Connection lifecycle for the facade.
//!
//! [`ConnectionManager`] owns at most one broker connection and its
//! session, reacts to the broker client's exception/interrupted/resumed
//! callbacks, and exposes liveness as a lock-guarded flag. Consumers
//! created through [`crate::client::consumer::ConsumerSession`] are
//! tracked here so a forced reconnect can re-subscribe them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::broker::api::{
    BrokerConnection, BrokerConnector, BrokerConsumer, BrokerSession, ConnectionEvents,
    MessageListener,
};
use crate::client::endpoint::{BrokerEndpoint, Destination};
use crate::observer::{BrokerEvent, EventObserver};
use crate::utils::error::{ConnectError, SubscribeError};

/// Per-connection liveness hint, mutated only under its own lock.
///
/// True only between a successful connect and the next observed
/// interruption, exception or close. Reading it does not probe the
/// network; it reflects the last callback the broker client fired.
#[derive(Debug, Default)]
pub struct LivenessFlag {
    flag: Mutex<bool>,
}

impl LivenessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, alive: bool) {
        *self.flag.lock().unwrap() = alive;
    }

    pub fn get(&self) -> bool {
        *self.flag.lock().unwrap()
    }
}

struct ConsumerEntry {
    handle: Box<dyn BrokerConsumer>,
    listener: MessageListener,
}

struct Active {
    connection: Box<dyn BrokerConnection>,
    session: Box<dyn BrokerSession>,
    endpoint: BrokerEndpoint,
    consumers: HashMap<Destination, ConsumerEntry>,
}

type Slot = Arc<Mutex<Option<Active>>>;

/// Owns the broker connection lifecycle.
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    observer: Arc<dyn EventObserver>,
    liveness: Arc<LivenessFlag>,
    inner: Slot,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, observer: Arc<dyn EventObserver>) -> Self {
        Self {
            connector,
            observer,
            liveness: Arc::new(LivenessFlag::new()),
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Establishes a connection and session for `endpoint`.
    ///
    /// Idempotent: a live connection is drained and closed first. Every
    /// attempt uses a fresh client id so a broker holding state for a
    /// previous incarnation never sees a collision.
    pub fn connect(&self, endpoint: &BrokerEndpoint) -> Result<(), ConnectError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(active) = inner.take() {
            self.liveness.set(false);
            teardown_stages(active, &self.observer);
        }

        let active = establish(
            &self.connector,
            &self.observer,
            &self.liveness,
            &self.inner,
            endpoint,
            HashMap::new(),
        )?;
        *inner = Some(active);
        self.liveness.set(true);
        self.observer.notify(BrokerEvent::info(
            "connection",
            format!("connected to {}", endpoint.uri),
        ));
        Ok(())
    }

    /// Last known liveness. A hint, not a guarantee: it flips on
    /// broker-reported callbacks, not on a network probe.
    pub fn is_alive(&self) -> bool {
        self.liveness.get()
    }

    /// Releases consumers, then the session, then the connection.
    ///
    /// Each stage is attempted even if an earlier one failed; failures
    /// are reported to the observer. Safe to call any number of times.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(active) = inner.take() {
            teardown_stages(active, &self.observer);
        }
        self.liveness.set(false);
    }

    pub(crate) fn add_consumer(
        &self,
        destination: &Destination,
        listener: MessageListener,
    ) -> Result<(), SubscribeError> {
        let mut inner = self.inner.lock().unwrap();
        let active = inner.as_mut().ok_or(SubscribeError::NotConnected)?;
        if active.consumers.contains_key(destination) {
            return Err(SubscribeError::AlreadySubscribed(destination.to_string()));
        }

        let handle = active
            .session
            .create_consumer(destination, listener.clone())?;
        active.consumers.insert(
            destination.clone(),
            ConsumerEntry { handle, listener },
        );
        Ok(())
    }

    /// Removes one consumer. Returns whether a subscription existed.
    pub(crate) fn remove_consumer(&self, destination: &Destination) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(active) = inner.as_mut() else {
            return false;
        };
        match active.consumers.remove(destination) {
            Some(entry) => {
                if let Err(e) = entry.handle.close() {
                    self.observer.notify(BrokerEvent::error(
                        "teardown",
                        format!("failed to close consumer for {destination}: {e}"),
                    ));
                }
                true
            }
            None => false,
        }
    }

    /// Removes every consumer, leaving connection and session up.
    pub(crate) fn close_consumers(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(active) = inner.as_mut() {
            for (destination, entry) in active.consumers.drain() {
                if let Err(e) = entry.handle.close() {
                    self.observer.notify(BrokerEvent::error(
                        "teardown",
                        format!("failed to close consumer for {destination}: {e}"),
                    ));
                }
            }
        }
    }
}

/// Creates connection + session for `endpoint` and re-registers the given
/// listeners. Used both by `connect` and by the resume-validation path.
fn establish(
    connector: &Arc<dyn BrokerConnector>,
    observer: &Arc<dyn EventObserver>,
    liveness: &Arc<LivenessFlag>,
    slot: &Slot,
    endpoint: &BrokerEndpoint,
    listeners: HashMap<Destination, MessageListener>,
) -> Result<Active, ConnectError> {
    let connection = connector.create_connection(&endpoint.uri)?;
    connection.set_client_id(&Uuid::new_v4().simple().to_string());
    connection.set_request_timeout(endpoint.request_timeout);
    connection.set_event_listeners(make_events(connector, observer, liveness, slot));
    connection.start()?;

    let session = connection.create_session(endpoint.ack_mode)?;

    let mut consumers = HashMap::new();
    for (destination, listener) in listeners {
        match session.create_consumer(&destination, listener.clone()) {
            Ok(handle) => {
                consumers.insert(destination, ConsumerEntry { handle, listener });
            }
            Err(e) => observer.notify(BrokerEvent::error(
                "connection",
                format!("failed to re-subscribe {destination}: {e}"),
            )),
        }
    }

    Ok(Active {
        connection,
        session,
        endpoint: endpoint.clone(),
        consumers,
    })
}

fn make_events(
    connector: &Arc<dyn BrokerConnector>,
    observer: &Arc<dyn EventObserver>,
    liveness: &Arc<LivenessFlag>,
    slot: &Slot,
) -> ConnectionEvents {
    let on_exception = {
        let observer = observer.clone();
        let liveness = liveness.clone();
        Arc::new(move |reason: String| {
            liveness.set(false);
            observer.notify(BrokerEvent::error(
                "connection",
                format!("broker exception: {reason}"),
            ));
        })
    };

    let on_interrupted = {
        let observer = observer.clone();
        let liveness = liveness.clone();
        Arc::new(move || {
            liveness.set(false);
            observer.notify(BrokerEvent::warn("connection", "connection interrupted"));
        })
    };

    let on_resumed = {
        let connector = connector.clone();
        let observer = observer.clone();
        let liveness = liveness.clone();
        let slot = slot.clone();
        Arc::new(move || handle_resume(&connector, &observer, &liveness, &slot))
    };

    ConnectionEvents {
        on_exception,
        on_interrupted,
        on_resumed,
    }
}

/// Resume handling: the broker client recovered the connection on its
/// own. The session may or may not have survived, so it is re-validated;
/// a dead session forces a full reconnect with a fresh client id,
/// re-subscribing every tracked consumer.
fn handle_resume(
    connector: &Arc<dyn BrokerConnector>,
    observer: &Arc<dyn EventObserver>,
    liveness: &Arc<LivenessFlag>,
    slot: &Slot,
) {
    let mut inner = slot.lock().unwrap();
    let Some(old) = inner.take() else {
        // Closed while the broker client was recovering; nothing to resume.
        return;
    };

    if old.session.is_open() {
        *inner = Some(old);
        liveness.set(true);
        observer.notify(BrokerEvent::info("connection", "connection resumed"));
        return;
    }

    observer.notify(BrokerEvent::warn(
        "connection",
        "session invalid after resume, reconnecting",
    ));

    let endpoint = old.endpoint.clone();
    let listeners: HashMap<Destination, MessageListener> = old
        .consumers
        .iter()
        .map(|(dest, entry)| (dest.clone(), entry.listener.clone()))
        .collect();
    teardown_stages(old, observer);

    match establish(connector, observer, liveness, slot, &endpoint, listeners) {
        Ok(active) => {
            *inner = Some(active);
            liveness.set(true);
            observer.notify(BrokerEvent::info(
                "connection",
                format!("reconnected to {}", endpoint.uri),
            ));
        }
        Err(e) => {
            liveness.set(false);
            observer.notify(BrokerEvent::error(
                "connection",
                format!("reconnect after resume failed: {e}"),
            ));
        }
    }
}

/// Best-effort staged teardown: consumers, then session, then connection.
/// A failure at any stage is reported and never blocks the next stage.
fn teardown_stages(active: Active, observer: &Arc<dyn EventObserver>) {
    for (destination, entry) in active.consumers {
        if let Err(e) = entry.handle.close() {
            observer.notify(BrokerEvent::error(
                "teardown",
                format!("failed to close consumer for {destination}: {e}"),
            ));
        }
    }
    if let Err(e) = active.session.close() {
        observer.notify(BrokerEvent::error(
            "teardown",
            format!("failed to close session: {e}"),
        ));
    }
    if let Err(e) = active.connection.stop() {
        observer.notify(BrokerEvent::error(
            "teardown",
            format!("failed to stop connection: {e}"),
        ));
    }
    if let Err(e) = active.connection.close() {
        observer.notify(BrokerEvent::error(
            "teardown",
            format!("failed to close connection: {e}"),
        ));
    }
}
