//! Subscription side of the facade.
//!
//! A [`ConsumerSession`] registers handlers on top of the connection
//! owned by a [`ConnectionManager`]. Delivery is strictly serialized per
//! consumer: the broker client invokes the next message's listener only
//! after the previous one returns. Handlers needing parallelism must fan
//! out to their own workers; the facade never does this implicitly.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::broker::api::MessageListener;
use crate::client::connection::ConnectionManager;
use crate::client::endpoint::Destination;
use crate::client::message::Message;
use crate::codec::Codec;
use crate::observer::{BrokerEvent, EventObserver};
use crate::utils::error::{DeliveryWarning, SubscribeError};

/// Consumer-side facade over the managed session.
pub struct ConsumerSession {
    manager: Arc<ConnectionManager>,
    observer: Arc<dyn EventObserver>,
}

impl ConsumerSession {
    pub fn new(manager: Arc<ConnectionManager>, observer: Arc<dyn EventObserver>) -> Self {
        Self { manager, observer }
    }

    /// Subscribes a text handler to a destination.
    ///
    /// At most one consumer per destination per session. Only text
    /// payloads reach the handler: binary messages and empty or
    /// whitespace-only text are skipped with a warning to the observer,
    /// never an error. The handler receives the trimmed text.
    pub fn subscribe<F>(&self, destination: &Destination, handler: F) -> Result<(), SubscribeError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let listener = text_listener(self.observer.clone(), Arc::new(handler));
        self.manager.add_consumer(destination, listener)
    }

    /// Subscribes a typed handler; payloads are decoded with `codec`.
    ///
    /// A decode failure is reported to the observer and the handler is
    /// skipped for that message. It never propagates and never stops the
    /// delivery loop, so one malformed payload cannot poison the stream.
    pub fn subscribe_decoded<T, C, F>(
        &self,
        destination: &Destination,
        codec: C,
        handler: F,
    ) -> Result<(), SubscribeError>
    where
        T: DeserializeOwned,
        C: Codec + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let observer = self.observer.clone();
        self.subscribe(destination, move |text| match codec.decode::<T>(text) {
            Ok(value) => handler(value),
            Err(e) => observer.notify(BrokerEvent::warn(
                "delivery",
                DeliveryWarning::DecodeFailed(e.to_string()).to_string(),
            )),
        })
    }

    /// Stops delivery for one destination. A no-op when there is no
    /// subscription, including after `close`.
    pub fn unsubscribe(&self, destination: &Destination) {
        self.manager.remove_consumer(destination);
    }

    /// Stops delivery for every subscription made through this session.
    /// Safe to call when already closed.
    pub fn close(&self) {
        self.manager.close_consumers();
    }
}

/// Wraps a text handler with the delivery boundary checks.
fn text_listener(
    observer: Arc<dyn EventObserver>,
    handler: Arc<dyn Fn(&str) + Send + Sync>,
) -> MessageListener {
    Arc::new(move |message: Message| match message.payload.as_text() {
        None => observer.notify(BrokerEvent::warn(
            "delivery",
            DeliveryWarning::UnsupportedMessageType(message.payload.kind_name().to_string())
                .to_string(),
        )),
        Some(text) if text.trim().is_empty() => observer.notify(BrokerEvent::warn(
            "delivery",
            DeliveryWarning::EmptyPayload.to_string(),
        )),
        Some(text) => handler(text.trim()),
    })
}
