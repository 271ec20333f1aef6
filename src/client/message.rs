use std::collections::HashMap;
use std::time::Duration;

/// Message body. The consumer side of the facade only accepts text;
/// any other payload kind is skipped with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Returns the text body, or `None` for non-text payloads.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Bytes(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
        }
    }
}

/// Whether a message survives a broker restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Persistent,
    NonPersistent,
}

/// Broker-side ordering hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A message as handed to the producer.
///
/// `time_to_live` left at `None` means "use the destination-kind default"
/// (longer for queues, shorter for topics); the producer resolves it at
/// send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Payload,
    pub delivery_mode: DeliveryMode,
    pub priority: Priority,
    pub time_to_live: Option<Duration>,
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Creates a text message with default delivery guarantees.
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: Payload::Text(payload.into()),
            delivery_mode: DeliveryMode::default(),
            priority: Priority::default(),
            time_to_live: None,
            headers: HashMap::new(),
        }
    }

    /// Creates a binary message with default delivery guarantees.
    pub fn bytes(payload: Vec<u8>) -> Self {
        Self {
            payload: Payload::Bytes(payload),
            delivery_mode: DeliveryMode::default(),
            priority: Priority::default(),
            time_to_live: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}
