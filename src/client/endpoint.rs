use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policy governing when the broker considers a delivered message consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// The broker acknowledges automatically once the listener returns.
    #[default]
    AutoAcknowledge,
    /// The consumer acknowledges explicitly; acknowledging one message
    /// acknowledges everything the session has consumed so far.
    ClientAcknowledge,
    /// Lazy acknowledgement; duplicates are possible after a broker failure.
    DupsOkAcknowledge,
}

/// Immutable description of how to reach a broker.
///
/// Created at configuration time and never mutated afterwards; `connect`
/// takes it by reference and copies what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub uri: String,
    pub request_timeout: Duration,
    pub ack_mode: AckMode,
}

impl BrokerEndpoint {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            ack_mode: AckMode::AutoAcknowledge,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }
}

/// Whether a destination is point-to-point or publish/subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Each message reaches exactly one consumer among possibly many.
    Queue,
    /// Each message reaches every currently active subscriber.
    Topic,
}

/// Immutable identity of a queue or topic on the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub kind: DestinationKind,
    pub name: String,
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Queue,
            name: name.into(),
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Topic,
            name: name.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Queue => write!(f, "queue:{}", self.name),
            DestinationKind::Topic => write!(f, "topic:{}", self.name),
        }
    }
}
