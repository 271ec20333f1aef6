use std::time::Duration;

use serde::Deserialize;

use crate::client::endpoint::{AckMode, BrokerEndpoint};

/// Top-level configuration settings for the facade.
///
/// Covers the broker endpoint, producer defaults and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub producer: ProducerSettings,
    pub log: LogSettings,
}

/// How to reach the broker and how long to wait for it.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub uri: String,
    pub request_timeout_secs: u64,
    pub ack_mode: AckMode,
}

/// Producer-side defaults, applied when a message does not carry its own
/// time-to-live.
#[derive(Debug, Deserialize, Clone)]
pub struct ProducerSettings {
    pub queue_ttl_secs: u64,
    pub topic_ttl_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled
/// from defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub producer: Option<PartialProducerSettings>,
    pub log: Option<PartialLogSettings>,
}

/// Partial broker settings.
#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub uri: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub ack_mode: Option<AckMode>,
}

/// Partial producer settings.
#[derive(Debug, Deserialize)]
pub struct PartialProducerSettings {
    pub queue_ttl_secs: Option<u64>,
    pub topic_ttl_secs: Option<u64>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Builds the immutable endpoint value the facade consumes.
    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(self.broker.uri.clone())
            .with_request_timeout(Duration::from_secs(self.broker.request_timeout_secs))
            .with_ack_mode(self.broker.ack_mode)
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the facade has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                uri: "ws://127.0.0.1:8080".to_string(),
                request_timeout_secs: 20,
                ack_mode: AckMode::AutoAcknowledge,
            },
            producer: ProducerSettings {
                queue_ttl_secs: 3600,
                topic_ttl_secs: 1800,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
