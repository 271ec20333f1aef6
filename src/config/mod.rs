//! The `config` module handles loading the facade configuration.
//!
//! Configuration comes from an optional `config/default` file and from
//! environment variables, merged over built-in defaults so the facade
//! always starts with a complete `Settings` value. Nothing is read from
//! ambient global state at call time; callers pass the loaded settings
//! explicitly.

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LogSettings, ProducerSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        broker: BrokerSettings {
            uri: partial
                .broker
                .as_ref()
                .and_then(|b| b.uri.clone())
                .unwrap_or(default.broker.uri),
            request_timeout_secs: partial
                .broker
                .as_ref()
                .and_then(|b| b.request_timeout_secs)
                .unwrap_or(default.broker.request_timeout_secs),
            ack_mode: partial
                .broker
                .as_ref()
                .and_then(|b| b.ack_mode)
                .unwrap_or(default.broker.ack_mode),
        },
        producer: ProducerSettings {
            queue_ttl_secs: partial
                .producer
                .as_ref()
                .and_then(|p| p.queue_ttl_secs)
                .unwrap_or(default.producer.queue_ttl_secs),
            topic_ttl_secs: partial
                .producer
                .as_ref()
                .and_then(|p| p.topic_ttl_secs)
                .unwrap_or(default.producer.topic_ttl_secs),
        },
        log: LogSettings {
            level: partial
                .log
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    })
}

#[cfg(test)]
mod tests;
