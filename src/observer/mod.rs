//! The `observer` module defines the structured event sink the facade
//! reports through.
//!
//! Conditions that arrive asynchronously (connection interruptions,
//! delivery-time decode problems, teardown stage failures) have no caller
//! on the stack to return an error to. Instead of discarding them, every
//! such condition produces exactly one [`BrokerEvent`] on the injected
//! [`EventObserver`].

use chrono::{DateTime, Utc};

/// Severity of an observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// A single structured event emitted by the facade.
#[derive(Debug, Clone)]
pub struct BrokerEvent {
    pub level: EventLevel,
    /// Coarse source of the event, e.g. `connection`, `delivery`, `teardown`.
    pub category: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl BrokerEvent {
    pub fn new(level: EventLevel, category: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(category: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, category, message)
    }

    pub fn warn(category: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, category, message)
    }

    pub fn error(category: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, category, message)
    }
}

/// Sink for facade events. Implementations must be cheap and non-blocking;
/// `notify` may be called from broker delivery threads.
pub trait EventObserver: Send + Sync {
    fn notify(&self, event: BrokerEvent);
}

/// Production observer that forwards events to `tracing` at the matching level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn notify(&self, event: BrokerEvent) {
        match event.level {
            EventLevel::Info => tracing::info!(category = %event.category, "{}", event.message),
            EventLevel::Warn => tracing::warn!(category = %event.category, "{}", event.message),
            EventLevel::Error => tracing::error!(category = %event.category, "{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_constructors_set_level_and_category() {
        let event = BrokerEvent::warn("delivery", "empty message");
        assert_eq!(event.level, EventLevel::Warn);
        assert_eq!(event.category, "delivery");
        assert_eq!(event.message, "empty message");
    }

    #[test]
    fn tracing_observer_accepts_all_levels() {
        let observer = TracingObserver;
        observer.notify(BrokerEvent::info("connection", "connected"));
        observer.notify(BrokerEvent::warn("delivery", "skipped"));
        observer.notify(BrokerEvent::error("teardown", "close failed"));
    }
}
