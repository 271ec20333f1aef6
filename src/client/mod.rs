//! The `client` module is the facade itself: the connection manager, the
//! consumer session and the producer session, plus the value types they
//! share (endpoint, destination, message).
//!
//! The three components split the responsibility the way a messaging
//! client is actually used: one long-lived managed connection for
//! consuming, independent short-lived connections for producing.

pub mod connection;
pub mod consumer;
pub mod endpoint;
pub mod message;
pub mod producer;

pub use connection::{ConnectionManager, LivenessFlag};
pub use consumer::ConsumerSession;
pub use endpoint::{AckMode, BrokerEndpoint, Destination, DestinationKind};
pub use message::{DeliveryMode, Message, Payload, Priority};
pub use producer::ProducerSession;

#[cfg(test)]
mod tests;
