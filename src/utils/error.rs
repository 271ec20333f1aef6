//! The `error` module defines the error taxonomy used across `relaymq`.
//!
//! Every fallible facade operation surfaces one of these types instead of
//! panicking or silently discarding the failure. Asynchronous conditions
//! (delivery-time problems, teardown stage failures) are downgraded to
//! warnings and routed through the observer rather than returned, since
//! there is no caller on the stack to receive them.

use thiserror::Error;

/// Failure to establish a broker connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection attempt timed out")]
    Timeout,

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("broker authentication failed: {0}")]
    AuthFailed(String),
}

/// Failure to create a consumer for a destination.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// The session already holds a consumer for this destination.
    /// One consumer per destination per session is a hard limit.
    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// No connection has been established yet, or the last one was closed.
    #[error("not connected to a broker")]
    NotConnected,
}

/// Failure to send a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The producer was never armed with a broker endpoint. No network
    /// call is attempted in this state.
    #[error("producer not initialized with a broker endpoint")]
    NotInitialized,

    #[error("payload encoding failed: {0}")]
    EncodingFailed(String),

    #[error("send timed out")]
    Timeout,

    #[error("broker rejected the send: {0}")]
    BrokerRejected(String),
}

/// Delivery-time conditions that never abort the delivery loop.
///
/// These are reported to the observer as warnings; the registered handler
/// is not invoked for the affected message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryWarning {
    #[error("received an empty message")]
    EmptyPayload,

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("failed to decode message payload: {0}")]
    DecodeFailed(String),
}

/// Failure while encoding or decoding a structured payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("codec error: {0}")]
pub struct CodecError(pub String);

/// Failure of a single teardown stage (consumer, session or connection).
///
/// Teardown is best-effort and staged: a `CloseError` at one stage is
/// logged through the observer and never prevents the next stage from
/// being attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("close failed: {0}")]
pub struct CloseError(pub String);

impl From<ConnectError> for SendError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Timeout => SendError::Timeout,
            other => SendError::BrokerRejected(other.to_string()),
        }
    }
}
