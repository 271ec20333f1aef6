//! The `codec` module defines the pluggable text codec used by the
//! structured send/receive convenience paths.
//!
//! The facade itself only ever moves text payloads; a [`Codec`] turns a
//! typed value into that text on the producer side and back on the
//! consumer side. [`JsonCodec`] is the default implementation.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::utils::error::CodecError;

/// Bidirectional text codec for structured payloads.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError>;

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError(e.to_string()))
    }
}
