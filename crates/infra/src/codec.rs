//! Saga state serialization.
//!
//! The store only ever compares encoded bytes for equality, so a codec does not
//! need to be byte-stable across versions. It must decode whatever it encoded.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to serialize saga data: {0}")]
    Serialization(String),

    #[error("failed to deserialize saga data: {0}")]
    Deserialization(String),
}

/// Converts saga state to and from opaque bytes.
pub trait SagaCodec: Send + Sync {
    fn encode<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into `T`. Fails if the bytes do not match the shape of `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec (serde_json).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SagaCodec for JsonCodec {
    fn encode<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(record).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialization(e.to_string()))
    }
}
