//! Codec Module
//!
//! The serialization boundary between typed values and stored payloads.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

// == Codec Trait ==
/// Encode/decode pair used by [`crate::cache::Cache`].
pub trait Codec<T>: Send + Sync {
    /// Encodes a value to its stored text form.
    fn encode(&self, value: &T) -> Result<String>;

    /// Decodes a value from its stored text form.
    fn decode(&self, data: &str) -> Result<T>;
}

// == JSON Codec ==
/// Codec for any serde type, using JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, data: &str) -> Result<T> {
        Ok(serde_json::from_str(data)?)
    }
}
