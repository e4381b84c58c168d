//! # Wire Payload Deserializer
//!
//! Frame payloads are MessagePack maps with string keys. They are decoded into
//! the same JSON value map the MQTT transport produces, so everything after the
//! adapters sees one payload shape.

use serde_json::{Map, Value};
use thiserror::Error;

/// String-keyed payload map shared by both transports.
pub type Payload = Map<String, Value>;

/// Payload decoding failures. The frame is dropped when one occurs.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed MessagePack payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("MessagePack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Decodes a checksum-validated frame payload into a string-keyed map.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload, WireError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Encodes a map as a MessagePack payload (map with named keys).
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, WireError> {
    Ok(rmp_serde::to_vec_named(payload)?)
}
