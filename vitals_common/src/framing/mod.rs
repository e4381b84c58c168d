//! # Framing Module
//!
//! Byte-level protocol for the framed TCP transport: the CRC-8 checksum, the
//! stateful frame codec and the MessagePack payload deserializer.

/// CRC-8 (poly 0x31) used to validate frame payloads.
pub mod crc8;
/// `MAGIC | LENGTH | CRC8 | PAYLOAD` codec for `FramedRead`.
pub mod codec;
/// MessagePack payload to string-keyed map.
pub mod wire;

pub use codec::{encode_frame, FrameCodec, FrameError, FrameStats, MAGIC};
pub use wire::{decode_payload, encode_payload, Payload, WireError};
