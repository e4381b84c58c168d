//! # Normalized Ingestion Event
//!
//! Every transport adapter reduces its input to one `Event`. After creation an
//! event is shared as `Arc<Event>` and never mutated.

use serde::Serialize;
use std::fmt;

use crate::framing::Payload;

/// The transport an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Topic based broker messages.
    Mqtt,
    /// MessagePack frames on the raw TCP listener.
    Msgpack,
}

impl Source {
    /// Stable tag used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mqtt => "mqtt",
            Source::Msgpack => "msgpack",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized reading record as produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Device identifier (topic segment or frame serial number).
    pub device_id: String,
    /// Routing key for the bus and processors, e.g. `heart_rate`.
    pub event_type: String,
    /// Opaque key-value payload.
    pub payload: Payload,
    /// Originating transport.
    pub source: Source,
}

impl Event {
    /// Builds an event from its parts.
    pub fn new(
        device_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Payload,
        source: Source,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            event_type: event_type.into(),
            payload,
            source,
        }
    }
}
