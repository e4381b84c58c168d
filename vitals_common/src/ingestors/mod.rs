//! # Transport Adapters
//!
//! The front door for device readings. Each adapter turns its transport's
//! messages into `Event`s and hands them to the shared `Dispatcher`.
//!
//! ## Contained Modules:
//! - **`tcp_framed`**: TCP listener running the frame codec and MessagePack
//!   decoder per connection.
//! - **`mqtt_topic`**: broker subscriber for `device/<id>/data/<metric>`.
//!   The topic parsing is always built; the `rumqttc` client needs the
//!   `ingestors` feature.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;
use thiserror::Error;

/// Broker topic adapter.
pub mod mqtt_topic;
/// Framed MessagePack TCP adapter.
pub mod tcp_framed;

// --- Public API Re-exports ---
pub use mqtt_topic::{event_from_publish, parse_broker, SUBSCRIPTION};
#[cfg(feature = "ingestors")]
pub use mqtt_topic::{MqttIngestor, MqttSettings};
pub use tcp_framed::{event_from_frame, serve_connection, TcpFramedIngestor, DEFAULT_TCP_PORT, FRAMED_EVENT_TYPE};

/// Transport-level failures. Each aborts only its own adapter.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Broker address could not be split into host and port.
    #[error("invalid broker address '{0}'")]
    BrokerAddress(String),
    /// The broker did not acknowledge the connection in time.
    #[error("timed out connecting to broker after {0:?}")]
    ConnectTimeout(Duration),
    /// Broker connection failed.
    #[error("broker connection failed: {0}")]
    Connection(String),
    /// The broker refused the topic subscription.
    #[error("broker rejected subscription to '{0}'")]
    SubscribeRejected(String),
    /// Request could not be queued on the broker client.
    #[error("broker client error: {0}")]
    Client(String),
    /// Listener socket error.
    #[error("listener i/o error: {0}")]
    Io(#[from] std::io::Error),
}
