//! # vitals_common
//!
//! Ingestion core for physiological sensor readings: the framed TCP wire
//! protocol, the transport adapters, the event bus and pipeline, and the
//! per-metric handlers with their cache and store collaborators.
//!
//! Heavy clients are feature gated like the rest of the workspace:
//! `connections` pulls in Redis and PostgreSQL, `ingestors` the MQTT client.

#![forbid(unsafe_code)]

pub mod connections;
pub mod core;
pub mod framing;
pub mod handlers;
pub mod ingestors;
pub mod simdata;

pub use crate::core::{Event, EventBus, Pipeline, Source};
