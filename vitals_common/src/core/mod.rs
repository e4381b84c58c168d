//! # Core Engine Module
//!
//! Event flow shared by every transport adapter: the normalized `Event`, the
//! publish/subscribe `EventBus`, the sequential processor `Pipeline`, and the
//! bounded `Dispatcher` that adapters feed.
//!
//! ## Core Components:
//!
//! - **`event`**: the immutable record every adapter produces.
//! - **`registry`**: event-type keyed subscriber lists with identity removal.
//! - **`inflight_guard`**: atomic ceiling on concurrently running bus tasks.
//! - **`event_bus`**: non-blocking fan-out of an event to its subscribers.
//! - **`pipeline`**: bus publish followed by the ordered processor chain.
//! - **`dispatcher`**: bounded queue plus concurrency limit in front of the pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The normalized ingestion event.
pub mod event;
/// Subscriber lists keyed by event type.
pub mod registry;
/// Capacity-bounded task accounting.
pub mod inflight_guard;
/// In-process publish/subscribe.
pub mod event_bus;
/// Processor chain and handler context.
pub mod pipeline;
/// Bounded queue between adapters and the pipeline.
pub mod dispatcher;

// --- Public API Re-exports ---
pub use dispatcher::{DispatchConfig, Dispatcher, OverflowPolicy};
pub use event::{Event, Source};
pub use event_bus::EventBus;
pub use inflight_guard::{InflightGuard, InflightPermit};
pub use pipeline::{processor_listener, HandlerContext, Pipeline, Processor};
pub use registry::{listener, BusHandler, ListenerRegistry};
