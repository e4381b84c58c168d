//! # Connections Module
//!
//! The narrow interfaces handlers use to reach external services: a TTL
//! key-value cache and an append-only record store. The Redis and PostgreSQL
//! drivers sit behind the `connections` feature; the in-memory versions are
//! always available for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::framing::Payload;

/// In-memory cache and record store.
pub mod memory;

/// Module for Redis cache operations and connection handling.
#[cfg(feature = "connections")]
pub mod cache_redis;

/// Module for PostgreSQL database connection pooling and management.
#[cfg(feature = "connections")]
pub mod db_postgres;

pub use memory::{MemoryCache, MemoryRecordStore, DEFAULT_MAX_RECORDS};

#[cfg(feature = "connections")]
pub use cache_redis::RedisCache;
#[cfg(feature = "connections")]
pub use db_postgres::PgRecordStore;

/// Errors raised by cache and store collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cache operation failed: {0}")]
    Cache(String),
    #[error("Failed to connect to database: {0}")]
    Connection(String),
    #[error("Query execution failed: {0}")]
    Query(String),
}

/// `health_profile_id` written for readings not yet linked to a profile.
pub const UNASSIGNED_PROFILE: i32 = 0;

/// One durable reading row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    /// Owning health profile. Not resolved at ingestion time, so `UNASSIGNED_PROFILE`.
    pub health_profile_id: i32,
    /// Serial number of the device the reading came from. Stores that keep a
    /// device table resolve it to the device's row id.
    pub device_serial: Option<String>,
    /// Metric name, e.g. `heart_rate`.
    pub schema_type: String,
    /// When the reading was taken.
    pub recorded_at: DateTime<Utc>,
    /// The raw event payload.
    pub payload: Payload,
}

/// TTL key-value cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Reads `key`; `None` when missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Append-only durable store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts `record` and returns its new id.
    async fn insert(&self, record: &HealthRecord) -> Result<i64, StoreError>;
}
