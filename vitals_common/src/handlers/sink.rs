//! # Reading Sink
//!
//! What every metric handler does after validation: cache the reading for
//! quick lookup, append a durable record and log it. Handlers hold a shared
//! `Arc<ReadingSink>` instead of inheriting this behaviour.

use std::sync::Arc;
use std::time::Duration;

use super::error::HandlerError;
use super::reading::{Metric, Reading};
use crate::connections::{CacheStore, HealthRecord, RecordStore, UNASSIGNED_PROFILE};
use crate::core::{Event, HandlerContext};

/// Lifetime of the cached latest reading.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache key of the latest reading for a user and metric.
pub fn cache_key(user_id: &str, metric: Metric) -> String {
    format!("health_data:{user_id}:{metric}")
}

/// Cache, store and log fan-out for validated readings.
pub struct ReadingSink {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn RecordStore>,
}

impl ReadingSink {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn RecordStore>) -> Self {
        Self { cache, store }
    }

    /// Caches and persists `reading`, returning the new record id.
    ///
    /// No deduplication: the same event accepted twice yields two records.
    pub async fn accept(
        &self,
        ctx: &HandlerContext,
        event: &Event,
        reading: &Reading,
    ) -> Result<i64, HandlerError> {
        ctx.check()?;
        let metric = reading.metric();

        let cached = serde_json::to_string(reading)?;
        self.cache
            .set(&cache_key(reading.user_id(), metric), &cached, CACHE_TTL)
            .await?;

        let record = HealthRecord {
            health_profile_id: UNASSIGNED_PROFILE,
            device_serial: Some(event.device_id.clone()),
            schema_type: metric.as_str().to_string(),
            recorded_at: reading.recorded_at(),
            payload: event.payload.clone(),
        };
        let record_id = self.store.insert(&record).await?;

        tracing::info!(
            user_id = reading.user_id(),
            device_id = %event.device_id,
            metric = metric.as_str(),
            values = %reading.values(),
            timestamp = reading.timestamp(),
            record_id,
            "reading stored"
        );
        Ok(record_id)
    }

    /// The cached latest reading, if still live.
    pub async fn latest(&self, user_id: &str, metric: Metric) -> Result<Option<Reading>, HandlerError> {
        match self.cache.get(&cache_key(user_id, metric)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
