use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vitals_common::connections::{
    CacheStore, MemoryCache, MemoryRecordStore, PgRecordStore, RecordStore, RedisCache,
};
use vitals_common::core::{Dispatcher, EventBus, Pipeline};
use vitals_common::handlers::{ReadingSink, standard_processors};

use super::config::Settings;

/// Everything the adapters share, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub pipeline: Arc<Pipeline>,
    pub dispatcher: Arc<Dispatcher>,
    pub sink: Arc<ReadingSink>,
    pub cancel: CancellationToken,
}

impl AppState {
    /// Connects the stores (or in-memory stand-ins on a dry run) and wires the pipeline.
    pub async fn build(settings: &Settings, cancel: CancellationToken) -> Result<Self> {
        let (cache, store) = if settings.dry_run {
            tracing::warn!("dry run: readings are kept in memory only");
            (
                Arc::new(MemoryCache::new()) as Arc<dyn CacheStore>,
                Arc::new(MemoryRecordStore::new()) as Arc<dyn RecordStore>,
            )
        } else {
            let redis = RedisCache::connect(&settings.redis_url)
                .await
                .context("failed to connect to redis")?;
            redis.ping().await.context("redis ping failed")?;
            tracing::info!("redis cache ready");

            let postgres = PgRecordStore::new(&settings.database_url, settings.db_max_connections)
                .context("failed to create database pool")?;
            postgres.ping().await.context("postgres ping failed")?;
            tracing::info!(max_connections = settings.db_max_connections, "postgres pool ready");

            (
                Arc::new(redis) as Arc<dyn CacheStore>,
                Arc::new(postgres) as Arc<dyn RecordStore>,
            )
        };

        Ok(Self::with_stores(settings, cache, store, cancel))
    }

    /// Wires bus, pipeline and dispatcher around the given stores.
    pub fn with_stores(
        settings: &Settings,
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn RecordStore>,
        cancel: CancellationToken,
    ) -> Self {
        let sink = Arc::new(ReadingSink::new(cache, store));
        let bus = Arc::new(EventBus::with_max_inflight(settings.bus_max_inflight));

        let mut pipeline = Pipeline::new(Some(Arc::clone(&bus)), cancel.clone());
        for processor in standard_processors(Arc::clone(&sink)) {
            pipeline.register_processor(processor);
        }
        let pipeline = Arc::new(pipeline);

        let dispatcher = Dispatcher::spawn(Arc::clone(&pipeline), settings.dispatch, cancel.clone());

        Self {
            bus,
            pipeline,
            dispatcher,
            sink,
            cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_logic::config::Config;
    use vitals_common::core::{Event, Source};
    use vitals_common::handlers::Metric;
    use std::time::Duration;

    #[tokio::test]
    async fn dry_run_state_stores_readings_in_memory() {
        let settings = Config::defaults()
            .merge(Config {
                dry_run: Some(true),
                ..Default::default()
            })
            .into_settings()
            .unwrap();
        let state = AppState::build(&settings, CancellationToken::new()).await.unwrap();
        assert_eq!(state.pipeline.processor_count(), 4);

        let serde_json::Value::Object(payload) =
            serde_json::json!({"user_id": "u1", "heart_rate": 72, "timestamp": 1690000000})
        else {
            unreachable!()
        };
        assert!(
            state
                .dispatcher
                .dispatch(Event::new("77", "heart_rate", payload, Source::Mqtt))
                .await
        );

        let mut latest = None;
        for _ in 0..100 {
            latest = state.sink.latest("u1", Metric::HeartRate).await.unwrap();
            if latest.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(latest.is_some());
    }
}
