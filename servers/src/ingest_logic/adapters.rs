use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vitals_common::core::Dispatcher;
use vitals_common::ingestors::{MqttIngestor, MqttSettings, TcpFramedIngestor};

/// Binds and serves the framed TCP listener in its own task.
///
/// Bind and accept failures are logged and end only this task.
pub fn spawn_tcp(addr: String, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match TcpFramedIngestor::bind(&addr, dispatcher).await {
            Ok(ingestor) => ingestor.run(cancel).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(addr = %addr, error = %e, "tcp adapter stopped");
        }
    })
}

/// Runs the broker subscriber in its own task. Failures are logged and end only this task.
pub fn spawn_mqtt(settings: MqttSettings, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let broker = settings.broker.clone();
        if let Err(e) = MqttIngestor::new(settings, dispatcher).run(cancel).await {
            tracing::error!(broker = %broker, error = %e, "mqtt adapter stopped");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_logic::config::Config;
    use crate::ingest_logic::state::AppState;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use vitals_common::core::{Event, Source};
    use vitals_common::handlers::Metric;

    fn dry_run_state(cancel: CancellationToken) -> AppState {
        let settings = Config::defaults()
            .merge(Config {
                dry_run: Some(true),
                ..Default::default()
            })
            .into_settings()
            .unwrap();
        AppState::with_stores(
            &settings,
            Arc::new(vitals_common::connections::MemoryCache::new()),
            Arc::new(vitals_common::connections::MemoryRecordStore::new()),
            cancel,
        )
    }

    #[tokio::test]
    async fn tcp_bind_failure_leaves_the_rest_running() {
        let cancel = CancellationToken::new();
        let state = dry_run_state(cancel.clone());
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let tcp = spawn_tcp(addr, state.dispatcher.clone(), cancel.clone());
        // The task ends on its own with the bind error logged, not a panic.
        tokio::time::timeout(Duration::from_secs(2), tcp).await.unwrap().unwrap();

        let serde_json::Value::Object(payload) = serde_json::json!({"user_id": "u1", "spo2": 97}) else {
            unreachable!()
        };
        assert!(state.dispatcher.dispatch(Event::new("77", "spo2", payload, Source::Mqtt)).await);
        let mut latest = None;
        for _ in 0..100 {
            latest = state.sink.latest("u1", Metric::Spo2).await.unwrap();
            if latest.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(latest.is_some());
        cancel.cancel();
    }

    #[tokio::test]
    async fn mqtt_failure_ends_only_its_task() {
        let cancel = CancellationToken::new();
        let state = dry_run_state(cancel.clone());
        let tcp = spawn_tcp("127.0.0.1:0".to_string(), state.dispatcher.clone(), cancel.clone());

        let settings = MqttSettings {
            broker: "tcp://:1883".to_string(),
            client_id: "adapters-test".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_millis(200),
        };
        let mqtt = spawn_mqtt(settings, state.dispatcher.clone(), cancel.clone());
        tokio::time::timeout(Duration::from_secs(2), mqtt).await.unwrap().unwrap();

        assert!(!tcp.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), tcp).await.unwrap().unwrap();
    }
}
