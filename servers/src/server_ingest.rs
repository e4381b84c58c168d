//! # Ingestion Server
//!
//! Receives physiological readings from devices over MQTT and over the framed
//! MessagePack TCP protocol, validates them per metric and stores them in the
//! Redis cache and the PostgreSQL record table.
//!
//! Startup order: `.env`, configuration, logging, stores, pipeline, then both
//! adapters as independent tasks. A failing adapter is logged and does not stop
//! the other one. Ctrl-C or SIGTERM cancels everything.

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod ingest_logic;
use ingest_logic::{adapters, config, logger, state};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let settings = config::load_config()?;
    let _log_guard = logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    tracing::info!(
        tcp = %settings.tcp_addr,
        mqtt_enabled = settings.mqtt_enabled,
        broker = %settings.mqtt.broker,
        dry_run = settings.dry_run,
        "server_ingest starting"
    );

    let cancel = CancellationToken::new();
    let app_state = state::AppState::build(&settings, cancel.clone()).await?;

    let tcp_handle = adapters::spawn_tcp(
        settings.tcp_addr.clone(),
        app_state.dispatcher.clone(),
        cancel.clone(),
    );

    let mqtt_handle = if settings.mqtt_enabled {
        Some(adapters::spawn_mqtt(
            settings.mqtt.clone(),
            app_state.dispatcher.clone(),
            cancel.clone(),
        ))
    } else {
        tracing::info!("mqtt adapter disabled");
        None
    };

    wait_for_shutdown().await;
    cancel.cancel();

    if let Err(e) = tcp_handle.await {
        tracing::error!(error = %e, "tcp adapter task panicked");
    }
    if let Some(handle) = mqtt_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "mqtt adapter task panicked");
        }
    }

    tracing::info!(
        dispatch_dropped = app_state.dispatcher.dropped(),
        bus_dropped = app_state.bus.dropped(),
        "shutdown complete"
    );
    Ok(())
}

async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            tracing::info!("SIGTERM received, initiating shutdown.");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
