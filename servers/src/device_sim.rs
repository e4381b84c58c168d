//! # Device Simulator
//!
//! Sends generated readings to a running `server_ingest`, either as MQTT
//! messages on `device/<id>/data/<metric>` or as MessagePack frames over TCP.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use vitals_common::framing::{encode_frame, encode_payload};
use vitals_common::handlers::{Metric, Reading};
use vitals_common::ingestors::parse_broker;
use vitals_common::simdata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Mqtt,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MetricArg {
    HeartRate,
    BloodPressure,
    Spo2,
    Temperature,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::HeartRate => Metric::HeartRate,
            MetricArg::BloodPressure => Metric::BloodPressure,
            MetricArg::Spo2 => Metric::Spo2,
            MetricArg::Temperature => Metric::Temperature,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(about = "Simulated physiological sensor", version)]
struct Args {
    #[clap(long, value_enum, default_value = "mqtt", help = "Transport to send readings over.")]
    transport: Transport,

    #[clap(long, default_value = "sim-device-1", help = "Device id (MQTT topic segment or frame sn).")]
    device_id: String,

    #[clap(long, default_value = "sim-user-1", help = "User id carried in every reading.")]
    user_id: String,

    #[clap(long, value_enum, help = "Only send this metric. Cycles through all metrics when omitted.")]
    metric: Option<MetricArg>,

    #[clap(long, default_value_t = 10, help = "Number of readings to send.")]
    count: u64,

    #[clap(long, default_value_t = 1000, help = "Delay between readings in milliseconds.")]
    interval_ms: u64,

    #[clap(long, env = "MQTT_BROKER", default_value = "tcp://127.0.0.1:1883", help = "Broker URL.")]
    broker: String,

    #[clap(long, default_value = "127.0.0.1:5858", help = "Address of the framed TCP listener.")]
    tcp_addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let readings = readings(&args);

    match args.transport {
        Transport::Mqtt => send_mqtt(&args, readings).await,
        Transport::Tcp => send_tcp(&args, readings).await,
    }
}

/// The readings to send, one per tick.
fn readings(args: &Args) -> impl Iterator<Item = Reading> + '_ {
    let mut rng = rand::rng();
    (0..args.count).map(move |i| {
        let metric = match args.metric {
            Some(metric) => metric.into(),
            None => Metric::ALL[(i % Metric::ALL.len() as u64) as usize],
        };
        simdata::generate(&mut rng, metric, &args.user_id, chrono::Utc::now().timestamp())
    })
}

async fn send_mqtt(args: &Args, readings: impl Iterator<Item = Reading>) -> Result<()> {
    let (host, port) = parse_broker(&args.broker)?;
    let mut opts = MqttOptions::new(format!("device_sim_{}", args.device_id), host, port);
    opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut event_loop) = AsyncClient::new(opts, 64);

    let poller = tokio::spawn(async move {
        loop {
            if let Err(e) = event_loop.poll().await {
                tracing::warn!(error = %e, "mqtt poll error");
                break;
            }
        }
    });

    for reading in readings {
        let (topic, body) = simdata::mqtt_message(&args.device_id, &reading);
        client
            .publish(topic.as_str(), QoS::AtMostOnce, false, body)
            .await
            .context("failed to queue mqtt publish")?;
        tracing::info!(%topic, values = %reading.values(), "published");
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    client.disconnect().await.context("failed to queue mqtt disconnect")?;
    let _ = tokio::time::timeout(Duration::from_secs(2), poller).await;
    Ok(())
}

async fn send_tcp(args: &Args, readings: impl Iterator<Item = Reading>) -> Result<()> {
    let mut stream = TcpStream::connect(&args.tcp_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.tcp_addr))?;

    for reading in readings {
        let payload = encode_payload(&simdata::frame_payload(&args.device_id, &reading))?;
        let frame = encode_frame(&payload)?;
        stream.write_all(&frame).await.context("failed to write frame")?;
        tracing::info!(sn = %args.device_id, bytes = frame.len(), values = %reading.values(), "frame sent");
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    stream.shutdown().await?;
    Ok(())
}
