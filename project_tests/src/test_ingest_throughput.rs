use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use vitals_common::framing::{encode_frame, encode_payload};
use vitals_common::handlers::Metric;
use vitals_common::simdata;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Floods a running server_ingest with framed readings", long_about = None)]
struct Args {
    /// Framed TCP endpoint of the server
    #[clap(long, default_value = "127.0.0.1:5858")]
    addr: String,

    /// Concurrent device connections
    #[clap(short, long, default_value_t = 8)]
    connections: usize,

    /// Frames per connection
    #[clap(short, long, default_value_t = 10_000)]
    frames: u64,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 1)]
    report_interval_secs: u64,
}

struct Stats {
    frames: AtomicU64,
    bytes: AtomicU64,
}

async fn flood(addr: String, device: usize, frames: u64, stats: Arc<Stats>) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connect {addr}"))?;
    let device_id = format!("bench-{device:03}");
    let user_id = format!("user-{device:03}");
    let mut rng = StdRng::from_os_rng();

    for i in 0..frames {
        let metric = Metric::ALL[(i as usize) % Metric::ALL.len()];
        let reading = simdata::generate(&mut rng, metric, &user_id, Utc::now().timestamp());
        let frame = encode_frame(&encode_payload(&simdata::frame_payload(&device_id, &reading))?)?;
        stream.write_all(&frame).await?;
        stats.frames.fetch_add(1, Ordering::Relaxed);
        stats.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
    }
    stream.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let stats = Arc::new(Stats {
        frames: AtomicU64::new(0),
        bytes: AtomicU64::new(0),
    });

    let reporter_stats = Arc::clone(&stats);
    let interval = Duration::from_secs(args.report_interval_secs.max(1));
    let reporter = tokio::spawn(async move {
        let mut last = 0;
        loop {
            tokio::time::sleep(interval).await;
            let now = reporter_stats.frames.load(Ordering::Relaxed);
            println!(
                "{} frames/s ({} total)",
                (now - last) / interval.as_secs(),
                now
            );
            last = now;
        }
    });

    println!("Flooding {} with {} connections x {} frames...", args.addr, args.connections, args.frames);
    let started = Instant::now();
    let workers: Vec<_> = (0..args.connections)
        .map(|device| tokio::spawn(flood(args.addr.clone(), device, args.frames, Arc::clone(&stats))))
        .collect();

    for worker in workers {
        if let Err(e) = worker.await? {
            eprintln!("connection failed: {e:#}");
        }
    }
    reporter.abort();

    let elapsed = started.elapsed().as_secs_f64();
    let frames = stats.frames.load(Ordering::Relaxed);
    println!("\n----- Summary -----");
    println!("Frames sent: {frames}");
    println!("Bytes sent: {}", stats.bytes.load(Ordering::Relaxed));
    println!("Elapsed: {elapsed:.2}s");
    println!("Rate: {:.0} frames/s", frames as f64 / elapsed.max(f64::EPSILON));
    println!("-------------------");
    Ok(())
}
