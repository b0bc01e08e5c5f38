//! CLI Entry Point for signal-scope
//!
//! # Usage
//!
//! Accept one producer and keep its samples in memory until it disconnects:
//! ```bash
//! signal-scope serve --config config/signal_scope.toml --port 8888
//! ```
//!
//! Stream simulated signals at a listener:
//! ```bash
//! signal-scope simulate --addr 127.0.0.1:8888 --channels 16 --rate 1000 --duration-secs 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use signal_scope::config::{ScopeConfig, DEFAULT_CONFIG_PATH};
use signal_scope::network::{IngestionListener, ShutdownHandle, SignalSender};
use signal_scope::store::{ChannelId, ChannelTap, Sample, SignalStore};
use signal_scope::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "signal-scope")]
#[command(about = "Per-channel in-memory store for streamed JSON signal samples", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept one producer and ingest its records
    Serve {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,

        /// Acknowledge every processed read
        #[arg(long)]
        ack: bool,

        /// Samples to withdraw per channel when the listener closes
        #[arg(long, default_value = "5")]
        drain: u64,
    },

    /// Stream gaussian test signals to a listener
    Simulate {
        /// Listener address
        #[arg(long, default_value = "127.0.0.1:8888")]
        addr: String,

        /// Number of Signal_<n> channels
        #[arg(long, default_value = "16")]
        channels: usize,

        /// Datapoints per second (each datapoint is one record per channel)
        #[arg(long, default_value = "1000")]
        rate: u64,

        /// How long to stream
        #[arg(long, default_value = "10")]
        duration_secs: u64,

        /// Wait for the listener's acknowledgment after each record
        #[arg(long)]
        ack: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            ack,
            drain,
        } => serve(config, port, ack, drain).await,
        Commands::Simulate {
            addr,
            channels,
            rate,
            duration_secs,
            ack,
        } => simulate(addr, channels, rate, duration_secs, ack).await,
    }
}

async fn serve(config_path: PathBuf, port: Option<u16>, ack: bool, drain: u64) -> Result<()> {
    let mut config = ScopeConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(port) = port {
        config.listener.port = port;
    }
    config.listener.acknowledge |= ack;
    telemetry::init_from_config(&config).map_err(anyhow::Error::msg)?;

    info!(
        name = %config.application.name,
        address = %config.listener.bind_address,
        port = config.listener.port,
        "starting ingestion listener"
    );

    let store = Arc::new(SignalStore::new());
    let shutdown = ShutdownHandle::new();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrl_c.trigger();
        }
    });

    let listener_config = config.listener.clone();
    let facade = store.clone();
    let signal = shutdown.signal();
    let summary = tokio::task::spawn_blocking(move || {
        IngestionListener::start(listener_config, facade, signal)
    })
    .await
    .context("listener task failed")??;

    info!(
        reads = summary.reads,
        bytes = summary.bytes_read,
        ingested = summary.records_ingested,
        rejected = summary.records_rejected,
        acks = summary.acks_sent,
        reason = ?summary.close_reason,
        "listener closed"
    );

    let stats = store.stats();
    println!(
        "channels: {}  buffered samples: {}  dropped: {}",
        stats.channel_count, stats.samples_buffered, stats.records_dropped
    );
    for id in store.channel_ids() {
        let tap = ChannelTap::new(store.clone(), id.clone(), drain);
        println!("{:>12}: {:?}", id, tap.egress_records());
    }
    Ok(())
}

async fn simulate(
    addr: String,
    channels: usize,
    rate: u64,
    duration_secs: u64,
    ack: bool,
) -> Result<()> {
    telemetry::init(telemetry::TracingConfig::default()).map_err(anyhow::Error::msg)?;

    let mut sender = SignalSender::connect(&addr)
        .await
        .with_context(|| format!("connecting to {}", addr))?
        .expect_ack(ack);
    info!(peer = %sender.peer(), channels, rate, "streaming simulated signals");

    let ids: Vec<ChannelId> = (0..channels)
        .map(|i| ChannelId::new(format!("Signal_{}", i)))
        .collect();
    let period = Duration::from_micros((1_000_000 / rate.max(1)).max(1));
    let mut ticker = tokio::time::interval(period);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration_secs);
    let mut rng = rand::thread_rng();
    let mut datapoints: u64 = 0;

    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        for (i, id) in ids.iter().enumerate() {
            let value = gaussian(&mut rng, 10.0 * i as f64, 1.0).max(0.0) as u64;
            if let Err(e) = sender.send_sample(id, Sample::new(value, timestamp)).await {
                warn!(error = %e, "listener went away");
                return Err(e.into());
            }
        }
        datapoints += 1;
    }

    info!(datapoints, records = sender.records_sent(), "simulation finished");
    sender.finish().await?;
    Ok(())
}

/// Box-Muller normal sample.
fn gaussian(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
