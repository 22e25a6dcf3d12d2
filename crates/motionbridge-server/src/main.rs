//! Motionbridge server binary.
//!
//! # Usage
//!
//! ```bash
//! # Scan for a free port from 8080 upward
//! motionbridge-server
//!
//! # Explicit port, fail fast if taken
//! motionbridge-server --port 9100 --max-connections 20
//! ```
//!
//! The standalone binary runs without device or processing ports injected;
//! device operations answer `DEVICE_UNAVAILABLE` until an embedding
//! application provides the ports.

use clap::Parser;
use motionbridge_core::{BridgeConfig, PerformanceMode};
use motionbridge_server::{Bridge, BridgePorts};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Motion sensor message bridge
#[derive(Parser, Debug)]
#[command(name = "motionbridge-server")]
#[command(about = "WebSocket bridge between the device, processing, and UI planes")]
#[command(version)]
struct Args {
    /// Explicit listen port; scans from 8080 when omitted
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum simultaneous sessions
    #[arg(long, default_value = "10")]
    max_connections: usize,

    /// Workload preset: high_throughput, low_latency, balanced
    #[arg(long, default_value = "balanced")]
    performance_mode: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let Some(mode) = PerformanceMode::parse(&args.performance_mode) else {
        return Err(format!("unknown performance mode: {}", args.performance_mode).into());
    };

    let mut config = BridgeConfig::for_mode(mode);
    config.port = args.port;
    config.max_connections = args.max_connections;

    tracing::info!("motionbridge server starting");

    let bridge = Bridge::start(config, BridgePorts::default()).await?;
    tracing::info!("listening on {}", bridge.url());

    tokio::signal::ctrl_c().await?;

    bridge.shutdown().await;
    Ok(())
}
