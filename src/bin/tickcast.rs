//! tickcast - load-generation client for the tickcast daemon
//!
//! Opens many WebSocket connections, subscribes them, and walks through
//! the command set while logging every frame the server sends.
//!
//! # Usage
//!
//! ```text
//! tickcast                                   # 10 clients against 127.0.0.1:8080
//! tickcast --addr 10.0.0.5:9000 --clients 500
//! tickcast --pause-ms 500 --seed 42          # faster, reproducible choice of clients
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tickcast_client::{LoadTest, LoadTestConfig, DEFAULT_CLIENTS};

// ============================================================================
// CLI Arguments
// ============================================================================

/// tickcast - load-generation client
#[derive(Parser, Debug)]
#[command(name = "tickcast")]
#[command(about = "Drive many subscribers against a tickcast server")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// WebSocket path on the server
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Number of concurrent clients
    #[arg(long, short = 'n', default_value_t = DEFAULT_CLIENTS)]
    clients: usize,

    /// Pause between scenario steps, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pause_ms: u64,

    /// Seed for choosing which client performs each step
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tickcast=info".parse()?)
                .add_directive("tickcast_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = LoadTestConfig {
        url: format!("ws://{}{}", args.addr, args.path),
        clients: args.clients,
        pause: Duration::from_millis(args.pause_ms),
        seed: args.seed,
    };
    info!(url = %config.url, clients = config.clients, "Starting load test");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, closing connections");
                interrupt.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let report = LoadTest::new(config)
        .run(cancel)
        .await
        .context("Load test failed")?;

    println!(
        "clients: {}  broadcasts: {}  counts: {:?}",
        report.connected, report.broadcasts, report.counts
    );
    Ok(())
}
