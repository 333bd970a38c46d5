//! HTTP forwarding relay (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  FORWARDING RELAY                 │
//!   Client Request       │  ┌─────────┐    ┌──────────┐    ┌─────────────┐  │
//!   ─────────────────────┼─▶│  http   │───▶│  relay   │───▶│    chain    │  │
//!                        │  │ server  │    │  entry   │    │  validator  │  │
//!                        │  └─────────┘    └────┬─────┘    └─────────────┘  │
//!   200 / 202 / 400      │                      │ spawn (Valid only)         │
//!   ◀────────────────────┼──────────────────────┤                            │
//!                        │                      ▼                            │
//!                        │               ┌─────────────┐                     │
//!                        │               │ hop         │─────────────────────┼──▶ Next hop
//!                        │               │ dispatcher  │                     │
//!                        │               └──────┬──────┘                     │
//!                        │                      │ on failure                 │
//!                        │                      ▼                            │
//!                        │               ┌─────────────┐                     │
//!                        │               │   error     │─────── UDP ─────────┼──▶ Error collector
//!                        │               │  reporter   │                     │
//!                        │               └─────────────┘                     │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use hop_relay::config::resolve_config;
use hop_relay::observability::{logging, metrics};
use hop_relay::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "hop-relay")]
#[command(about = "HTTP forwarding relay", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.bind)?;

    logging::init_logging(&config.observability)?;
    tracing::info!("hop-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        hop_timeout_secs = config.forwarding.hop_timeout_secs,
        connect_attempts = config.forwarding.connect_attempts,
        max_in_flight = config.forwarding.max_in_flight,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal = shutdown.clone();
    tokio::spawn(async move { signal.trigger_on_ctrl_c().await });

    let server = HttpServer::new(config)?;
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
