//! Authorizing reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ http server ──▶ routing ──▶ runtime        │
//!                           │                     (tag)       │  ▲         │
//!                           │                                 ▼  │         │
//!                           │                          auth state machine ─┼──▶ Auth Service
//!                           │                                 │            │
//!                           │              ┌──── authorized ──┴── denied ─┐│
//!                           │              ▼                              ▼│
//!     Client Response       │        forward upstream            relay / 403│──▶ Upstream
//!     ◀─────────────────────┼──────────────┴──────────────────────────────┘│
//!                           └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use authproxy::config::{load_config, ProxyConfig};
use authproxy::lifecycle::{signals, Shutdown};
use authproxy::observability::{logging, metrics};
use authproxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "authproxy", version, about = "Reverse proxy with delegated authorization")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability.log_level, config.observability.log_format)?;

    tracing::info!("authproxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        auth_mode = ?config.auth.mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
