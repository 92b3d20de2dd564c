//! WebSocket-aware reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                       GATEWAY                        │
//!                         │                                                      │
//!   Client Request        │  ┌─────────┐    ┌──────────┐    ┌────────────────┐   │
//!   ──────────────────────┼─▶│  http   │───▶│ routing  │───▶│ upgrade?       │   │
//!                         │  │ server  │    │ resolve  │    └──┬──────────┬──┘   │
//!                         │  └─────────┘    └──────────┘   yes │       no │      │
//!                         │                                    ▼          ▼      │
//!                         │                          ┌───────────┐  ┌─────────┐  │
//!   Client WebSocket ◀────┼──────────────────────────│ websocket │  │ http    │──┼──▶ Backend
//!                         │                          │ relay     │──┼─────────┼──┼──▶ Backend (ws)
//!                         │                          └─────┬─────┘  │ forward │  │
//!                         │                                │        └─────────┘  │
//!                         │                          ┌─────▼─────┐               │
//!                         │   admin API ────────────▶│ session   │               │
//!                         │                          │ registry  │               │
//!                         │                          └───────────┘               │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ws_proxy::config::{load_config, ConfigWatcher, ProxyConfig};
use ws_proxy::lifecycle::{signals, Shutdown};
use ws_proxy::observability::{logging, metrics};
use ws_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "ws-proxy")]
#[command(about = "WebSocket-aware reverse proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ws-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let signal = signals::wait_for_signal().await;
        tracing::info!(signal, "Stop requested");
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(config);
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
