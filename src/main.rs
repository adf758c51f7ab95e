//! quantum-gateway
//!
//! A reverse proxy whose request/response path carries a body observability
//! pipeline: probabilistic sampling of response bodies, a timer-gated hold
//! of inbound request bodies, and a lazily rendered diagnostic variable
//! combining both, exposed in the completion log.
//!
//! ```text
//!  client ──▶ trace ─▶ request-id ─▶ reject ─▶ timeout ─┐
//!                                                       ▼
//!                                    ┌──────────────────────────┐
//!                                    │       proxy handler      │
//!                                    │  deferred hold (inbound) │──▶ upstream
//!                                    │  observer (outbound)     │◀── upstream
//!                                    └──────────────────────────┘
//!                                                       │
//!  client ◀── response (unchanged) ◀────────────────────┘
//!                     completion log: probe = "<in> -> <out>"
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use quantum_gateway::config::{load_config, watcher, GatewayConfig};
use quantum_gateway::observability::{logging, metrics};
use quantum_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "quantum-gateway", version, about = "Reverse proxy with a body observability tap")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        tap_enabled = config.tap.enabled,
        hold_enabled = config.tap.hold_enabled,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    // Hot reload feeds the server fresh tap settings; without a config file
    // the channel just stays empty.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, rx) = watcher::watch(path)?;
            (Some(watcher), rx)
        }
        None => {
            let (_, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
        }
        shutdown.trigger();
    });

    let server = HttpServer::new(config);
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
