//! Accelerating reverse proxy
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                    ACCEL PROXY                        │
//!                         │                                                       │
//!   Client Request        │  ┌────────┐   ┌─────────┐   ┌─────────────────────┐  │
//!   ──────────────────────┼─▶│ server │──▶│ routing │──▶│ admission queue     │  │
//!                         │  └────────┘   └─────────┘   │ (api routes)        │  │
//!                         │                             └──────────┬──────────┘  │
//!                         │                                        ▼             │
//!                         │                             ┌─────────────────────┐  │      ┌──────────────┐
//!                         │                             │ pre-authorizer      │──┼─────▶│ control      │
//!                         │                             │ (signed call-out)   │◀─┼──────│ plane        │
//!                         │                             └──────────┬──────────┘  │      └──────────────┘
//!                         │                                        ▼             │
//!   Client Response       │                             ┌─────────────────────┐  │
//!   ◀─────────────────────┼─────────────────────────────│ collaborator /      │  │
//!                         │                             │ SendData directive  │  │
//!                         │                             └─────────────────────┘  │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use accel_proxy::config::{load_config, ProxyConfig};
use accel_proxy::lifecycle::{signals, Shutdown};
use accel_proxy::observability::{logging, metrics};
use accel_proxy::{Collaborators, HttpServer, SecretProvider};

#[derive(Parser, Debug)]
#[command(name = "accel-proxy", version, about = "Accelerating reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "accel-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        control_plane = %config.upstream.control_plane_url,
        url_prefix = %config.upstream.url_prefix,
        api_queue_limit = config.api_queue.limit,
        request_timeout_secs = config.timeouts.request_secs,
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

    let secret = Arc::new(SecretProvider::new(&config.secret.path));
    if let Err(e) = secret.load() {
        tracing::warn!(
            path = %config.secret.path,
            error = %e,
            "Secret not loaded; pre-authorized routes fail until it can be read"
        );
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config, secret, &Collaborators::new())?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown.signalled()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
