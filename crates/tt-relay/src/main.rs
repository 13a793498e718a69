//! tether relay server
//!
//! Accepts TLS connections from agents, keeps their sessions in a pool and
//! relays every connection on the local listener through the active one.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tt_core::config::{self, RelayConfig};

#[derive(Parser)]
#[command(name = "tt-relay")]
#[command(about = "tether relay server - pools agent sessions and exposes them locally")]
#[command(version)]
struct Args {
    /// Address local tooling connects to
    /// Example: 127.0.0.1:1080
    #[arg(long)]
    local: Option<String>,

    /// Address agents dial
    #[arg(long)]
    relay: Option<String>,

    /// PEM certificate chain presented to agents
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// PEM private key for the certificate
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Maximum number of sessions waiting in the pool
    #[arg(long)]
    pool_capacity: Option<usize>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tether relay starting...");

    let mut config: RelayConfig = config::load_or_default(
        args.config.as_deref(),
        &config::default_relay_config_path(),
    )
    .context("Failed to load relay config")?;

    // Apply command-line overrides
    if let Some(local) = args.local {
        config.local_address = local;
    }
    if let Some(relay) = args.relay {
        config.relay_address = relay;
    }
    if let Some(cert_file) = args.cert_file {
        config.cert_file = cert_file;
    }
    if let Some(key_file) = args.key_file {
        config.key_file = key_file;
    }
    if let Some(capacity) = args.pool_capacity {
        config.pool_capacity = capacity;
    }

    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    tt_relay::run(&config, cancel).await?;

    tracing::info!("Relay shutdown complete");
    Ok(())
}
