//! tether agent
//!
//! Runs on the remote host, dials out to the relay server over TLS and
//! serves the streams the relay opens: either forwarding each to a fixed
//! target or acting as a SOCKS5 server for it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tt_core::config::{self, AgentConfig};

/// Fingerprint baked in at build time, used when none is configured
const BUILD_FINGERPRINT: Option<&str> = option_env!("TETHER_FINGERPRINT");

#[derive(Parser)]
#[command(name = "tt-agent")]
#[command(about = "tether agent - reverse tunnel endpoint that dials the relay server")]
#[command(version)]
struct Args {
    /// Forward every stream to this address instead of serving SOCKS5
    /// Example: 10.0.0.5:22
    #[arg(long)]
    target: Option<String>,

    /// Relay server address
    #[arg(long)]
    relay: Option<String>,

    /// Pinned SHA-256 fingerprint of the relay certificate (colon-hex)
    #[arg(long)]
    fingerprint: Option<String>,

    /// Accept any relay certificate (no pinning)
    #[arg(long)]
    skip_verify: bool,

    /// Keep reconnecting after failures instead of exiting
    #[arg(long)]
    auto_restart: bool,

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

    tracing::info!("tether agent starting...");

    let mut config: AgentConfig = config::load_or_default(
        args.config.as_deref(),
        &config::default_agent_config_path(),
    )
    .context("Failed to load agent config")?;

    // Apply command-line overrides
    if let Some(target) = args.target {
        config.target_address = Some(target);
    }
    if let Some(relay) = args.relay {
        config.relay_address = relay;
    }
    if let Some(fingerprint) = args.fingerprint {
        config.fingerprint = Some(fingerprint);
    }
    if config.fingerprint.is_none() {
        config.fingerprint = BUILD_FINGERPRINT
            .filter(|fp| !fp.is_empty())
            .map(str::to_string);
    }
    config.skip_verify |= args.skip_verify;
    config.auto_restart |= args.auto_restart;

    if config.skip_verify {
        tracing::warn!("Certificate verification disabled; any relay will be trusted");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            signal_token.cancel();
        }
    });

    tracing::info!("Connecting to relay at {}", config.relay_address);
    tt_agent::run(config, shutdown).await?;

    tracing::info!("Agent stopped");
    Ok(())
}
