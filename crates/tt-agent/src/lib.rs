//! tt-agent: Tunnel agent for tether
//!
//! The agent runs on the remote host and dials out to the relay server over
//! TLS. Every stream the relay opens on the resulting session is either
//! forwarded to a fixed target or served by the embedded SOCKS5 responder.

pub mod dispatch;
pub mod socks;
pub mod tunnel;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tt_core::config::AgentConfig;

use dispatch::{serve_streams, StreamHandler};
use tunnel::{ConnectionError, ExponentialBackoff, TunnelConnector};

/// Run the agent until it fails or `shutdown` is cancelled.
///
/// Without `auto_restart` the first connection failure or session end is
/// returned. With it, the agent logs the failure, waits for the restart
/// backoff and tries again indefinitely. The backoff starts over after every
/// session that gets established.
pub async fn run(config: AgentConfig, shutdown: CancellationToken) -> Result<(), ConnectionError> {
    config.validate()?;
    let connector = TunnelConnector::new(config.clone())?;
    let handler = Arc::new(StreamHandler::from_config(&config));
    let mut backoff = ExponentialBackoff::from_config(&config.restart);

    match &config.target_address {
        Some(target) => tracing::info!("Forwarding streams to {}", target),
        None => tracing::info!("Serving streams with SOCKS5"),
    }

    loop {
        let Some(error) =
            run_session(&connector, Arc::clone(&handler), &mut backoff, &shutdown).await
        else {
            return Ok(());
        };

        if !config.auto_restart {
            return Err(error);
        }

        let delay = backoff.next_delay();
        tracing::warn!("{}. Restarting in {:?}", error, delay);
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Connect once and serve streams until the session ends.
///
/// Returns `None` when `shutdown` fired; the session is closed either way.
async fn run_session(
    connector: &TunnelConnector,
    handler: Arc<StreamHandler>,
    backoff: &mut ExponentialBackoff,
    shutdown: &CancellationToken,
) -> Option<ConnectionError> {
    let connected = tokio::select! {
        _ = shutdown.cancelled() => return None,
        connected = connector.connect() => connected,
    };
    let tunnel = match connected {
        Ok(tunnel) => tunnel,
        Err(e) => return Some(e),
    };
    tracing::info!("Connected to relay at {}", tunnel.relay_address());
    backoff.reset();

    let error = tokio::select! {
        _ = shutdown.cancelled() => None,
        e = serve_streams(tunnel.session(), handler) => Some(ConnectionError::Session(e)),
    };
    tunnel.close();
    tracing::info!("Session with {} ended", tunnel.relay_address());
    error
}
