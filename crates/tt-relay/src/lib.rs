//! tt-relay: server side of the tether reverse tunnel
//!
//! Agents dial in over TLS and each connection becomes a multiplexed
//! session. Sessions wait in a bounded pool; one of them at a time is
//! active and carries every connection accepted on the local listener.
//! When the active session dies the next pooled one takes over.

pub mod connection;
pub mod server;
pub mod session;

pub use connection::{ConnectionPool, PooledSession};
pub use server::{LocalOutcome, RelayServer};
pub use session::{run_hot_swap, ActiveSession};

use tokio_util::sync::CancellationToken;

use tt_core::config::RelayConfig;
use tt_core::tls::{self, PinnedFingerprint};
use tt_core::TetherError;

/// Load the TLS identity, bind both listeners and serve until `cancel` fires
pub async fn run(config: &RelayConfig, cancel: CancellationToken) -> Result<(), TetherError> {
    let certs = tls::load_certs(&config.cert_file)?;
    let key = tls::load_private_key(&config.key_file)?;
    if let Some(leaf) = certs.first() {
        tracing::info!(
            "Certificate fingerprint: {}",
            PinnedFingerprint::of_certificate(leaf)
        );
    }

    let server = RelayServer::bind(config, tls::server_config(certs, key)?).await?;
    tracing::info!(
        pool_capacity = server.pool().capacity(),
        "Relay ready: agents on {}, local tooling on {}",
        config.relay_address,
        config.local_address
    );
    server.run(cancel).await?;
    Ok(())
}
