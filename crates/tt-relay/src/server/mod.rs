//! Relay server: agent listener, local listener and the hot-swap supervisor

mod handler;
mod listener;
mod local;

pub use handler::{handle_local_connection, LocalOutcome};
pub use listener::RelayListener;
pub use local::LocalListener;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_rustls::rustls::ServerConfig;
use tokio_util::sync::CancellationToken;

use tt_core::config::RelayConfig;
use tt_core::error::TransportError;
use tt_protocol::MuxConfig;

use crate::connection::ConnectionPool;
use crate::session::{run_hot_swap, ActiveSession};

/// A bound relay server
pub struct RelayServer {
    relay: RelayListener,
    local: LocalListener,
    pool: Arc<ConnectionPool>,
    active: Arc<ActiveSession>,
}

impl RelayServer {
    /// Bind both listeners
    pub async fn bind(config: &RelayConfig, tls: Arc<ServerConfig>) -> Result<Self, TransportError> {
        let pool = Arc::new(ConnectionPool::new(config.pool_capacity));
        let active = Arc::new(ActiveSession::new());

        let relay = RelayListener::bind(
            &config.relay_address,
            tls,
            Arc::clone(&pool),
            MuxConfig::from(&config.session),
        )
        .await?;
        let local = LocalListener::bind(&config.local_address, Arc::clone(&active)).await?;

        Ok(Self {
            relay,
            local,
            pool,
            active,
        })
    }

    /// Address agents dial
    pub fn relay_addr(&self) -> std::io::Result<SocketAddr> {
        self.relay.local_addr()
    }

    /// Address local tooling connects to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.local.local_addr()
    }

    /// Sessions waiting behind the active one
    pub fn pool(&self) -> Arc<ConnectionPool> {
        Arc::clone(&self.pool)
    }

    /// The session currently serving local connections
    pub fn active(&self) -> Arc<ActiveSession> {
        Arc::clone(&self.active)
    }

    /// Serve until `cancel` fires or a listener fails
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TransportError> {
        let inner = cancel.child_token();

        let relay_task = tokio::spawn(self.relay.run(inner.clone()));
        let swap_task = tokio::spawn(run_hot_swap(
            Arc::clone(&self.pool),
            Arc::clone(&self.active),
            inner.clone(),
        ));

        let result = self.local.run(inner.clone()).await;

        // The supervisor clears the slot on exit
        let active = self.active.current();
        inner.cancel();
        let relay_result = match relay_task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Relay listener task failed: {}", e);
                Ok(())
            }
        };
        if let Err(e) = swap_task.await {
            tracing::error!("Hot-swap task failed: {}", e);
        }

        if let Some(pooled) = active {
            pooled.session.close();
        }
        while let Some(pooled) = self.pool.try_pop() {
            pooled.session.close();
        }

        result.and(relay_result)
    }
}
