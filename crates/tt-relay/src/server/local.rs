//! Plain TCP listener for local tooling

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tt_core::error::TransportError;

use super::handler::handle_local_connection;
use crate::session::ActiveSession;

/// Listener whose connections are relayed over the active session
pub struct LocalListener {
    listener: TcpListener,
    active: Arc<ActiveSession>,
}

impl LocalListener {
    /// Bind the listener
    pub async fn bind(addr: &str, active: Arc<ActiveSession>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, active })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept local connections until cancelled.
    ///
    /// Accepting pauses whenever there is no live active session, so
    /// connections queue in the socket backlog instead of being refused.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TransportError> {
        if let Ok(addr) = self.local_addr() {
            tracing::info!("Local listener on {}", addr);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.active.wait_ready() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.listener.accept() => result,
            };

            match result {
                Ok((socket, peer_addr)) => {
                    let _ = socket.set_nodelay(true);
                    let active = Arc::clone(&self.active);
                    tokio::spawn(async move {
                        handle_local_connection(socket, peer_addr, &active).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept local connection: {}", e);
                    return Err(TransportError::Accept(e));
                }
            }
        }

        tracing::info!("Local listener shutting down");
        Ok(())
    }
}
