//! TLS listener for agent connections
//!
//! Each accepted connection gets its own task: TLS handshake, session
//! setup, a liveness ping, then a place in the pool.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use tt_core::error::TransportError;
use tt_protocol::{MuxConfig, Session};

use crate::connection::{ConnectionPool, PooledSession};

/// Listener that turns agent connections into pooled sessions
pub struct RelayListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    pool: Arc<ConnectionPool>,
    mux: MuxConfig,
}

impl RelayListener {
    /// Bind the listener
    pub async fn bind(
        addr: &str,
        tls: Arc<ServerConfig>,
        pool: Arc<ConnectionPool>,
        mux: MuxConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            pool,
            // Agents never open streams toward the relay
            mux: MuxConfig {
                accept_backlog: 0,
                ..mux
            },
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept agents until cancelled.
    ///
    /// A failed accept on the listening socket is logged and ends the
    /// listener.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TransportError> {
        if let Ok(addr) = self.local_addr() {
            tracing::info!("Relay listener on {}", addr);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Relay listener shutting down");
                    return Ok(());
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            tokio::spawn(establish_session(
                                socket,
                                peer_addr,
                                self.acceptor.clone(),
                                Arc::clone(&self.pool),
                                self.mux.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept agent connection: {}", e);
                            return Err(TransportError::Accept(e));
                        }
                    }
                }
            }
        }
    }
}

/// Handshake with one agent and queue its session
async fn establish_session(
    socket: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    pool: Arc<ConnectionPool>,
    mux: MuxConfig,
) {
    tracing::debug!(remote_addr = %peer_addr, "New agent connection");
    let _ = socket.set_nodelay(true);

    let tls = match acceptor.accept(socket).await {
        Ok(tls) => tls,
        Err(e) => {
            tracing::warn!(remote_addr = %peer_addr, "TLS handshake failed: {}", e);
            return;
        }
    };

    let session = Session::server(tls, mux);
    match session.ping().await {
        Ok(rtt) => {
            tracing::info!(remote_addr = %peer_addr, "Agent connected (rtt {:?})", rtt);
        }
        Err(e) => {
            tracing::warn!(remote_addr = %peer_addr, "Agent failed initial ping: {}", e);
            session.close();
            return;
        }
    }

    if pool.len() >= pool.capacity() {
        tracing::warn!(remote_addr = %peer_addr, "Connection pool full, waiting for room");
    }
    pool.push(PooledSession::new(session, peer_addr)).await;
    tracing::debug!(remote_addr = %peer_addr, pooled = pool.len(), "Session pooled");
}
