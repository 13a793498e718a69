//! Connection pool implementation
//!
//! Agent sessions that completed their handshake wait here, in arrival
//! order, until the hot-swap supervisor makes them active. The pool is
//! bounded: when it is full, new sessions wait for room.

use std::net::SocketAddr;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use tt_protocol::Session;

/// An established agent session and where it came from
#[derive(Debug, Clone)]
pub struct PooledSession {
    /// The multiplexed session
    pub session: Session,
    /// Agent's address as seen by the relay listener
    pub peer_addr: SocketAddr,
}

impl PooledSession {
    /// Create a new pool entry
    pub fn new(session: Session, peer_addr: SocketAddr) -> Self {
        Self { session, peer_addr }
    }

    /// Whether the session can still carry streams
    pub fn is_live(&self) -> bool {
        !self.session.is_closed()
    }
}

/// Bounded FIFO of agent sessions waiting to become active
#[derive(Debug)]
pub struct ConnectionPool {
    tx: mpsc::Sender<PooledSession>,
    rx: Mutex<mpsc::Receiver<PooledSession>>,
}

impl ConnectionPool {
    /// Create an empty pool holding at most `capacity` sessions
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Add a session, waiting while the pool is full
    pub async fn push(&self, session: PooledSession) {
        // The pool owns the receiver, so the channel cannot be closed here
        let _ = self.tx.send(session).await;
    }

    /// Take the oldest session, waiting while the pool is empty
    pub async fn pop(&self) -> Option<PooledSession> {
        self.rx.lock().await.recv().await
    }

    /// Take the oldest session without waiting
    pub fn try_pop(&self) -> Option<PooledSession> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Take the oldest session that is still live, discarding dead ones
    pub async fn pop_live(&self) -> Option<PooledSession> {
        loop {
            let pooled = self.pop().await?;
            if pooled.is_live() {
                return Some(pooled);
            }
            debug!(remote_addr = %pooled.peer_addr, "Discarding session that closed while pooled");
        }
    }

    /// Number of sessions waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Check if pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of waiting sessions
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
