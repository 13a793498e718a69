//! The session currently serving local connections

use tokio::sync::watch;

use crate::connection::PooledSession;

/// Holds the one session that serves local connections.
///
/// Only the hot-swap supervisor installs or clears it. Readers always see
/// either the previous or the next value, never a partial one.
#[derive(Debug)]
pub struct ActiveSession {
    tx: watch::Sender<Option<PooledSession>>,
}

impl ActiveSession {
    /// Create an empty slot
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The installed session, live or not
    pub fn current(&self) -> Option<PooledSession> {
        self.tx.borrow().clone()
    }

    /// The installed session if it can still carry streams
    pub fn current_live(&self) -> Option<PooledSession> {
        self.current().filter(PooledSession::is_live)
    }

    /// Make `session` the active one
    pub fn install(&self, session: PooledSession) {
        self.tx.send_replace(Some(session));
    }

    /// Empty the slot
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Wait until a live session is installed and return it
    pub async fn wait_ready(&self) -> PooledSession {
        let mut rx = self.tx.subscribe();
        loop {
            let installed = rx.borrow_and_update().clone();
            if let Some(pooled) = installed.filter(PooledSession::is_live) {
                return pooled;
            }
            // The sender lives in `self`, so this only returns on a change
            let _ = rx.changed().await;
        }
    }
}

impl Default for ActiveSession {
    fn default() -> Self {
        Self::new()
    }
}
