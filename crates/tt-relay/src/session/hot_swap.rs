//! Hot-swap supervisor
//!
//! Keeps exactly one pooled session active: when the active session closes,
//! the next live one from the pool takes over. While the pool is empty the
//! active slot stays cleared, which pauses the local listener.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::ConnectionPool;
use crate::session::ActiveSession;

/// Run the supervisor until `cancel` fires
pub async fn run_hot_swap(
    pool: Arc<ConnectionPool>,
    active: Arc<ActiveSession>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = pool.pop_live() => next,
        };
        let Some(pooled) = next else { break };

        info!(
            remote_addr = %pooled.peer_addr,
            pooled = pool.len(),
            "Session is now active"
        );
        active.install(pooled.clone());

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = pooled.session.closed() => {}
        }
        active.clear();
        warn!(remote_addr = %pooled.peer_addr, "Active session closed");
    }

    active.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::pooled;
    use std::time::Duration;

    #[tokio::test]
    async fn test_swaps_to_next_session() {
        let pool = Arc::new(ConnectionPool::new(4));
        let active = Arc::new(ActiveSession::new());
        let cancel = CancellationToken::new();

        let (first, _a) = pooled(1);
        let (second, _b) = pooled(2);
        pool.push(first.clone()).await;
        pool.push(second).await;

        let supervisor = tokio::spawn(run_hot_swap(
            Arc::clone(&pool),
            Arc::clone(&active),
            cancel.clone(),
        ));

        let ready = tokio::time::timeout(Duration::from_secs(1), active.wait_ready())
            .await
            .unwrap();
        assert_eq!(ready.peer_addr.port(), 1);

        first.session.close();
        let next = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let ready = active.wait_ready().await;
                if ready.peer_addr.port() == 2 {
                    return ready;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(next.peer_addr.port(), 2);

        cancel.cancel();
        supervisor.await.unwrap();
        assert!(active.current().is_none());
    }

    #[tokio::test]
    async fn test_slot_cleared_while_pool_empty() {
        let pool = Arc::new(ConnectionPool::new(4));
        let active = Arc::new(ActiveSession::new());
        let cancel = CancellationToken::new();

        let (only, _a) = pooled(1);
        pool.push(only.clone()).await;
        let supervisor = tokio::spawn(run_hot_swap(
            Arc::clone(&pool),
            Arc::clone(&active),
            cancel.clone(),
        ));
        active.wait_ready().await;

        only.session.close();
        tokio::time::timeout(Duration::from_secs(1), async {
            while active.current().is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // A newcomer is picked up
        let (late, _b) = pooled(3);
        pool.push(late).await;
        let ready = tokio::time::timeout(Duration::from_secs(1), active.wait_ready())
            .await
            .unwrap();
        assert_eq!(ready.peer_addr.port(), 3);

        cancel.cancel();
        supervisor.await.unwrap();
    }

    #[tokio::test]
    async fn test_skips_sessions_that_died_in_pool() {
        let pool = Arc::new(ConnectionPool::new(4));
        let active = Arc::new(ActiveSession::new());
        let cancel = CancellationToken::new();

        let (dead, _a) = pooled(1);
        let (live, _b) = pooled(2);
        dead.session.close();
        pool.push(dead).await;
        pool.push(live).await;

        let supervisor = tokio::spawn(run_hot_swap(
            Arc::clone(&pool),
            Arc::clone(&active),
            cancel.clone(),
        ));
        let ready = tokio::time::timeout(Duration::from_secs(1), active.wait_ready())
            .await
            .unwrap();
        assert_eq!(ready.peer_addr.port(), 2);

        cancel.cancel();
        supervisor.await.unwrap();
    }
}
