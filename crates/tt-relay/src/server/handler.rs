//! Per-connection handler for the local listener

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};

use tt_core::relay::{relay, RelayOutcome};

use crate::session::ActiveSession;

/// What happened to a local connection
#[derive(Debug)]
pub enum LocalOutcome {
    /// No live active session; the connection was closed untouched
    Rejected,
    /// The active session refused a new stream
    OpenFailed,
    /// The relay ran to completion
    Relayed(RelayOutcome),
    /// The session closed while the relay was running
    SessionClosed,
}

/// Relay one local connection over a new stream on the active session.
///
/// The connection is dropped, and with it closed, when this returns.
pub async fn handle_local_connection<S>(
    conn: S,
    peer_addr: SocketAddr,
    active: &ActiveSession,
) -> LocalOutcome
where
    S: AsyncRead + AsyncWrite,
{
    let Some(pooled) = active.current_live() else {
        warn!(remote_addr = %peer_addr, "No active session; closing connection");
        return LocalOutcome::Rejected;
    };

    let stream = match pooled.session.open_stream() {
        Ok(stream) => stream,
        Err(e) => {
            error!(remote_addr = %peer_addr, "Failed to open stream: {}", e);
            return LocalOutcome::OpenFailed;
        }
    };
    debug!(
        remote_addr = %peer_addr,
        agent = %pooled.peer_addr,
        active_streams = pooled.session.num_streams(),
        "Relaying over {}",
        stream.id()
    );

    tokio::select! {
        outcome = relay(conn, stream) => {
            debug!(
                remote_addr = %peer_addr,
                "Relay ended ({} closed after {} bytes)",
                outcome.first_closed,
                outcome.bytes
            );
            LocalOutcome::Relayed(outcome)
        }
        _ = pooled.session.closed() => {
            debug!(remote_addr = %peer_addr, "Session closed during relay");
            LocalOutcome::SessionClosed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::pooled;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50000))
    }

    #[tokio::test]
    async fn test_rejects_without_active_session() {
        let active = ActiveSession::new();
        let (_client, conn) = duplex(1024);
        assert!(matches!(
            handle_local_connection(conn, peer(), &active).await,
            LocalOutcome::Rejected
        ));
    }

    #[tokio::test]
    async fn test_rejects_closed_active_session() {
        let active = ActiveSession::new();
        let (session, _agent) = pooled(1);
        session.session.close();
        active.install(session);

        let (_client, conn) = duplex(1024);
        assert!(matches!(
            handle_local_connection(conn, peer(), &active).await,
            LocalOutcome::Rejected
        ));
    }

    #[tokio::test]
    async fn test_relays_over_new_stream() {
        let active = ActiveSession::new();
        let (session, agent) = pooled(1);
        active.install(session);

        // Agent echoes one stream
        tokio::spawn(async move {
            let mut stream = agent.accept_stream().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
            stream.shutdown().await.unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });

        let (mut client, conn) = duplex(1024);
        let handler = tokio::spawn(async move {
            handle_local_connection(conn, peer(), &active).await
        });

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let outcome = tokio::time::timeout(Duration::from_secs(5), handler)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, LocalOutcome::Relayed(_)));
    }

    #[tokio::test]
    async fn test_session_close_ends_relay() {
        let active = ActiveSession::new();
        let (session, agent) = pooled(1);
        let relay_session = session.session.clone();
        active.install(session);

        let (_client, conn) = duplex(1024);
        let handler = tokio::spawn(async move {
            handle_local_connection(conn, peer(), &active).await
        });

        let _stream = agent.accept_stream().await.unwrap();
        relay_session.close();

        let outcome = tokio::time::timeout(Duration::from_secs(5), handler)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            outcome,
            LocalOutcome::SessionClosed | LocalOutcome::Relayed(_)
        ));
    }
}
