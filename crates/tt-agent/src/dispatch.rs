//! Serving the streams the relay opens over the tunnel

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use tt_core::config::AgentConfig;
use tt_core::relay::{relay, RelayOutcome};
use tt_protocol::{MuxError, MuxStream, Session, StreamId};

use crate::socks::SocksResponder;

/// Dial `addr`, giving up after `timeout`
pub(crate) async fn dial<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<TcpStream> {
    let conn = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dial timed out"))??;
    let _ = conn.set_nodelay(true);
    Ok(conn)
}

/// What the agent does with each stream the relay opens
#[derive(Debug, Clone)]
pub enum StreamHandler {
    /// Forward every stream to one fixed address
    Target {
        address: String,
        dial_timeout: Duration,
    },
    /// Speak SOCKS5 on the stream and forward to the requested target
    Socks(SocksResponder),
}

impl StreamHandler {
    /// Fixed target if one is configured, SOCKS5 otherwise
    pub fn from_config(config: &AgentConfig) -> Self {
        match &config.target_address {
            Some(address) => StreamHandler::Target {
                address: address.clone(),
                dial_timeout: config.dial_timeout,
            },
            None => StreamHandler::Socks(SocksResponder::new(config.dial_timeout)),
        }
    }

    /// Serve one stream until its relay finishes.
    ///
    /// Failures are logged and affect only this stream.
    pub async fn handle(&self, stream: MuxStream) {
        let id = stream.id();
        match self {
            StreamHandler::Target {
                address,
                dial_timeout,
            } => {
                let conn = match dial(address.as_str(), *dial_timeout).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to connect to target {} for {}: {}", address, id, e);
                        return;
                    }
                };
                log_outcome(id, &relay(stream, conn).await);
            }
            StreamHandler::Socks(responder) => match responder.serve(stream).await {
                Ok(outcome) => log_outcome(id, &outcome),
                Err(e) => warn!("SOCKS5 on {} failed: {}", id, e),
            },
        }
    }
}

fn log_outcome(id: StreamId, outcome: &RelayOutcome) {
    match &outcome.error {
        Some(e) => debug!("Relay on {} ended ({}): {}", id, outcome.first_closed, e),
        None => debug!(
            "Relay on {} ended ({} closed after {} bytes)",
            id, outcome.first_closed, outcome.bytes
        ),
    }
}

/// Accept streams until the session ends, one task per stream.
///
/// Returns the error that ended the session.
pub async fn serve_streams(session: &Session, handler: Arc<StreamHandler>) -> MuxError {
    loop {
        let stream = match session.accept_stream().await {
            Ok(stream) => stream,
            Err(e) => return e,
        };
        info!(active_streams = session.num_streams(), "Accepted {}", stream.id());

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            handler.handle(stream).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tt_protocol::MuxConfig;

    fn session_pair() -> (Session, Session) {
        let (a, b) = duplex(64 * 1024);
        let config = MuxConfig {
            keepalive_interval: None,
            ..MuxConfig::default()
        };
        (Session::client(a, config.clone()), Session::server(b, config))
    }

    #[test]
    fn test_handler_from_config() {
        let mut config = AgentConfig::default();
        assert!(matches!(
            StreamHandler::from_config(&config),
            StreamHandler::Socks(_)
        ));

        config.target_address = Some("10.0.0.5:22".to_string());
        assert!(matches!(
            StreamHandler::from_config(&config),
            StreamHandler::Target { ref address, .. } if address == "10.0.0.5:22"
        ));
    }

    #[tokio::test]
    async fn test_fixed_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).await.unwrap();
            conn.write_all(&buf).await.unwrap();
        });

        let (agent, relay_side) = session_pair();
        let handler = Arc::new(StreamHandler::Target {
            address: target.to_string(),
            dial_timeout: Duration::from_secs(5),
        });
        tokio::spawn(async move { serve_streams(&agent, handler).await });

        let mut stream = relay_side.open_stream().unwrap();
        stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        // Target hung up after echoing
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_failed_target_only_ends_that_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let (agent, relay_side) = session_pair();
        let handler = Arc::new(StreamHandler::Target {
            address: closed.to_string(),
            dial_timeout: Duration::from_secs(5),
        });
        let agent_handle = agent.clone();
        tokio::spawn(async move { serve_streams(&agent, handler).await });

        let mut stream = relay_side.open_stream().unwrap();
        let mut buf = [0u8; 1];
        assert!(stream.read(&mut buf).await.is_err());

        assert!(!agent_handle.is_closed());
        assert!(!relay_side.is_closed());
        assert!(relay_side.open_stream().is_ok());
    }

    #[tokio::test]
    async fn test_serve_returns_when_session_closes() {
        let (agent, relay_side) = session_pair();
        let handler = Arc::new(StreamHandler::Socks(SocksResponder::new(
            Duration::from_secs(1),
        )));
        let serving = tokio::spawn(async move { serve_streams(&agent, handler).await });

        relay_side.close();
        let err = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, MuxError::SessionClosed));
    }
}
