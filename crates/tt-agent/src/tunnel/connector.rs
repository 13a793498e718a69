//! Outbound TLS tunnel connector
//!
//! Dials the relay server, performs the TLS handshake, checks the pinned
//! certificate fingerprint and starts the multiplexed session.

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use tt_core::config::AgentConfig;
use tt_core::error::{CertificateError, ConfigError, TransportError};
use tt_core::tls::{self, PinnedFingerprint};
use tt_protocol::{MuxConfig, MuxError, Session};

/// Why a connection attempt or an established tunnel failed
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Dial, handshake or TLS setup failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The relay's certificate did not match the pin
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The multiplexed session failed or ended
    #[error("Session error: {0}")]
    Session(#[from] MuxError),

    /// The agent is misconfigured
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Establishes the outbound tunnel to the relay server
pub struct TunnelConnector {
    /// Agent configuration
    config: AgentConfig,
    /// Validated fingerprint, `None` when verification is skipped
    pin: Option<String>,
    tls: TlsConnector,
}

impl TunnelConnector {
    /// Create a new tunnel connector.
    ///
    /// Fails if no fingerprint is configured (unless `skip_verify` is set)
    /// or if the configured fingerprint is malformed.
    pub fn new(config: AgentConfig) -> Result<Self, ConnectionError> {
        let pin = if config.skip_verify {
            None
        } else {
            let fingerprint = config
                .fingerprint
                .as_deref()
                .ok_or(ConfigError::MissingFingerprint)?;
            fingerprint.parse::<PinnedFingerprint>()?;
            Some(fingerprint.to_string())
        };

        Ok(Self {
            tls: TlsConnector::from(tls::insecure_client_config()?),
            config,
            pin,
        })
    }

    /// Attempt a single connection to the relay
    pub async fn connect(&self) -> Result<ActiveTunnel, ConnectionError> {
        let addr = &self.config.relay_address;
        let timeout = self.config.connect_timeout;
        let server_name = server_name(addr)?;

        tracing::debug!("Connecting to {}", addr);
        let handshake = async {
            let tcp = TcpStream::connect(addr.as_str())
                .await
                .map_err(|source| TransportError::Dial {
                    addr: addr.clone(),
                    source,
                })?;
            let _ = tcp.set_nodelay(true);

            self.tls
                .connect(server_name, tcp)
                .await
                .map_err(|source| TransportError::Handshake {
                    addr: addr.clone(),
                    source,
                })
        };
        let stream = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout {
                addr: addr.clone(),
                after: timeout,
            })??;

        if let Some(pin) = &self.pin {
            let peer_certs = stream.get_ref().1.peer_certificates().unwrap_or_default();
            tls::verify_pinned(peer_certs, pin)?;
            tracing::debug!("Relay certificate matches pinned fingerprint");
        }

        let session = Session::client(stream, MuxConfig::from(&self.config.session));
        Ok(ActiveTunnel {
            session,
            relay_address: addr.clone(),
        })
    }
}

/// TLS server name for a `host:port` relay address
fn server_name(addr: &str) -> Result<ServerName<'static>, TransportError> {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        _ => addr,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::InvalidServerName(addr.to_string()))
}

/// An established tunnel to the relay
#[derive(Debug, Clone)]
pub struct ActiveTunnel {
    session: Session,
    relay_address: String,
}

impl ActiveTunnel {
    /// The multiplexed session running over the tunnel
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Address this tunnel was dialed to
    pub fn relay_address(&self) -> &str {
        &self.relay_address
    }

    /// Close the tunnel
    pub fn close(&self) {
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fingerprint: Option<&str>, skip_verify: bool) -> AgentConfig {
        AgentConfig {
            fingerprint: fingerprint.map(str::to_string),
            skip_verify,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_missing_fingerprint_rejected() {
        assert!(matches!(
            TunnelConnector::new(config(None, false)),
            Err(ConnectionError::Config(ConfigError::MissingFingerprint))
        ));
    }

    #[test]
    fn test_malformed_fingerprint_rejected() {
        assert!(matches!(
            TunnelConnector::new(config(Some("AB:CD"), false)),
            Err(ConnectionError::Certificate(
                CertificateError::InvalidPinnedCertificate
            ))
        ));
    }

    #[test]
    fn test_skip_verify_needs_no_fingerprint() {
        let connector = TunnelConnector::new(config(None, true)).unwrap();
        assert!(connector.pin.is_none());
    }

    #[test]
    fn test_server_name() {
        assert!(matches!(
            server_name("relay.example.com:5555").unwrap(),
            ServerName::DnsName(_)
        ));
        assert!(matches!(
            server_name("127.0.0.1:5555").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(matches!(
            server_name("[::1]:5555").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(server_name("bad name:5555").is_err());
    }
}
