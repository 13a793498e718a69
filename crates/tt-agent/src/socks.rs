//! Embedded SOCKS5 responder
//!
//! Serves one SOCKS5 exchange (RFC 1928) per tunneled stream: no
//! authentication, `CONNECT` only, IPv4, IPv6 and domain-name targets. Once
//! the target is dialed the stream is relayed to it.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use tt_core::relay::{relay, RelayOutcome};

use crate::dispatch::dial;

const SOCKS_VERSION: u8 = 0x05;

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Reply codes sent in response to a request
pub mod reply {
    pub const SUCCEEDED: u8 = 0x00;
    pub const GENERAL_FAILURE: u8 = 0x01;
    pub const NETWORK_UNREACHABLE: u8 = 0x03;
    pub const HOST_UNREACHABLE: u8 = 0x04;
    pub const CONNECTION_REFUSED: u8 = 0x05;
    pub const COMMAND_NOT_SUPPORTED: u8 = 0x07;
    pub const ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;
}

/// Destination named in a SOCKS5 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// Literal IPv4 or IPv6 address
    Ip(SocketAddr),
    /// Host name resolved by the agent
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// SOCKS5 exchange failures
#[derive(Debug, Error)]
pub enum SocksError {
    /// Client did not speak SOCKS5
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Client offered no method we accept
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Anything other than CONNECT
    #[error("Unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),

    /// Unknown address type
    #[error("Unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    /// Domain name is not valid UTF-8
    #[error("Invalid domain name")]
    InvalidDomain,

    /// The target could not be dialed
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: TargetAddr,
        #[source]
        source: io::Error,
    },

    /// I/O error on the client stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reply code reported to the client when dialing fails with `err`
pub fn reply_code_for(err: &io::Error) -> u8 {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => reply::CONNECTION_REFUSED,
        io::ErrorKind::NetworkUnreachable => reply::NETWORK_UNREACHABLE,
        io::ErrorKind::HostUnreachable | io::ErrorKind::TimedOut => reply::HOST_UNREACHABLE,
        _ => reply::GENERAL_FAILURE,
    }
}

/// SOCKS5 server for tunneled streams
#[derive(Debug, Clone)]
pub struct SocksResponder {
    dial_timeout: Duration,
}

impl SocksResponder {
    /// Create a responder that gives up on targets after `dial_timeout`
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }

    /// Run one SOCKS5 exchange on `stream`, then relay it to the target.
    ///
    /// Returns once the relay finishes. Errors before the relay starts are
    /// reported to the client with the matching reply code where the
    /// protocol allows one.
    pub async fn serve<S>(&self, mut stream: S) -> Result<RelayOutcome, SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        negotiate(&mut stream).await?;
        let target = read_request(&mut stream).await?;
        debug!("SOCKS5 CONNECT {}", target);

        let dialed = match &target {
            TargetAddr::Ip(addr) => dial(*addr, self.dial_timeout).await,
            TargetAddr::Domain(host, port) => dial((host.as_str(), *port), self.dial_timeout).await,
        };
        let conn = match dialed {
            Ok(conn) => conn,
            Err(source) => {
                let _ = send_reply(&mut stream, reply_code_for(&source), None).await;
                return Err(SocksError::Connect { target, source });
            }
        };

        send_reply(&mut stream, reply::SUCCEEDED, conn.local_addr().ok()).await?;
        Ok(relay(stream, conn).await)
    }
}

/// Method negotiation: accept only "no authentication"
async fn negotiate<S>(stream: &mut S) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(SocksError::UnsupportedVersion(header[0]));
    }

    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;

    if methods.contains(&METHOD_NO_AUTH) {
        stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
        Ok(())
    } else {
        stream
            .write_all(&[SOCKS_VERSION, METHOD_NONE_ACCEPTABLE])
            .await?;
        Err(SocksError::NoAcceptableMethod)
    }
}

/// Read a request and return its target, rejecting anything but CONNECT
async fn read_request<S>(stream: &mut S) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [version, command, _reserved, atyp] = header;

    if version != SOCKS_VERSION {
        return Err(SocksError::UnsupportedVersion(version));
    }
    if command != CMD_CONNECT {
        send_reply(stream, reply::COMMAND_NOT_SUPPORTED, None).await?;
        return Err(SocksError::UnsupportedCommand(command));
    }

    let target = match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            let port = stream.read_u16().await?;
            TargetAddr::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            let port = stream.read_u16().await?;
            TargetAddr::Ip(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            stream.read_exact(&mut name).await?;
            let port = stream.read_u16().await?;
            match String::from_utf8(name) {
                Ok(host) if !host.is_empty() => TargetAddr::Domain(host, port),
                _ => {
                    send_reply(stream, reply::GENERAL_FAILURE, None).await?;
                    return Err(SocksError::InvalidDomain);
                }
            }
        }
        other => {
            send_reply(stream, reply::ADDRESS_TYPE_NOT_SUPPORTED, None).await?;
            return Err(SocksError::UnsupportedAddressType(other));
        }
    };

    Ok(target)
}

/// Send a reply carrying `bound` (or `0.0.0.0:0`)
async fn send_reply<S>(stream: &mut S, code: u8, bound: Option<SocketAddr>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let bound = bound.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let mut buf = Vec::with_capacity(22);
    buf.extend_from_slice(&[SOCKS_VERSION, code, 0x00]);
    match bound.ip() {
        IpAddr::V4(ip) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.extend_from_slice(&bound.port().to_be_bytes());

    stream.write_all(&buf).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut conn, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut r, mut w) = conn.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        addr
    }

    fn connect_request(addr: SocketAddr) -> Vec<u8> {
        let mut req = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
        match addr.ip() {
            IpAddr::V4(ip) => {
                req.push(ATYP_IPV4);
                req.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                req.push(ATYP_IPV6);
                req.extend_from_slice(&ip.octets());
            }
        }
        req.extend_from_slice(&addr.port().to_be_bytes());
        req
    }

    #[tokio::test]
    async fn test_connect_and_relay() {
        let target = echo_server().await;
        let (mut client, server) = duplex(4096);
        let responder = SocksResponder::new(Duration::from_secs(5));
        let task = tokio::spawn(async move { responder.serve(server).await });

        client.write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH]).await.unwrap();
        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [SOCKS_VERSION, METHOD_NO_AUTH]);

        client.write_all(&connect_request(target)).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], reply::SUCCEEDED);
        assert_eq!(reply[3], ATYP_IPV4);

        client.write_all(b"through the tunnel").await.unwrap();
        let mut echoed = [0u8; 18];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"through the tunnel");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_no_acceptable_method() {
        let (mut client, mut server) = duplex(1024);
        let negotiation = tokio::spawn(async move { negotiate(&mut server).await });

        client.write_all(&[SOCKS_VERSION, 1, 0x02]).await.unwrap();
        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [SOCKS_VERSION, METHOD_NONE_ACCEPTABLE]);
        assert!(matches!(
            negotiation.await.unwrap(),
            Err(SocksError::NoAcceptableMethod)
        ));
    }

    #[tokio::test]
    async fn test_wrong_version() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x04, 1, 0x00]).await.unwrap();
        assert!(matches!(
            negotiate(&mut server).await,
            Err(SocksError::UnsupportedVersion(0x04))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_command() {
        let (mut client, mut server) = duplex(1024);
        // BIND 127.0.0.1:80
        client
            .write_all(&[SOCKS_VERSION, 0x02, 0x00, ATYP_IPV4, 127, 0, 0, 1, 0, 80])
            .await
            .unwrap();

        assert!(matches!(
            read_request(&mut server).await,
            Err(SocksError::UnsupportedCommand(0x02))
        ));
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], reply::COMMAND_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_unsupported_address_type() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&[SOCKS_VERSION, CMD_CONNECT, 0x00, 0x09])
            .await
            .unwrap();

        assert!(matches!(
            read_request(&mut server).await,
            Err(SocksError::UnsupportedAddressType(0x09))
        ));
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], reply::ADDRESS_TYPE_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_domain_request() {
        let (mut client, mut server) = duplex(1024);
        let mut req = vec![SOCKS_VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, 11];
        req.extend_from_slice(b"example.com");
        req.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let target = read_request(&mut server).await.unwrap();
        assert_eq!(target, TargetAddr::Domain("example.com".to_string(), 443));
        assert_eq!(target.to_string(), "example.com:443");
    }

    #[tokio::test]
    async fn test_refused_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let (mut client, server) = duplex(1024);
        let responder = SocksResponder::new(Duration::from_secs(5));
        let task = tokio::spawn(async move { responder.serve(server).await });

        client.write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH]).await.unwrap();
        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        client.write_all(&connect_request(closed)).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], reply::CONNECTION_REFUSED);
        assert!(matches!(
            task.await.unwrap(),
            Err(SocksError::Connect { .. })
        ));
    }

    #[test]
    fn test_reply_codes() {
        let code = |kind: io::ErrorKind| reply_code_for(&io::Error::from(kind));
        assert_eq!(code(io::ErrorKind::ConnectionRefused), reply::CONNECTION_REFUSED);
        assert_eq!(code(io::ErrorKind::NetworkUnreachable), reply::NETWORK_UNREACHABLE);
        assert_eq!(code(io::ErrorKind::HostUnreachable), reply::HOST_UNREACHABLE);
        assert_eq!(code(io::ErrorKind::TimedOut), reply::HOST_UNREACHABLE);
        assert_eq!(code(io::ErrorKind::Other), reply::GENERAL_FAILURE);
    }
}
