//! Core error types for tether

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tt_protocol::{MuxError, ProtocolError};

/// Top-level error type for the tether workspace
#[derive(Error, Debug)]
pub enum TetherError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session error
    #[error("Session error: {0}")]
    Mux(#[from] MuxError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures establishing or accepting a secure connection
#[derive(Error, Debug)]
pub enum TransportError {
    /// TCP dial failed
    #[error("Failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake failed
    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not listen on an address
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting on a listening socket failed
    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Dial did not complete in time
    #[error("Connection to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    /// The relay address has no usable host part
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    /// TLS configuration rejected
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate or key material could not be loaded
    #[error("Failed to load identity: {0}")]
    Identity(String),
}

/// Certificate pinning failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// The configured fingerprint is not 32 bytes of hex
    #[error("invalid TLS pinned certificate")]
    InvalidPinnedCertificate,

    /// No certificate presented by the server matches the pin
    #[error("invalid TLS server certificate")]
    InvalidServerCertificate,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// No fingerprint configured and verification not skipped
    #[error("TLS fingerprint is missing")]
    MissingFingerprint,
}
