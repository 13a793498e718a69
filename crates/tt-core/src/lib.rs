//! tt-core: Configuration, TLS pinning and relaying for tether
//!
//! This crate provides the configuration structures, error taxonomy,
//! certificate-pinning TLS setup and the byte relay shared by the agent and
//! the relay server.

pub mod config;
pub mod error;
pub mod relay;
pub mod tls;

pub use error::{CertificateError, ConfigError, TetherError, TransportError};
pub use relay::{relay, Direction, RelayOutcome};
