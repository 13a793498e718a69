//! TLS for the agent/relay channel
//!
//! The agent does not validate the relay's certificate chain. Instead it
//! pins the SHA-256 fingerprint of the certificate the relay presents:
//!
//! - [`PinnedFingerprint`] / [`verify_pinned`]: fingerprint parsing and the
//!   post-handshake check
//! - [`insecure_client_config`]: client config whose verifier accepts any
//!   certificate but still checks handshake signatures
//! - [`server_config`], [`load_certs`], [`load_private_key`]: relay side

mod client;
mod pinning;
mod server;

pub use client::{insecure_client_config, AcceptAnyServerCert};
pub use pinning::{verify_pinned, PinnedFingerprint};
pub use server::{load_certs, load_private_key, server_config};

use std::sync::Arc;

use rustls::crypto::CryptoProvider;

/// The crypto provider used for every TLS config in the workspace
pub(crate) fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
