//! Relay server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::SessionConfig;

/// Configuration for the relay server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Plain TCP address local tooling connects to
    pub local_address: String,

    /// TLS address agents dial
    pub relay_address: String,

    /// PEM certificate chain presented to agents
    pub cert_file: PathBuf,

    /// PEM private key matching `cert_file`
    pub key_file: PathBuf,

    /// Sessions that may wait in the pool behind the active one
    pub pool_capacity: usize,

    /// Session tuning
    pub session: SessionConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            local_address: "127.0.0.1:1080".to_string(),
            relay_address: "0.0.0.0:5555".to_string(),
            cert_file: PathBuf::from("certs/cert.pem"),
            key_file: PathBuf::from("certs/key.pem"),
            pool_capacity: 100,
            session: SessionConfig::default(),
        }
    }
}
