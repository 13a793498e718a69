//! Relay-side TLS configuration

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tracing::debug;

use crate::error::TransportError;

/// Load a PEM certificate chain
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::Identity(format!("Failed to open cert file {}: {}", path.display(), e))
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            TransportError::Identity(format!("Failed to parse {}: {}", path.display(), e))
        })?;

    if certs.is_empty() {
        return Err(TransportError::Identity(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    debug!("Loaded {} certificate(s) from {}", certs.len(), path.display());
    Ok(certs)
}

/// Load the first PEM private key (PKCS#8, PKCS#1 or SEC1) in a file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::Identity(format!("Failed to open key file {}: {}", path.display(), e))
    })?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| {
            TransportError::Identity(format!("Failed to parse {}: {}", path.display(), e))
        })?
        .ok_or_else(|| {
            TransportError::Identity(format!("No private key found in {}", path.display()))
        })
}

/// Server config presenting `certs` without requesting client certificates
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, TransportError> {
    let config = ServerConfig::builder_with_provider(super::provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}
