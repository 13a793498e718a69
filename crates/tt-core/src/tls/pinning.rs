//! Certificate fingerprint pinning

use std::fmt;
use std::str::FromStr;

use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};

use crate::error::CertificateError;

/// SHA-256 digest of a certificate's DER encoding.
///
/// Parsed from hex with optional `:` separators, case-insensitive.
/// Displayed as uppercase colon-separated hex (`AB:CD:...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinnedFingerprint([u8; 32]);

impl PinnedFingerprint {
    /// Fingerprint of a DER-encoded certificate
    pub fn of_certificate(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    /// Whether `der` hashes to this fingerprint
    pub fn matches(&self, der: &[u8]) -> bool {
        Self::of_certificate(der) == *self
    }
}

impl FromStr for PinnedFingerprint {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped: String = s.chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(stripped).map_err(|_| CertificateError::InvalidPinnedCertificate)?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CertificateError::InvalidPinnedCertificate)?;
        Ok(Self(digest))
    }
}

impl fmt::Display for PinnedFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Check the certificates presented by the server against a pinned fingerprint.
///
/// The fingerprint is validated before any comparison. Succeeds if any of
/// `peer_certs` matches; an empty set never does.
pub fn verify_pinned(
    peer_certs: &[CertificateDer<'_>],
    fingerprint: &str,
) -> Result<(), CertificateError> {
    let pinned: PinnedFingerprint = fingerprint.parse()?;

    if peer_certs.iter().any(|cert| pinned.matches(cert.as_ref())) {
        Ok(())
    } else {
        Err(CertificateError::InvalidServerCertificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(bytes: &[u8]) -> CertificateDer<'static> {
        CertificateDer::from(bytes.to_vec())
    }

    fn colon_hex(der: &[u8]) -> String {
        PinnedFingerprint::of_certificate(der).to_string()
    }

    #[test]
    fn test_matching_certificate() {
        let der = b"relay certificate".to_vec();
        assert!(verify_pinned(&[cert(&der)], &colon_hex(&der)).is_ok());
    }

    #[test]
    fn test_case_and_separators_ignored() {
        let der = b"relay certificate".to_vec();
        let plain = hex::encode(Sha256::digest(&der));
        assert!(verify_pinned(&[cert(&der)], &plain).is_ok());
        assert!(verify_pinned(&[cert(&der)], &plain.to_uppercase()).is_ok());
        assert!(verify_pinned(&[cert(&der)], &colon_hex(&der).to_lowercase()).is_ok());
    }

    #[test]
    fn test_any_certificate_in_chain_matches() {
        let leaf = b"leaf".to_vec();
        let issuer = b"issuer".to_vec();
        let chain = [cert(&leaf), cert(&issuer)];
        assert!(verify_pinned(&chain, &colon_hex(&issuer)).is_ok());
    }

    #[test]
    fn test_mismatch() {
        let der = b"relay certificate".to_vec();
        let other = colon_hex(b"someone else");
        assert_eq!(
            verify_pinned(&[cert(&der)], &other),
            Err(CertificateError::InvalidServerCertificate)
        );
    }

    #[test]
    fn test_empty_peer_set() {
        let pin = colon_hex(b"anything");
        assert_eq!(
            verify_pinned(&[], &pin),
            Err(CertificateError::InvalidServerCertificate)
        );
    }

    #[test]
    fn test_invalid_fingerprint() {
        let der = b"relay certificate".to_vec();
        let too_long = "00".repeat(33);
        for bad in ["not hex at all", "AB:CD", "", too_long.as_str()] {
            assert_eq!(
                verify_pinned(&[cert(&der)], bad),
                Err(CertificateError::InvalidPinnedCertificate),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_invalid_fingerprint_checked_before_comparison() {
        assert_eq!(
            verify_pinned(&[], "zz"),
            Err(CertificateError::InvalidPinnedCertificate)
        );
    }

    #[test]
    fn test_display_format() {
        let fp = PinnedFingerprint([0xAB; 32]);
        let text = fp.to_string();
        assert_eq!(text.len(), 32 * 3 - 1);
        assert!(text.starts_with("AB:AB:"));
        assert_eq!(text.parse::<PinnedFingerprint>().unwrap(), fp);
    }
}
