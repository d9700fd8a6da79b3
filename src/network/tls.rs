//! Certificate verification policy.
//!
//! Transports enforce this; the pinning check itself lives here so every
//! transport computes fingerprints the same way.

use sha2::{Digest, Sha256};

/// How a transport must verify the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Verify the chain against platform roots plus `ca_certificate`.
    pub verify: bool,
    /// Extra PEM CA to trust.
    pub ca_certificate: Option<String>,
    /// Hex SHA-256 the presented CA (or leaf) certificate must match.
    pub pinned_fingerprint: Option<String>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::verify_with(None)
    }
}

impl TlsPolicy {
    pub fn verify_with(ca_certificate: Option<String>) -> Self {
        Self {
            verify: true,
            ca_certificate,
            pinned_fingerprint: None,
        }
    }

    pub fn trust_all() -> Self {
        Self {
            verify: false,
            ca_certificate: None,
            pinned_fingerprint: None,
        }
    }

    pub fn pinned(fingerprint: &str, ca_certificate: Option<String>) -> Self {
        Self {
            verify: true,
            ca_certificate,
            pinned_fingerprint: Some(normalize_fingerprint(fingerprint)),
        }
    }

    /// Whether a presented DER certificate satisfies the pin. Always true
    /// without a pin; chain verification is the transport's job.
    pub fn accepts(&self, cert_der: &[u8]) -> bool {
        match &self.pinned_fingerprint {
            Some(pin) => fingerprint(cert_der) == *pin,
            None => true,
        }
    }
}

/// Lowercase hex SHA-256 of a DER certificate.
pub fn fingerprint(cert_der: &[u8]) -> String {
    hex::encode(Sha256::digest(cert_der))
}

/// Strip separators and lowercase, so `AB:CD` and `abcd` compare equal.
pub fn normalize_fingerprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_accepts_matching_cert() {
        let cert = b"not really DER but bytes all the same";
        let fp = fingerprint(cert);
        assert_eq!(fp.len(), 64);

        let upper_colon: String = fp
            .to_uppercase()
            .as_bytes()
            .chunks(2)
            .map(|c| String::from_utf8_lossy(c).to_string())
            .collect::<Vec<_>>()
            .join(":");
        let policy = TlsPolicy::pinned(&upper_colon, None);
        assert!(policy.accepts(cert));
        assert!(!policy.accepts(b"another certificate"));
    }

    #[test]
    fn test_unpinned_accepts_anything() {
        assert!(TlsPolicy::trust_all().accepts(b"x"));
        assert!(TlsPolicy::default().accepts(b"x"));
        assert!(TlsPolicy::default().verify);
        assert!(!TlsPolicy::trust_all().verify);
    }
}
