//! Hash functions.
//!
//! SHA-256 remains the digest mandated by deployed SAML profiles; SHA-384
//! and SHA-512 are available for peers that advertise them.

use aws_lc_rs::{digest, hmac};

/// Digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the XML-DSig digest method URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest method URI.
    #[must_use]
    pub fn from_xml_dsig_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#sha256" => Some(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Some(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Computes a hash of the input data.
#[must_use]
pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let alg = match algorithm {
        HashAlgorithm::Sha256 => &digest::SHA256,
        HashAlgorithm::Sha384 => &digest::SHA384,
        HashAlgorithm::Sha512 => &digest::SHA512,
    };

    digest::digest(alg, data).as_ref().to_vec()
}

/// Computes a SHA-256 hash of the input data.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    hash(HashAlgorithm::Sha256, data)
}

/// Computes an HMAC-SHA256 tag.
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_have_expected_lengths() {
        assert_eq!(sha256(b"test").len(), 32);
        assert_eq!(hash(HashAlgorithm::Sha384, b"test").len(), 48);
        assert_eq!(hash(HashAlgorithm::Sha512, b"test").len(), 64);
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"hello world"), sha256(b"hello world"));
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }

    #[test]
    fn hmac_depends_on_key() {
        let a = hmac_sha256(b"key-one", b"subject");
        let b = hmac_sha256(b"key-two", b"subject");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_eq!(a, hmac_sha256(b"key-one", b"subject"));
    }

    #[test]
    fn digest_uri_roundtrip() {
        for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha384, HashAlgorithm::Sha512] {
            assert_eq!(HashAlgorithm::from_xml_dsig_uri(alg.xml_dsig_uri()), Some(alg));
        }
    }
}
