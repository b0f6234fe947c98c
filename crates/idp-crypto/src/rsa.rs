//! RSA signatures for XML-DSig and the redirect binding.
//!
//! SAML 2.0 deployments interoperate on RSA PKCS#1 v1.5 with SHA-256, so
//! that algorithm is the default. SHA-384 and SHA-512 variants are accepted
//! from peers that use them.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::rsa::KeySize;
use aws_lc_rs::signature::{
    self, KeyPair, RsaEncoding, RsaKeyPair, UnparsedPublicKey, VerificationAlgorithm,
};

use crate::error::CryptoError;

/// PKCS#1 v1.5 signature variants, named by their digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RsaAlgorithm {
    /// `rsa-sha256`.
    #[default]
    Rs256,
    /// `rsa-sha384`.
    Rs384,
    /// `rsa-sha512`.
    Rs512,
}

impl RsaAlgorithm {
    const ALL: [Self; 3] = [Self::Rs256, Self::Rs384, Self::Rs512];

    /// `SignatureMethod` URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Rs256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::Rs384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::Rs512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Looks a variant up by `SignatureMethod` URI.
    #[must_use]
    pub fn from_xml_dsig_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.xml_dsig_uri() == uri)
    }

    fn encoding(self) -> &'static dyn RsaEncoding {
        match self {
            Self::Rs256 => &signature::RSA_PKCS1_SHA256,
            Self::Rs384 => &signature::RSA_PKCS1_SHA384,
            Self::Rs512 => &signature::RSA_PKCS1_SHA512,
        }
    }

    fn verification(self) -> &'static dyn VerificationAlgorithm {
        match self {
            Self::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

/// The IdP's signing key, or an SP's in tests.
///
/// ## NIST 800-53 Rev5: SC-12 (Cryptographic Key Management)
///
/// Private material stays inside; only the public half can be exported.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RsaSigningKey({} bits)", self.key_pair.public_modulus_len() * 8)
    }
}

impl RsaSigningKey {
    /// Reads a PKCS#1 or PKCS#8 DER private key.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidKey`] if neither encoding parses.
    pub fn from_der(key_der: &[u8]) -> Result<Self, CryptoError> {
        RsaKeyPair::from_der(key_der)
            .or_else(|_| RsaKeyPair::from_pkcs8(key_der))
            .map(|key_pair| Self { key_pair })
            .map_err(|e| CryptoError::InvalidKey(format!("not an RSA private key: {e}")))
    }

    /// A fresh 2048-bit key.
    ///
    /// # Errors
    ///
    /// [`CryptoError::KeyGeneration`] if the library refuses.
    pub fn generate() -> Result<Self, CryptoError> {
        RsaKeyPair::generate(KeySize::Rsa2048)
            .map(|key_pair| Self { key_pair })
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))
    }

    /// Signs `data`, returning a signature as long as the modulus.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Signing`] if the key refuses.
    pub fn sign(&self, algorithm: RsaAlgorithm, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(algorithm.encoding(), &SystemRandom::new(), data, &mut out)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(out)
    }

    /// PKCS#1 `RSAPublicKey` DER of the public half.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }
}

/// Checks `sig` over `data` against a PKCS#1 `RSAPublicKey` DER.
///
/// # Errors
///
/// [`CryptoError::Verification`] on any mismatch, including an unparsable
/// key.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaAlgorithm,
) -> Result<(), CryptoError> {
    UnparsedPublicKey::new(algorithm.verification(), public_key_der)
        .verify(data, sig)
        .map_err(|_| CryptoError::Verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static KEY: LazyLock<RsaSigningKey> =
        LazyLock::new(|| RsaSigningKey::generate().expect("key generation"));

    #[test]
    fn sign_and_verify() {
        let sig = KEY.sign(RsaAlgorithm::Rs256, b"signed info").unwrap();
        assert_eq!(sig.len(), 256);
        assert!(rsa_verify(&KEY.public_key_der(), b"signed info", &sig, RsaAlgorithm::Rs256).is_ok());
    }

    #[test]
    fn tampered_data_fails_verification() {
        let sig = KEY.sign(RsaAlgorithm::Rs256, b"original").unwrap();
        let result = rsa_verify(&KEY.public_key_der(), b"tampered", &sig, RsaAlgorithm::Rs256);
        assert!(matches!(result, Err(CryptoError::Verification)));
    }

    #[test]
    fn algorithm_mismatch_fails_verification() {
        let sig = KEY.sign(RsaAlgorithm::Rs512, b"data").unwrap();
        assert!(rsa_verify(&KEY.public_key_der(), b"data", &sig, RsaAlgorithm::Rs256).is_err());
        assert!(rsa_verify(&KEY.public_key_der(), b"data", &sig, RsaAlgorithm::Rs512).is_ok());
    }

    #[test]
    fn algorithm_uris() {
        assert!(RsaAlgorithm::Rs256.xml_dsig_uri().contains("sha256"));
        assert_eq!(
            RsaAlgorithm::from_xml_dsig_uri(RsaAlgorithm::Rs384.xml_dsig_uri()),
            Some(RsaAlgorithm::Rs384)
        );
        assert_eq!(
            RsaAlgorithm::from_xml_dsig_uri("http://www.w3.org/2000/09/xmldsig#rsa-sha1"),
            None
        );
    }

    #[test]
    fn invalid_key_is_rejected() {
        assert!(matches!(
            RsaSigningKey::from_der(b"not a key"),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
