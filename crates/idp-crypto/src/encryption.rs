//! XML encryption primitives.
//!
//! Assertions are encrypted with a fresh AES-GCM content key. The content key
//! is transported to the SP under its RSA public key using OAEP.
//!
//! The cipher value layout for AES-GCM follows XML Encryption 1.1:
//! `IV (12 bytes) || ciphertext || tag (16 bytes)`.

use aws_lc_rs::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM, NONCE_LEN},
    encoding::AsDer,
    rsa::{
        KeySize, OaepAlgorithm, OaepPrivateDecryptingKey, OaepPublicEncryptingKey,
        PrivateDecryptingKey, PublicEncryptingKey, OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256,
    },
};

use crate::error::CryptoError;
use crate::random::random_bytes;

/// Block encryption algorithms for encrypted assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataEncryptionAlgorithm {
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    Aes256Gcm,
}

impl DataEncryptionAlgorithm {
    /// Returns the XML-Enc algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }

    /// Parses an XML-Enc algorithm URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2009/xmlenc11#aes128-gcm" => Some(Self::Aes128Gcm),
            "http://www.w3.org/2009/xmlenc11#aes256-gcm" => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    /// Returns the content key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm => 32,
        }
    }

    /// Generates a fresh content key.
    #[must_use]
    pub fn generate_key(self) -> Vec<u8> {
        random_bytes(self.key_len())
    }

    fn less_safe_key(self, key: &[u8]) -> Result<LessSafeKey, CryptoError> {
        let alg = match self {
            Self::Aes128Gcm => &AES_128_GCM,
            Self::Aes256Gcm => &AES_256_GCM,
        };
        let unbound = UnboundKey::new(alg, key)
            .map_err(|_| CryptoError::InvalidKey(format!("bad content key for {}", self.uri())))?;
        Ok(LessSafeKey::new(unbound))
    }
}

/// Key transport algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTransportAlgorithm {
    /// RSA-OAEP with SHA-1 digest and MGF1-SHA1.
    RsaOaepMgf1p,
    /// RSA-OAEP (XML-Enc 1.1) with SHA-256 digest and MGF1-SHA256.
    RsaOaep,
}

impl KeyTransportAlgorithm {
    /// Returns the XML-Enc algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
            Self::RsaOaep => "http://www.w3.org/2009/xmlenc11#rsa-oaep",
        }
    }

    /// Parses an XML-Enc algorithm URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p" => Some(Self::RsaOaepMgf1p),
            "http://www.w3.org/2009/xmlenc11#rsa-oaep" => Some(Self::RsaOaep),
            _ => None,
        }
    }

    const fn oaep(self) -> &'static OaepAlgorithm {
        match self {
            Self::RsaOaepMgf1p => &OAEP_SHA1_MGF1SHA1,
            Self::RsaOaep => &OAEP_SHA256_MGF1SHA256,
        }
    }
}

/// Encrypts `plaintext` under `key`.
///
/// Returns `IV || ciphertext || tag`.
///
/// # Errors
///
/// Returns an error if the key length does not match the algorithm.
pub fn encrypt_data(
    algorithm: DataEncryptionAlgorithm,
    key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = algorithm.less_safe_key(key)?;

    let iv = random_bytes(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(&iv)
        .map_err(|_| CryptoError::Encryption("invalid nonce".into()))?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Encryption("AES-GCM seal failed".into()))?;

    let mut out = iv;
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypts `IV || ciphertext || tag` produced by [`encrypt_data`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the data is truncated or fails
/// authentication.
pub fn decrypt_data(
    algorithm: DataEncryptionAlgorithm,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::Decryption);
    }
    let key = algorithm.less_safe_key(key)?;
    let (iv, ciphertext) = data.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(iv).map_err(|_| CryptoError::Decryption)?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Decryption)?;
    Ok(plaintext.to_vec())
}

/// Encrypts a content key under an RSA public key.
///
/// `public_key_der` is an X.509 `SubjectPublicKeyInfo` DER.
///
/// # Errors
///
/// Returns an error if the public key is not a usable RSA key.
pub fn wrap_key(
    algorithm: KeyTransportAlgorithm,
    public_key_der: &[u8],
    content_key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let public_key = PublicEncryptingKey::from_der(public_key_der)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA encryption key: {e}")))?;
    let public_key = OaepPublicEncryptingKey::new(public_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let mut out = vec![0u8; public_key.ciphertext_size()];
    let wrapped = public_key
        .encrypt(algorithm.oaep(), content_key, &mut out, None)
        .map_err(|_| CryptoError::Encryption("RSA-OAEP key transport failed".into()))?;
    Ok(wrapped.to_vec())
}

/// An RSA private key able to unwrap transported content keys.
///
/// The IdP itself never decrypts assertions; this type exists for SP-side
/// tooling and verification.
pub struct RsaDecryptionKey {
    key: OaepPrivateDecryptingKey,
    public_key_der: Vec<u8>,
}

impl std::fmt::Debug for RsaDecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaDecryptionKey").finish_non_exhaustive()
    }
}

impl RsaDecryptionKey {
    fn from_private(key: PrivateDecryptingKey) -> Result<Self, CryptoError> {
        let public_key_der = key
            .public_key()
            .as_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .as_ref()
            .to_vec();
        let key = OaepPrivateDecryptingKey::new(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key,
            public_key_der,
        })
    }

    /// Generates a fresh 2048-bit key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let key = PrivateDecryptingKey::generate(KeySize::Rsa2048)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private(key)
    }

    /// Loads a PKCS#8 DER private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self, CryptoError> {
        let key = PrivateDecryptingKey::from_pkcs8(der)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_private(key)
    }

    /// Returns the public key as an X.509 `SubjectPublicKeyInfo` DER.
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Decrypts a transported content key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if unwrapping fails.
    pub fn unwrap_key(
        &self,
        algorithm: KeyTransportAlgorithm,
        wrapped: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; self.key.min_output_size()];
        let plaintext = self
            .key
            .decrypt(algorithm.oaep(), wrapped, &mut out, None)
            .map_err(|_| CryptoError::Decryption)?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static SP_KEY: LazyLock<RsaDecryptionKey> =
        LazyLock::new(|| RsaDecryptionKey::generate().expect("key generation"));

    #[test]
    fn aes_gcm_encrypt_decrypt() {
        for alg in [DataEncryptionAlgorithm::Aes128Gcm, DataEncryptionAlgorithm::Aes256Gcm] {
            let key = alg.generate_key();
            let sealed = encrypt_data(alg, &key, b"<saml:Assertion/>").unwrap();
            assert_eq!(sealed.len(), NONCE_LEN + 17 + 16);
            assert_eq!(decrypt_data(alg, &key, &sealed).unwrap(), b"<saml:Assertion/>");
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let alg = DataEncryptionAlgorithm::Aes256Gcm;
        let key = alg.generate_key();
        let mut sealed = encrypt_data(alg, &key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(decrypt_data(alg, &key, &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let result = encrypt_data(DataEncryptionAlgorithm::Aes256Gcm, &[0u8; 16], b"x");
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn key_transport_roundtrip() {
        let spki = SP_KEY.public_key_der();
        let content_key = DataEncryptionAlgorithm::Aes256Gcm.generate_key();
        for alg in [KeyTransportAlgorithm::RsaOaep, KeyTransportAlgorithm::RsaOaepMgf1p] {
            let wrapped = wrap_key(alg, &spki, &content_key).unwrap();
            assert_eq!(wrapped.len(), 256);
            assert_eq!(SP_KEY.unwrap_key(alg, &wrapped).unwrap(), content_key);
        }
    }

    #[test]
    fn algorithm_uris_parse() {
        assert_eq!(
            DataEncryptionAlgorithm::from_uri("http://www.w3.org/2009/xmlenc11#aes256-gcm"),
            Some(DataEncryptionAlgorithm::Aes256Gcm)
        );
        assert_eq!(
            KeyTransportAlgorithm::from_uri("http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p"),
            Some(KeyTransportAlgorithm::RsaOaepMgf1p)
        );
        assert_eq!(
            DataEncryptionAlgorithm::from_uri("http://www.w3.org/2001/04/xmlenc#aes128-cbc"),
            None
        );
    }
}
