//! Assertion encryption.
//!
//! # NIST 800-53 Rev5: SC-13 (Cryptographic Protection)
//!
//! Only algorithms on the IdP's allow-lists are ever used. An SP that
//! advertises algorithms restricts the choice to the intersection; an empty
//! intersection is an error, never a silent fallback.

use idp_core::IdpSettings;
use idp_crypto::{
    decrypt_data, encrypt_data, wrap_key, DataEncryptionAlgorithm, KeyTransportAlgorithm,
    RsaDecryptionKey,
};

use crate::error::{SamlError, SamlResult};
use crate::types::{EncryptedAssertion, EncryptionCredential};

/// Algorithms chosen for one encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionSelection {
    /// Content encryption algorithm.
    pub data: DataEncryptionAlgorithm,
    /// Key transport algorithm.
    pub key_transport: KeyTransportAlgorithm,
}

/// Encrypts signed assertions for their recipient.
#[derive(Debug, Clone)]
pub struct AssertionEncrypter {
    data_algorithms: Vec<DataEncryptionAlgorithm>,
    key_transport_algorithms: Vec<KeyTransportAlgorithm>,
}

impl AssertionEncrypter {
    /// Creates an encrypter from the IdP allow-lists.
    ///
    /// Unknown URIs in the settings are ignored.
    #[must_use]
    pub fn new(settings: &IdpSettings) -> Self {
        Self {
            data_algorithms: settings
                .encryption
                .allowed_data_algorithms
                .iter()
                .filter_map(|uri| DataEncryptionAlgorithm::from_uri(uri))
                .collect(),
            key_transport_algorithms: settings
                .encryption
                .allowed_key_transport_algorithms
                .iter()
                .filter_map(|uri| KeyTransportAlgorithm::from_uri(uri))
                .collect(),
        }
    }

    /// Checks that assertions can be encrypted for an SP.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoUsableEncryptionCredential`] if the SP declares
    /// no credential or no acceptable algorithm pair exists.
    pub fn check_capability(&self, credential: Option<&EncryptionCredential>) -> SamlResult<()> {
        let credential = credential.ok_or_else(|| {
            SamlError::NoUsableEncryptionCredential("SP declares no encryption key".to_string())
        })?;
        self.select(credential).map(|_| ())
    }

    /// Chooses algorithms for `credential`.
    ///
    /// SP preference order wins; an SP advertising nothing of a kind gets the
    /// IdP's first allowed algorithm of that kind.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoUsableEncryptionCredential`] if an intersection
    /// is empty.
    pub fn select(&self, credential: &EncryptionCredential) -> SamlResult<EncryptionSelection> {
        let methods = &credential.encryption_methods;
        let data = pick(
            methods.iter().filter_map(|m| DataEncryptionAlgorithm::from_uri(m)),
            methods.iter().any(|m| is_data_method(m)),
            &self.data_algorithms,
        )
        .ok_or_else(|| {
            SamlError::NoUsableEncryptionCredential(
                "no common content encryption algorithm".to_string(),
            )
        })?;
        let key_transport = pick(
            methods.iter().filter_map(|m| KeyTransportAlgorithm::from_uri(m)),
            methods.iter().any(|m| is_key_transport_method(m)),
            &self.key_transport_algorithms,
        )
        .ok_or_else(|| {
            SamlError::NoUsableEncryptionCredential("no common key transport algorithm".to_string())
        })?;
        Ok(EncryptionSelection {
            data,
            key_transport,
        })
    }

    /// Encrypts a signed assertion document for `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoUsableEncryptionCredential`] if no algorithms
    /// can be agreed, or [`SamlError::InternalBuildFailure`] if encryption
    /// fails.
    pub fn encrypt(
        &self,
        assertion_xml: &str,
        credential: &EncryptionCredential,
    ) -> SamlResult<EncryptedAssertion> {
        let selection = self.select(credential)?;
        let content_key = selection.data.generate_key();
        let cipher_value = encrypt_data(selection.data, &content_key, assertion_xml.as_bytes())?;
        let encrypted_key = wrap_key(selection.key_transport, &credential.public_key, &content_key)
            .map_err(|e| SamlError::NoUsableEncryptionCredential(e.to_string()))?;
        tracing::debug!(
            data = selection.data.uri(),
            key_transport = selection.key_transport.uri(),
            "Assertion encrypted"
        );
        Ok(EncryptedAssertion {
            data_algorithm: selection.data.uri().to_string(),
            key_transport_algorithm: selection.key_transport.uri().to_string(),
            encrypted_key,
            cipher_value,
        })
    }
}

fn pick<T: Copy + PartialEq>(
    advertised: impl Iterator<Item = T>,
    advertises_kind: bool,
    allowed: &[T],
) -> Option<T> {
    if advertises_kind {
        advertised.into_iter().find(|a| allowed.contains(a))
    } else {
        allowed.first().copied()
    }
}

// Methods we cannot parse still count as a stated preference of their kind.
fn is_data_method(uri: &str) -> bool {
    DataEncryptionAlgorithm::from_uri(uri).is_some()
        || uri.contains("#aes")
        || uri.contains("#tripledes")
}

fn is_key_transport_method(uri: &str) -> bool {
    KeyTransportAlgorithm::from_uri(uri).is_some() || uri.contains("#rsa-")
}

/// Decrypts an encrypted assertion with the recipient's private key.
///
/// Used by SP-side tooling and tests.
///
/// # Errors
///
/// Returns [`SamlError::MalformedRequest`] for unknown algorithms, or
/// [`SamlError::InternalBuildFailure`] if decryption fails.
pub fn decrypt_assertion(
    encrypted: &EncryptedAssertion,
    key: &RsaDecryptionKey,
) -> SamlResult<String> {
    let data = DataEncryptionAlgorithm::from_uri(&encrypted.data_algorithm).ok_or_else(|| {
        SamlError::MalformedRequest(format!("unknown algorithm {}", encrypted.data_algorithm))
    })?;
    let transport =
        KeyTransportAlgorithm::from_uri(&encrypted.key_transport_algorithm).ok_or_else(|| {
            SamlError::MalformedRequest(format!(
                "unknown algorithm {}",
                encrypted.key_transport_algorithm
            ))
        })?;
    let content_key = key.unwrap_key(transport, &encrypted.encrypted_key)?;
    let plaintext = decrypt_data(data, &content_key, &encrypted.cipher_value)?;
    String::from_utf8(plaintext)
        .map_err(|_| SamlError::InternalBuildFailure("decrypted assertion is not UTF-8".to_string()))
}
