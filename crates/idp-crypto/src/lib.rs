//! # idp-crypto
//!
//! Cryptographic operations for the SAML2 identity provider using aws-lc-rs.
//!
//! - Message digests and HMAC
//! - Secure random identifiers for messages, sessions and correlation tokens
//! - RSA PKCS#1 v1.5 signatures as used by XML-DSig
//! - AES-GCM content encryption with RSA-OAEP key transport as used by XML-Enc
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - SC-12: Cryptographic key management
//! - SC-13: Cryptographic protection

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod encryption;
pub mod error;
pub mod hash;
pub mod random;
pub mod rsa;

pub use encryption::{
    decrypt_data, encrypt_data, wrap_key, DataEncryptionAlgorithm, KeyTransportAlgorithm,
    RsaDecryptionKey,
};
pub use error::CryptoError;
pub use hash::{hash, hmac_sha256, sha256, HashAlgorithm};
pub use rsa::{rsa_verify, RsaAlgorithm, RsaSigningKey};
