//! Failures of key handling, signing and encryption.

use thiserror::Error;

/// What went wrong in a cryptographic operation.
///
/// Verification and decryption failures carry no detail, so callers cannot
/// turn them into an oracle.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key could not be generated.
    #[error("cannot generate key: {0}")]
    KeyGeneration(String),

    /// Key material was unreadable or unusable for the operation.
    #[error("unusable key: {0}")]
    InvalidKey(String),

    /// The private key refused to sign.
    #[error("cannot sign: {0}")]
    Signing(String),

    /// The signature does not match.
    #[error("signature does not verify")]
    Verification,

    /// Sealing data or wrapping a key failed.
    #[error("cannot encrypt: {0}")]
    Encryption(String),

    /// Unwrapping or opening failed.
    #[error("cannot decrypt")]
    Decryption,
}
