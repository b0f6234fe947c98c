//! `<samlp:Response>` and the encrypted form of its assertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, Status};

/// A response before serialization and signing.
///
/// Error responses never carry an assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Fresh message `ID`.
    pub id: String,

    /// `ID` of the answered `AuthnRequest`.
    pub in_response_to: String,

    /// Issue time.
    pub issue_instant: DateTime<Utc>,

    /// The resolved assertion consumer service.
    pub destination: String,

    /// IdP entity ID.
    pub issuer: String,

    /// Outcome.
    pub status: Status,

    /// Plain assertion; encrypted on the wire when the SP asks for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<Assertion>,
}

impl Response {
    /// Whether the status is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// `<saml2:EncryptedAssertion>`: the assertion XML under a one-time content
/// key, and that key wrapped with the SP's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAssertion {
    /// Content cipher URI.
    pub data_algorithm: String,

    /// Key wrapping URI.
    pub key_transport_algorithm: String,

    /// Wrapped content key.
    pub encrypted_key: Vec<u8>,

    /// `IV || ciphertext || tag` of the assertion XML.
    pub cipher_value: Vec<u8>,
}
