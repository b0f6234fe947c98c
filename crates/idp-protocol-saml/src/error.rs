//! SAML error types.
//!
//! Every failure the protocol engine can report maps to one [`SamlError`]
//! variant. Errors raised before the requesting SP and its reply channel are
//! trusted are transport-level: they must never be turned into a SAML
//! response. All others are answered with a signed error response carrying
//! the status returned by [`SamlError::status`].

use thiserror::Error;

use crate::types::{status_codes, sub_status_codes, Status, STATUS_CANCEL};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// The inbound message could not be parsed or is structurally invalid.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The issuer is not a registered service provider.
    #[error("untrusted issuer: {0}")]
    UntrustedIssuer(String),

    /// The request signature is missing or does not verify.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// The request destination or assertion consumer service is not acceptable.
    #[error("destination mismatch: {0}")]
    DestinationMismatch(String),

    /// The (message id, issuer) pair was already accepted.
    #[error("replay detected: message {message_id} from {issuer}")]
    ReplayDetected {
        /// Replayed message id.
        message_id: String,
        /// Issuer of the replayed message.
        issuer: String,
    },

    /// The request issue instant is outside the accepted window.
    #[error("request expired: {0}")]
    RequestExpired(String),

    /// A required attribute could not be released.
    #[error("missing required attribute: {0}")]
    MissingRequiredAttribute(String),

    /// The negotiated name ID format cannot be served.
    #[error("unsupported name ID format: {0}")]
    UnsupportedNameIdFormat(String),

    /// Encryption is required but no usable credential or algorithm exists.
    #[error("no usable encryption credential: {0}")]
    NoUsableEncryptionCredential(String),

    /// The external authentication step was not completed in time.
    #[error("external authentication timed out")]
    ExternalAuthenticationTimeout,

    /// Resumption with an unknown or already consumed correlation token.
    #[error("invalid external authentication token")]
    ExternalAuthenticationTokenInvalid,

    /// Building, signing or encrypting the response failed.
    #[error("failed to build response: {0}")]
    InternalBuildFailure(String),

    /// Passive authentication was requested but no session can be reused.
    #[error("passive authentication not possible")]
    PassiveAuthenticationNotPossible,

    /// None of the requested authentication contexts can be delivered.
    #[error("authentication context not supported: {0}")]
    AuthnContextNotSupported(String),

    /// The external authenticator reported a failure.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The user cancelled the authentication.
    #[error("authentication cancelled by user")]
    AuthenticationCancelled,

    /// A sign message the SP required to be shown was not displayed.
    #[error("sign message was not displayed")]
    SignMessageNotDisplayed,

    /// The request asks for something this IdP does not do.
    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),

    /// Replay cache or suspension store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Discriminant of [`SamlError`], used in audit records and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorKind {
    MalformedRequest,
    UntrustedIssuer,
    SignatureInvalid,
    DestinationMismatch,
    ReplayDetected,
    RequestExpired,
    MissingRequiredAttribute,
    UnsupportedNameIdFormat,
    NoUsableEncryptionCredential,
    ExternalAuthenticationTimeout,
    ExternalAuthenticationTokenInvalid,
    InternalBuildFailure,
    PassiveAuthenticationNotPossible,
    AuthnContextNotSupported,
    AuthenticationFailed,
    AuthenticationCancelled,
    SignMessageNotDisplayed,
    UnsupportedRequest,
    Storage,
}

impl ErrorKind {
    /// Returns the stable identifier of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "MalformedRequest",
            Self::UntrustedIssuer => "UntrustedIssuer",
            Self::SignatureInvalid => "SignatureInvalid",
            Self::DestinationMismatch => "DestinationMismatch",
            Self::ReplayDetected => "ReplayDetected",
            Self::RequestExpired => "RequestExpired",
            Self::MissingRequiredAttribute => "MissingRequiredAttribute",
            Self::UnsupportedNameIdFormat => "UnsupportedNameIDFormat",
            Self::NoUsableEncryptionCredential => "NoUsableEncryptionCredential",
            Self::ExternalAuthenticationTimeout => "ExternalAuthenticationTimeout",
            Self::ExternalAuthenticationTokenInvalid => "ExternalAuthenticationTokenInvalid",
            Self::InternalBuildFailure => "InternalBuildFailure",
            Self::PassiveAuthenticationNotPossible => "PassiveAuthenticationNotPossible",
            Self::AuthnContextNotSupported => "AuthnContextNotSupported",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AuthenticationCancelled => "AuthenticationCancelled",
            Self::SignMessageNotDisplayed => "SignMessageNotDisplayed",
            Self::UnsupportedRequest => "UnsupportedRequest",
            Self::Storage => "Storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SamlError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::UntrustedIssuer(_) => ErrorKind::UntrustedIssuer,
            Self::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            Self::DestinationMismatch(_) => ErrorKind::DestinationMismatch,
            Self::ReplayDetected { .. } => ErrorKind::ReplayDetected,
            Self::RequestExpired(_) => ErrorKind::RequestExpired,
            Self::MissingRequiredAttribute(_) => ErrorKind::MissingRequiredAttribute,
            Self::UnsupportedNameIdFormat(_) => ErrorKind::UnsupportedNameIdFormat,
            Self::NoUsableEncryptionCredential(_) => ErrorKind::NoUsableEncryptionCredential,
            Self::ExternalAuthenticationTimeout => ErrorKind::ExternalAuthenticationTimeout,
            Self::ExternalAuthenticationTokenInvalid => {
                ErrorKind::ExternalAuthenticationTokenInvalid
            }
            Self::InternalBuildFailure(_) => ErrorKind::InternalBuildFailure,
            Self::PassiveAuthenticationNotPossible => ErrorKind::PassiveAuthenticationNotPossible,
            Self::AuthnContextNotSupported(_) => ErrorKind::AuthnContextNotSupported,
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::AuthenticationCancelled => ErrorKind::AuthenticationCancelled,
            Self::SignMessageNotDisplayed => ErrorKind::SignMessageNotDisplayed,
            Self::UnsupportedRequest(_) => ErrorKind::UnsupportedRequest,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if the error must surface as a transport failure rather
    /// than a SAML response.
    ///
    /// ## NIST 800-53 Rev5: SI-11 (Error Handling)
    ///
    /// Nothing is sent to an endpoint whose owner has not been authenticated.
    #[must_use]
    pub const fn is_transport_level(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_)
                | Self::UntrustedIssuer(_)
                | Self::SignatureInvalid(_)
                | Self::DestinationMismatch(_)
                | Self::ExternalAuthenticationTokenInvalid
        )
    }

    /// Returns the SAML status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_)
            | Self::UntrustedIssuer(_)
            | Self::SignatureInvalid(_)
            | Self::DestinationMismatch(_)
            | Self::ReplayDetected { .. }
            | Self::RequestExpired(_)
            | Self::UnsupportedNameIdFormat(_)
            | Self::AuthnContextNotSupported(_)
            | Self::UnsupportedRequest(_) => status_codes::REQUESTER,
            _ => status_codes::RESPONDER,
        }
    }

    /// Returns a sub-status code if applicable.
    #[must_use]
    pub const fn sub_status_code(&self) -> Option<&'static str> {
        match self {
            Self::ReplayDetected { .. } | Self::RequestExpired(_) => {
                Some(sub_status_codes::REQUEST_DENIED)
            }
            Self::MissingRequiredAttribute(_) => Some(sub_status_codes::INVALID_ATTR_NAME_OR_VALUE),
            Self::UnsupportedNameIdFormat(_) => Some(sub_status_codes::INVALID_NAMEID_POLICY),
            Self::NoUsableEncryptionCredential(_)
            | Self::SignMessageNotDisplayed
            | Self::UnsupportedRequest(_) => Some(sub_status_codes::REQUEST_UNSUPPORTED),
            Self::ExternalAuthenticationTimeout | Self::AuthenticationFailed(_) => {
                Some(sub_status_codes::AUTHN_FAILED)
            }
            Self::PassiveAuthenticationNotPossible => Some(sub_status_codes::NO_PASSIVE),
            Self::AuthnContextNotSupported(_) => Some(sub_status_codes::NO_AUTHN_CONTEXT),
            Self::AuthenticationCancelled => Some(STATUS_CANCEL),
            Self::UntrustedIssuer(_) => Some(sub_status_codes::REQUEST_DENIED),
            _ => None,
        }
    }

    /// Returns the status placed in an error response for this error.
    #[must_use]
    pub fn status(&self) -> Status {
        let status = Status::error(self.status_code(), self.sub_status_code());
        match self {
            // Internal details stay in the logs.
            Self::InternalBuildFailure(_) | Self::Storage(_) => {
                status.with_message("Internal error")
            }
            other => status.with_message(other.to_string()),
        }
    }

    /// Returns the HTTP status code for transport-level handling.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) | Self::ExternalAuthenticationTokenInvalid => 400,
            Self::UntrustedIssuer(_) | Self::SignatureInvalid(_) | Self::DestinationMismatch(_) => {
                403
            }
            Self::InternalBuildFailure(_) | Self::Storage(_) => 500,
            _ => 400,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::MalformedRequest(format!("XML parsing error: {err}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::MalformedRequest(format!("XML attribute error: {err}"))
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::MalformedRequest(format!("base64 decode error: {err}"))
    }
}

impl From<idp_crypto::CryptoError> for SamlError {
    fn from(err: idp_crypto::CryptoError) -> Self {
        Self::InternalBuildFailure(err.to_string())
    }
}

impl From<idp_cache::CacheError> for SamlError {
    fn from(err: idp_cache::CacheError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SamlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_trust_errors_are_transport_level() {
        assert!(SamlError::UntrustedIssuer("x".into()).is_transport_level());
        assert!(SamlError::MalformedRequest("x".into()).is_transport_level());
        assert!(SamlError::DestinationMismatch("x".into()).is_transport_level());
        assert!(!SamlError::RequestExpired("x".into()).is_transport_level());
        assert!(!SamlError::ReplayDetected {
            message_id: "_1".into(),
            issuer: "sp".into()
        }
        .is_transport_level());
    }

    #[test]
    fn error_status_codes() {
        let err = SamlError::ReplayDetected {
            message_id: "_1".into(),
            issuer: "sp".into(),
        };
        assert_eq!(err.status_code(), status_codes::REQUESTER);
        assert_eq!(err.sub_status_code(), Some(sub_status_codes::REQUEST_DENIED));

        let err = SamlError::MissingRequiredAttribute("given-name".into());
        assert_eq!(err.status_code(), status_codes::RESPONDER);
        assert_eq!(
            err.sub_status_code(),
            Some(sub_status_codes::INVALID_ATTR_NAME_OR_VALUE)
        );

        let err = SamlError::InternalBuildFailure("boom".into());
        assert_eq!(err.status_code(), status_codes::RESPONDER);
        assert_eq!(err.sub_status_code(), None);
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let status = SamlError::InternalBuildFailure("key file missing".into()).status();
        assert_eq!(status.message.as_deref(), Some("Internal error"));

        let err = SamlError::SignMessageNotDisplayed;
        assert_eq!(err.status_code(), status_codes::RESPONDER);
        assert_eq!(err.sub_status_code(), Some(sub_status_codes::REQUEST_UNSUPPORTED));
        assert!(!err.is_transport_level());

        let status = SamlError::PassiveAuthenticationNotPossible.status();
        assert_eq!(status.sub_code.as_deref(), Some(sub_status_codes::NO_PASSIVE));
    }

    #[test]
    fn kind_names_follow_taxonomy() {
        assert_eq!(
            SamlError::UnsupportedNameIdFormat("x".into()).kind().as_str(),
            "UnsupportedNameIDFormat"
        );
        assert_eq!(
            SamlError::ExternalAuthenticationTimeout.kind(),
            ErrorKind::ExternalAuthenticationTimeout
        );
    }
}
