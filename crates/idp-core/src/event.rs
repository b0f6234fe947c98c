//! Audit events.
//!
//! ## NIST 800-53 Rev5: AU-2 (Event Logging)
//!
//! Every stage transition of an authentication request produces one audit
//! event. Error paths publish their event before any response leaves the IdP.
//!
//! ## NIST 800-53 Rev5: AU-3 (Content of Audit Records)
//!
//! All events include:
//! - Timestamp (ISO 8601)
//! - Event kind
//! - Correlation id (the request message id, when known)
//! - Requesting SP (when known)
//! - A payload specific to the kind

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventKind {
    /// An authentication request was received.
    #[serde(rename = "SAML2_REQUEST_RECEIVED")]
    RequestReceived,
    /// The request was validated and is handed to the external authenticator.
    #[serde(rename = "SAML2_BEFORE_USER_AUTHN")]
    BeforeUserAuthn,
    /// The user was authenticated, either freshly or through SSO.
    #[serde(rename = "SAML2_AFTER_USER_AUTHN")]
    AfterUserAuthn,
    /// A success response was issued.
    #[serde(rename = "SAML2_SUCCESS_RESPONSE")]
    SuccessResponse,
    /// A SAML error response was issued.
    #[serde(rename = "SAML2_ERROR_RESPONSE")]
    ErrorResponse,
    /// Processing stopped without any response being sent to the SP.
    #[serde(rename = "SAML2_UNRECOVERABLE_ERROR")]
    UnrecoverableError,
}

impl AuditEventKind {
    /// Returns the stable wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReceived => "SAML2_REQUEST_RECEIVED",
            Self::BeforeUserAuthn => "SAML2_BEFORE_USER_AUTHN",
            Self::AfterUserAuthn => "SAML2_AFTER_USER_AUTHN",
            Self::SuccessResponse => "SAML2_SUCCESS_RESPONSE",
            Self::ErrorResponse => "SAML2_ERROR_RESPONSE",
            Self::UnrecoverableError => "SAML2_UNRECOVERABLE_ERROR",
        }
    }
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific audit payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditPayload {
    /// No additional data.
    Empty,

    /// Data about a received request.
    Request {
        /// Request message id.
        request_id: String,
        /// Issuing SP.
        issuer: Option<String>,
        /// Issue instant claimed by the request.
        issue_instant: Option<DateTime<Utc>>,
        /// Requested assertion consumer service URL.
        assertion_consumer_service_url: Option<String>,
        /// Requested protocol binding.
        protocol_binding: Option<String>,
        /// Whether the request was signed.
        signed: bool,
        /// Relay state accompanying the request.
        relay_state: Option<String>,
    },

    /// Requirements handed to the external authenticator.
    Requirements {
        /// Whether a fresh authentication was demanded.
        force_authn: bool,
        /// Whether user interaction is prohibited.
        is_passive: bool,
        /// Acceptable authentication context classes.
        authn_contexts: Vec<String>,
        /// Negotiated NameID format.
        name_id_format: String,
        /// Names of requested attributes.
        requested_attributes: Vec<String>,
        /// Entity categories of the SP.
        entity_categories: Vec<String>,
        /// Names of the principal selection attributes.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        principal_selection: Vec<String>,
        /// Whether a sign message is to be displayed.
        #[serde(default)]
        sign_message: bool,
    },

    /// Data about the authenticated user.
    UserAuthentication {
        /// Subject identifier known to the IdP.
        subject: String,
        /// Instant of the (original) authentication.
        authn_instant: DateTime<Utc>,
        /// Achieved authentication context class.
        authn_context_class_ref: String,
        /// Authority that performed the authentication, if delegated.
        authenticating_authority: Option<String>,
        /// Address of the user agent.
        subject_address: Option<String>,
        /// Names of the attributes delivered by the authenticator.
        attributes: Vec<String>,
        /// Whether an existing SSO session was reused.
        sso: bool,
        /// Whether the sign message was displayed.
        #[serde(default)]
        sign_message_displayed: bool,
    },

    /// Data about an issued response.
    Response {
        /// Response message id.
        response_id: String,
        /// Id of the request being answered.
        in_response_to: String,
        /// Destination of the response.
        destination: String,
        /// Top-level status code.
        status_code: String,
        /// Second-level status code.
        sub_status_code: Option<String>,
        /// Status message.
        status_message: Option<String>,
        /// Id of the included assertion.
        assertion_id: Option<String>,
        /// NameID issued to the SP.
        name_id: Option<String>,
        /// Whether the assertion was encrypted.
        encrypted: bool,
        /// Names of the released attributes.
        released_attributes: Vec<String>,
    },

    /// An error that ended processing.
    Error {
        /// Error kind identifier.
        error_code: String,
        /// Error description.
        message: String,
    },
}

/// An audit record.
///
/// ## NIST 800-53 Rev5: AU-3 (Content of Audit Records)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event (ISO 8601).
    pub timestamp: DateTime<Utc>,

    /// Kind of event.
    pub kind: AuditEventKind,

    /// Correlation id shared by all events of one request.
    pub correlation_id: Option<String>,

    /// Requesting SP entity id.
    pub sp_entity_id: Option<String>,

    /// Kind-specific data.
    pub payload: AuditPayload,
}

impl AuditEvent {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(kind: AuditEventKind) -> AuditEventBuilder {
        AuditEventBuilder::new(kind)
    }
}

/// Builder for creating audit events.
pub struct AuditEventBuilder {
    kind: AuditEventKind,
    timestamp: Option<DateTime<Utc>>,
    correlation_id: Option<String>,
    sp_entity_id: Option<String>,
    payload: AuditPayload,
}

impl AuditEventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(kind: AuditEventKind) -> Self {
        Self {
            kind,
            timestamp: None,
            correlation_id: None,
            sp_entity_id: None,
            payload: AuditPayload::Empty,
        }
    }

    /// Sets the event timestamp. Defaults to the build time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the requesting SP.
    #[must_use]
    pub fn sp(mut self, entity_id: impl Into<String>) -> Self {
        self.sp_entity_id = Some(entity_id.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn payload(mut self, payload: AuditPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets an error payload.
    #[must_use]
    pub fn error(mut self, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        self.payload = AuditPayload::Error {
            error_code: error_code.into(),
            message: message.into(),
        };
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: Uuid::now_v7(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            kind: self.kind,
            correlation_id: self.correlation_id,
            sp_entity_id: self.sp_entity_id,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_builder_creates_event() {
        let event = AuditEvent::builder(AuditEventKind::RequestReceived)
            .correlation("_abc")
            .sp("https://sp.example.com")
            .build();

        assert_eq!(event.kind, AuditEventKind::RequestReceived);
        assert_eq!(event.correlation_id.as_deref(), Some("_abc"));
        assert_eq!(event.sp_entity_id.as_deref(), Some("https://sp.example.com"));
        assert_eq!(event.payload, AuditPayload::Empty);
    }

    #[test]
    fn event_kind_serializes_to_wire_name() {
        let json = serde_json::to_string(&AuditEventKind::UnrecoverableError).unwrap();
        assert_eq!(json, "\"SAML2_UNRECOVERABLE_ERROR\"");
        assert_eq!(
            AuditEventKind::SuccessResponse.to_string(),
            "SAML2_SUCCESS_RESPONSE"
        );
    }

    #[test]
    fn error_payload_is_tagged() {
        let event = AuditEvent::builder(AuditEventKind::ErrorResponse)
            .error("ReplayDetected", "message already processed")
            .build();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["type"], "error");
        assert_eq!(value["payload"]["error_code"], "ReplayDetected");
    }

    #[test]
    fn event_ids_are_unique() {
        let a = AuditEvent::builder(AuditEventKind::RequestReceived).build();
        let b = AuditEvent::builder(AuditEventKind::RequestReceived).build();
        assert_ne!(a.id, b.id);
    }
}
