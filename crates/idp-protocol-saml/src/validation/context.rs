//! The validated form of an authentication request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    RequestedAttribute, SamlBinding, SignMessage, UserAttribute, SIGSERVICE_ENTITY_CATEGORY,
};

/// Where and how to answer a request.
///
/// Known only once the issuer is trusted and its ACS endpoint resolved; an
/// error without a reply channel is never answered with a SAML response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyChannel {
    /// ID of the request being answered.
    pub request_id: String,
    /// Entity id of the SP.
    pub sp_entity_id: String,
    /// Resolved ACS URL.
    pub acs_url: String,
    /// Binding of the ACS endpoint.
    pub binding: SamlBinding,
    /// `RelayState` to echo.
    pub relay_state: Option<String>,
}

/// A request that passed validation.
///
/// Immutable once built, and serializable so a suspended request can be
/// resumed on another worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequestContext {
    /// Request ID.
    pub request_id: String,
    /// Entity id of the requesting SP.
    pub sp_entity_id: String,
    /// Request issue instant.
    pub issue_instant: DateTime<Utc>,
    /// When the IdP received the request.
    pub received_at: DateTime<Utc>,
    /// Resolved ACS URL.
    pub acs_url: String,
    /// Binding of the resolved ACS endpoint.
    pub binding: SamlBinding,
    /// `RelayState` to echo.
    pub relay_state: Option<String>,
    /// Negotiated NameID format URI.
    pub name_id_format: String,
    /// `SPNameQualifier` of the NameID policy.
    pub sp_name_qualifier: Option<String>,
    /// `AllowCreate` of the NameID policy.
    pub allow_create: bool,
    /// Authentication context classes that satisfy the request, in
    /// preference order.
    pub authn_contexts: Vec<String>,
    /// Whether the SP asked for specific classes.
    pub authn_context_requested: bool,
    /// `ForceAuthn`.
    pub force_authn: bool,
    /// `IsPassive`.
    pub is_passive: bool,
    /// Resolved attribute requests.
    pub requested_attributes: Vec<RequestedAttribute>,
    /// Entity categories of the SP.
    pub entity_categories: Vec<String>,
    /// Whether the request carried a verified signature.
    pub signed: bool,
    /// User agent address.
    pub subject_address: Option<String>,
    /// Attributes naming the principal the SP expects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principal_selection: Vec<UserAttribute>,
    /// Sign message to display; only kept for signature services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_message: Option<SignMessage>,
}

impl AuthnRequestContext {
    /// Returns the reply channel of the request.
    #[must_use]
    pub fn reply(&self) -> ReplyChannel {
        ReplyChannel {
            request_id: self.request_id.clone(),
            sp_entity_id: self.sp_entity_id.clone(),
            acs_url: self.acs_url.clone(),
            binding: self.binding,
            relay_state: self.relay_state.clone(),
        }
    }

    /// Returns the names of required attributes.
    #[must_use]
    pub fn required_attributes(&self) -> Vec<&str> {
        self.requested_attributes
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Returns true if the SP is a signature service.
    #[must_use]
    pub fn is_signature_service(&self) -> bool {
        self.entity_categories
            .iter()
            .any(|c| c == SIGSERVICE_ENTITY_CATEGORY)
    }

    /// Returns true if `class_ref` satisfies the request.
    #[must_use]
    pub fn accepts_context(&self, class_ref: &str) -> bool {
        self.authn_contexts.iter().any(|c| c == class_ref)
    }
}
