//! Hand-off to and from the external authenticator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RequestedAttribute, SignMessage, UserAttribute};
use crate::validation::AuthnRequestContext;

/// What the external authenticator must achieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRequirements {
    /// ID of the suspended request.
    pub request_id: String,
    /// Requesting SP.
    pub sp_entity_id: String,
    /// Whether an existing login must not be trusted.
    pub force_authn: bool,
    /// Whether user interaction is prohibited.
    pub is_passive: bool,
    /// Acceptable authentication context classes, in preference order.
    pub authn_contexts: Vec<String>,
    /// Negotiated NameID format.
    pub name_id_format: String,
    /// Attributes the SP asks for.
    pub requested_attributes: Vec<RequestedAttribute>,
    /// Entity categories of the SP.
    pub entity_categories: Vec<String>,
    /// Attributes naming the principal the SP expects, for pre-filling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principal_selection: Vec<UserAttribute>,
    /// Message to show the user before they authenticate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_message: Option<SignMessage>,
    /// When the suspension times out.
    pub deadline: DateTime<Utc>,
}

impl AuthenticationRequirements {
    pub(crate) fn new(ctx: &AuthnRequestContext, deadline: DateTime<Utc>) -> Self {
        Self {
            request_id: ctx.request_id.clone(),
            sp_entity_id: ctx.sp_entity_id.clone(),
            force_authn: ctx.force_authn,
            is_passive: ctx.is_passive,
            authn_contexts: ctx.authn_contexts.clone(),
            name_id_format: ctx.name_id_format.clone(),
            requested_attributes: ctx.requested_attributes.clone(),
            entity_categories: ctx.entity_categories.clone(),
            principal_selection: ctx.principal_selection.clone(),
            sign_message: ctx.sign_message.clone(),
            deadline,
        }
    }
}

/// Control handed to the external authenticator.
///
/// `token` is the only way back into the pipeline and works once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationHandoff {
    /// Opaque correlation token.
    pub token: String,
    /// What to achieve.
    pub requirements: AuthenticationRequirements,
}

/// A subject as vouched for by the external authenticator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedSubject {
    /// Subject identifier known to the IdP.
    pub subject_id: String,
    /// Raw subject attributes.
    pub attributes: Vec<UserAttribute>,
    /// Authentication context class achieved.
    pub authn_context_class_ref: String,
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,
    /// Authority that performed the authentication, if delegated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticating_authority: Option<String>,
    /// Whether the sign message of the request was shown to the user.
    #[serde(default)]
    pub sign_message_displayed: bool,
}

impl AuthenticatedSubject {
    /// Creates a subject authenticated at `authn_instant`.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        authn_context_class_ref: impl Into<String>,
        authn_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            attributes: Vec::new(),
            authn_context_class_ref: authn_context_class_ref.into(),
            authn_instant,
            authenticating_authority: None,
            sign_message_displayed: false,
        }
    }

    /// Adds a raw attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: UserAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Records that the sign message was displayed.
    #[must_use]
    pub const fn with_sign_message_displayed(mut self) -> Self {
        self.sign_message_displayed = true;
        self
    }

    /// Sets the authenticating authority.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authenticating_authority = Some(authority.into());
        self
    }
}

/// Result returned by the external authenticator on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AuthenticatorResponse {
    /// The subject authenticated.
    Authenticated(AuthenticatedSubject),
    /// Authentication failed.
    Failed {
        /// Reason given by the authenticator.
        reason: String,
    },
    /// The user cancelled.
    Cancelled,
}

/// A request waiting for the external authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SuspendedRequest {
    pub context: AuthnRequestContext,
    pub suspended_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}
