//! The `AuthnRequest` a service provider sends to start single sign-on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MatchValue, NameIdPolicy, RequestedAttribute, SamlBinding, SignMessage};
use crate::error::{SamlError, SamlResult};

const SAML_VERSION: &str = "2.0";

fn saml_version() -> String {
    SAML_VERSION.to_owned()
}

/// Logical form of an inbound `AuthnRequest`, independent of binding.
///
/// The reply endpoint is named either by URL or by index into the SP's
/// metadata, never both; [`Self::validate`] rejects requests that set
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthnRequest {
    /// Message `ID`, the key replay protection is scoped by.
    pub id: String,
    /// Protocol version; only `2.0` passes validation.
    #[serde(default = "saml_version")]
    pub version: String,
    /// Instant the SP created the request.
    pub issue_instant: DateTime<Utc>,
    /// Entity ID of the requesting SP.
    pub issuer: String,
    /// Reply endpoint by URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,
    /// Reply endpoint by metadata index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_index: Option<u32>,
    /// Endpoint the SP addressed; compared with where the message arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Binding URI the SP wants the response delivered over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,
    /// Constraints on the subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,
    /// Acceptable authentication contexts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_authn_context: Option<RequestedAuthnContext>,
    /// Existing sessions must not satisfy this request.
    #[serde(default)]
    pub force_authn: bool,
    /// The user must not be prompted.
    #[serde(default)]
    pub is_passive: bool,
    /// Display name of the SP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// Principal attributes asked for in `<Extensions>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_attributes: Vec<RequestedAttribute>,
    /// Attribute values identifying the expected principal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principal_selection: Vec<MatchValue>,
    /// Message a signature service wants displayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_message: Option<SignMessage>,
}

impl AuthnRequest {
    /// Starts a request from `issuer`, stamped now with a fresh message ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self::with_id(idp_crypto::random::generate_message_id(), issuer)
    }

    /// Starts a request with a caller-chosen message ID.
    #[must_use]
    pub fn with_id(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: saml_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            assertion_consumer_service_url: None,
            assertion_consumer_service_index: None,
            destination: None,
            protocol_binding: None,
            name_id_policy: None,
            requested_authn_context: None,
            force_authn: false,
            is_passive: false,
            provider_name: None,
            requested_attributes: Vec::new(),
            principal_selection: Vec::new(),
            sign_message: None,
        }
    }

    /// Overrides the issue instant.
    #[must_use]
    pub const fn issued_at(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Names the reply endpoint by URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the addressed endpoint.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Asks for the response over `binding`.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_owned());
        self
    }

    /// Sets the NameID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Sets the acceptable contexts.
    #[must_use]
    pub fn with_authn_context(mut self, context: RequestedAuthnContext) -> Self {
        self.requested_authn_context = Some(context);
        self
    }

    /// Asks for one more attribute.
    #[must_use]
    pub fn with_requested_attribute(mut self, attribute: RequestedAttribute) -> Self {
        self.requested_attributes.push(attribute);
        self
    }

    /// Names the expected principal by one more attribute value.
    #[must_use]
    pub fn with_principal_selection(mut self, value: MatchValue) -> Self {
        self.principal_selection.push(value);
        self
    }

    /// Attaches a sign message.
    #[must_use]
    pub fn with_sign_message(mut self, message: SignMessage) -> Self {
        self.sign_message = Some(message);
        self
    }

    /// Sets `ForceAuthn`.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets `IsPassive`.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// The requested response binding, if it is one this IdP knows.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(self.protocol_binding.as_deref()?)
    }

    /// Context class URIs the SP accepts; empty when it stated none.
    #[must_use]
    pub fn requested_context_classes(&self) -> &[String] {
        match &self.requested_authn_context {
            Some(context) => context.authn_context_class_refs.as_slice(),
            None => &[],
        }
    }

    /// Checks the structural rules every request must satisfy before any
    /// trust decision is made.
    ///
    /// # Errors
    ///
    /// [`SamlError::MalformedRequest`] describing the first broken rule.
    pub fn validate(&self) -> SamlResult<()> {
        let problem = if self.id.is_empty() {
            Some("request carries no ID".to_owned())
        } else if self.version != SAML_VERSION {
            Some(format!("version {} is not 2.0", self.version))
        } else if self.issuer.is_empty() {
            Some("request names no issuer".to_owned())
        } else if self.assertion_consumer_service_url.is_some()
            && self.assertion_consumer_service_index.is_some()
        {
            Some("reply endpoint given both by URL and by index".to_owned())
        } else {
            None
        };
        problem.map_or(Ok(()), |reason| Err(SamlError::MalformedRequest(reason)))
    }
}

/// `<RequestedAuthnContext>`: the context classes an SP will accept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAuthnContext {
    /// How the classes are compared.
    #[serde(default)]
    pub comparison: AuthnContextComparison,
    /// Class reference URIs, in the SP's order of preference.
    #[serde(default)]
    pub authn_context_class_refs: Vec<String>,
}

impl RequestedAuthnContext {
    /// Accepts any one of `classes`, compared exactly.
    #[must_use]
    pub fn exact<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            comparison: AuthnContextComparison::Exact,
            authn_context_class_refs: classes.into_iter().map(Into::into).collect(),
        }
    }
}

/// The `Comparison` attribute. Only `exact` is evaluated; the others are
/// parsed so requests carrying them are not refused as malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthnContextComparison {
    /// One of the listed classes.
    #[default]
    Exact,
    /// At least as strong.
    Minimum,
    /// No stronger than.
    Maximum,
    /// Stronger than all listed.
    Better,
}

impl AuthnContextComparison {
    const ALL: [Self; 4] = [Self::Exact, Self::Minimum, Self::Maximum, Self::Better];

    /// Attribute value as written on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Better => "better",
        }
    }

    /// Reads the attribute value; unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{authn_context_classes, AttributeSource, NameIdFormat};

    #[test]
    fn builder_fills_in_request() {
        let request = AuthnRequest::new("https://sp.example.com")
            .with_acs_url("https://sp.example.com/acs")
            .with_destination("https://idp.example.com/sso")
            .with_binding(SamlBinding::HttpPost)
            .with_name_id_policy(NameIdPolicy::new(NameIdFormat::Persistent))
            .with_requested_attribute(RequestedAttribute::new(
                "given-name",
                true,
                AttributeSource::Request,
            ))
            .force_authn(true);

        assert!(request.id.starts_with('_'));
        assert_eq!(request.version, "2.0");
        assert!(request.force_authn);
        assert_eq!(request.parsed_binding(), Some(SamlBinding::HttpPost));
        assert_eq!(request.requested_attributes.len(), 1);
    }

    #[test]
    fn structural_rules_are_enforced() {
        let request = AuthnRequest::new("https://sp.example.com");
        assert!(request.validate().is_ok());

        let mut no_id = request.clone();
        no_id.id.clear();
        assert!(no_id.validate().is_err());

        let mut no_issuer = request.clone();
        no_issuer.issuer.clear();
        assert!(no_issuer.validate().is_err());

        let mut old = request.clone();
        old.version = "1.1".to_owned();
        assert!(old.validate().is_err());

        let mut both = request.with_acs_url("https://sp/acs");
        both.assertion_consumer_service_index = Some(1);
        assert!(matches!(both.validate(), Err(SamlError::MalformedRequest(_))));
    }

    #[test]
    fn context_classes_default_to_empty() {
        let request = AuthnRequest::new("https://sp.example.com")
            .with_authn_context(RequestedAuthnContext::exact([authn_context_classes::X509]));
        assert_eq!(request.requested_context_classes(), [authn_context_classes::X509]);
        assert!(AuthnRequest::new("sp").requested_context_classes().is_empty());
    }

    #[test]
    fn comparison_values_parse() {
        assert_eq!(
            AuthnContextComparison::parse("minimum"),
            Some(AuthnContextComparison::Minimum)
        );
        assert_eq!(AuthnContextComparison::parse("at-least"), None);
    }
}
