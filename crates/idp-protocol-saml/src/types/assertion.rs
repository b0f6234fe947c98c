//! The assertion issued per accepted authentication. Once signed it is
//! never changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, UserAttribute, CONFIRMATION_METHOD_BEARER};

/// Statements the IdP makes about one authenticated principal, addressed
/// to one SP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Assertion `ID`; the signature reference points at it.
    pub id: String,

    /// Issue time.
    pub issue_instant: DateTime<Utc>,

    /// IdP entity ID.
    pub issuer: String,

    /// Who the assertion is about.
    pub subject: Subject,

    /// Validity window and audience restriction.
    pub conditions: Conditions,

    /// How and when the subject authenticated.
    pub authn_statement: AuthnStatement,

    /// Released attributes. Omitted from the XML when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<UserAttribute>,
}

impl Assertion {
    /// A released attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&UserAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether `audience` would accept the assertion at `now`: inside the
    /// validity window and named in the audience restriction.
    #[must_use]
    pub fn acceptable_to(&self, audience: &str, now: DateTime<Utc>) -> bool {
        let conditions = &self.conditions;
        (conditions.not_before..conditions.not_on_or_after).contains(&now)
            && conditions.audiences.iter().any(|a| a == audience)
    }
}

/// `<saml2:Subject>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Identifier chosen for the recipient SP.
    pub name_id: NameId,

    /// Bearer confirmation bound to the requesting ACS endpoint.
    pub confirmation: SubjectConfirmation,
}

/// `<saml2:SubjectConfirmation>` and its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// Always bearer.
    pub method: String,

    /// `ID` of the answered request.
    pub in_response_to: String,

    /// ACS URL the assertion must be delivered to.
    pub recipient: String,

    /// Deadline for presenting the assertion.
    pub not_on_or_after: DateTime<Utc>,

    /// Address of the user agent, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl SubjectConfirmation {
    /// Bearer confirmation for delivery to `recipient`.
    #[must_use]
    pub fn bearer(
        in_response_to: impl Into<String>,
        recipient: impl Into<String>,
        not_on_or_after: DateTime<Utc>,
    ) -> Self {
        Self {
            method: CONFIRMATION_METHOD_BEARER.to_string(),
            in_response_to: in_response_to.into(),
            recipient: recipient.into(),
            not_on_or_after,
            address: None,
        }
    }
}

/// `<saml2:Conditions>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,

    /// End of the validity window (exclusive).
    pub not_on_or_after: DateTime<Utc>,

    /// Entities allowed to consume the assertion.
    pub audiences: Vec<String>,
}

/// `<saml2:AuthnStatement>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,

    /// Session index for the IdP session.
    pub session_index: String,

    /// Authentication context class actually achieved.
    pub authn_context_class_ref: String,

    /// Authority that performed the authentication, if delegated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticating_authority: Option<String>,

    /// Address of the user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_locality: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{authn_context_classes, NameIdFormat};
    use chrono::Duration;

    fn assertion(now: DateTime<Utc>) -> Assertion {
        Assertion {
            id: "_a1".into(),
            issue_instant: now,
            issuer: "https://idp.example.com".into(),
            subject: Subject {
                name_id: NameId::new("abc", NameIdFormat::Persistent.uri()),
                confirmation: SubjectConfirmation::bearer(
                    "_r1",
                    "https://sp.example.com/acs",
                    now + Duration::minutes(5),
                ),
            },
            conditions: Conditions {
                not_before: now - Duration::seconds(10),
                not_on_or_after: now + Duration::minutes(5),
                audiences: vec!["https://sp.example.com".into()],
            },
            authn_statement: AuthnStatement {
                authn_instant: now,
                session_index: "s1".into(),
                authn_context_class_ref: authn_context_classes::X509.into(),
                authenticating_authority: None,
                subject_locality: None,
            },
            attributes: vec![UserAttribute::single("given-name", "Anna")],
        }
    }

    #[test]
    fn acceptance_needs_window_and_audience() {
        let now = Utc::now();
        let assertion = assertion(now);
        let sp = "https://sp.example.com";

        assert!(assertion.acceptable_to(sp, now));
        assert!(!assertion.acceptable_to("https://other.example.com", now));
        assert!(!assertion.acceptable_to(sp, now + Duration::minutes(5)));
        assert!(!assertion.acceptable_to(sp, now - Duration::minutes(1)));
    }

    #[test]
    fn attribute_lookup() {
        let assertion = assertion(Utc::now());
        assert_eq!(
            assertion.attribute("given-name").and_then(UserAttribute::first_str),
            Some("Anna")
        );
        assert!(assertion.attribute("sn").is_none());
        assert_eq!(assertion.subject.confirmation.method, CONFIRMATION_METHOD_BEARER);
    }
}
