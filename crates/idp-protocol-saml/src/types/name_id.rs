//! Subject identifiers and the policy an SP places on them.

use serde::{Deserialize, Serialize};

use super::NameIdFormat;

/// `<NameID>` of an issued assertion's subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// Identifier value.
    pub value: String,
    /// Format URI.
    pub format: String,
    /// Set to the IdP's entity ID on pairwise identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,
    /// Set to the recipient SP on pairwise identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// An unqualified identifier.
    #[must_use]
    pub fn new(value: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: format.into(),
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Scopes the identifier to the pair of issuing IdP and recipient SP.
    #[must_use]
    pub fn qualified_by(mut self, idp: impl Into<String>, sp: impl Into<String>) -> Self {
        self.name_qualifier = Some(idp.into());
        self.sp_name_qualifier = Some(sp.into());
        self
    }

    /// Whether the identifier is pairwise and therefore only meaningful to
    /// the SP it was issued for.
    #[must_use]
    pub fn is_pairwise(&self) -> bool {
        NameIdFormat::from_uri(&self.format) == Some(NameIdFormat::Persistent)
            && self.sp_name_qualifier.is_some()
    }
}

/// `<NameIDPolicy>` of an `AuthnRequest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// Requested format URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Audience the identifier must be scoped to, when it differs from the
    /// requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
    /// Whether a new identifier may be minted for the principal.
    #[serde(default)]
    pub allow_create: bool,
}

impl NameIdPolicy {
    /// Asks for `format`, allowing creation.
    #[must_use]
    pub fn new(format: NameIdFormat) -> Self {
        Self {
            format: Some(format.uri().to_owned()),
            sp_name_qualifier: None,
            allow_create: true,
        }
    }

    /// Asks for the identifier to be scoped to `qualifier`.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// The requested format, or `None` when the SP left the choice to the
    /// IdP.
    #[must_use]
    pub fn explicit_format(&self) -> Option<&str> {
        match self.format.as_deref() {
            Some(uri) if uri != NameIdFormat::Unspecified.uri() => Some(uri),
            _ => None,
        }
    }
}
