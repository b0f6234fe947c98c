//! SSO voters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::SsoSession;
use crate::nameid::NameIdPolicyResolver;
use crate::validation::AuthnRequestContext;

/// A voter's opinion on reusing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SsoVote {
    /// The session may be reused.
    Ok,
    /// The subject must authenticate again.
    Deny,
    /// No opinion.
    Abstain,
}

/// Decides whether an existing session may answer a request.
pub trait SsoVoter: Send + Sync + std::fmt::Debug {
    /// Voter name used in logs.
    fn name(&self) -> &'static str;

    /// Votes on reusing `session` for the request.
    fn vote(&self, ctx: &AuthnRequestContext, session: &SsoSession, now: DateTime<Utc>) -> SsoVote;
}

/// Denies sessions older than the configured maximum.
#[derive(Debug, Clone)]
pub struct SessionAgeVoter {
    max_age: Duration,
}

impl SessionAgeVoter {
    /// Creates the voter.
    #[must_use]
    pub const fn new(max_age: Duration) -> Self {
        Self { max_age }
    }
}

impl SsoVoter for SessionAgeVoter {
    fn name(&self) -> &'static str {
        "session-age"
    }

    fn vote(&self, _ctx: &AuthnRequestContext, session: &SsoSession, now: DateTime<Utc>) -> SsoVote {
        if session.age(now) > self.max_age {
            SsoVote::Deny
        } else {
            SsoVote::Abstain
        }
    }
}

/// Denies sessions lacking a value for a required attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredAttributesVoter;

impl SsoVoter for RequiredAttributesVoter {
    fn name(&self) -> &'static str {
        "required-attributes"
    }

    fn vote(&self, ctx: &AuthnRequestContext, session: &SsoSession, _now: DateTime<Utc>) -> SsoVote {
        if ctx
            .required_attributes()
            .into_iter()
            .all(|name| session.has_attribute(name))
        {
            SsoVote::Abstain
        } else {
            SsoVote::Deny
        }
    }
}

/// Keeps sessions of isolated entity categories within their category.
///
/// A session that served an SP of an isolated category may only be reused by
/// SPs of the same category.
#[derive(Debug, Clone, Default)]
pub struct EntityCategoryVoter {
    isolated: Vec<String>,
}

impl EntityCategoryVoter {
    /// Creates the voter.
    #[must_use]
    pub fn new(isolated: Vec<String>) -> Self {
        Self { isolated }
    }
}

impl SsoVoter for EntityCategoryVoter {
    fn name(&self) -> &'static str {
        "entity-category"
    }

    fn vote(&self, ctx: &AuthnRequestContext, session: &SsoSession, _now: DateTime<Utc>) -> SsoVote {
        let violated = session
            .participant_categories()
            .filter(|c| self.isolated.iter().any(|i| i == *c))
            .any(|c| !ctx.entity_categories.iter().any(|e| e == c));
        if violated {
            SsoVote::Deny
        } else {
            SsoVote::Abstain
        }
    }
}

/// Denies sessions that cannot produce the negotiated NameID.
#[derive(Debug, Clone)]
pub struct NameIdFormatVoter {
    resolver: NameIdPolicyResolver,
}

impl NameIdFormatVoter {
    /// Creates the voter.
    #[must_use]
    pub const fn new(resolver: NameIdPolicyResolver) -> Self {
        Self { resolver }
    }
}

impl SsoVoter for NameIdFormatVoter {
    fn name(&self) -> &'static str {
        "nameid-format"
    }

    fn vote(&self, ctx: &AuthnRequestContext, session: &SsoSession, _now: DateTime<Utc>) -> SsoVote {
        match self.resolver.generator(&ctx.name_id_format) {
            Ok(generator) => match generator.source_attribute() {
                Some(attribute) if !session.has_attribute(attribute) => SsoVote::Deny,
                _ => SsoVote::Abstain,
            },
            Err(_) => SsoVote::Deny,
        }
    }
}

/// Votes on the authentication context class of the session.
///
/// Only requests naming classes explicitly get an opinion.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthnContextVoter;

impl SsoVoter for AuthnContextVoter {
    fn name(&self) -> &'static str {
        "authn-context"
    }

    fn vote(&self, ctx: &AuthnRequestContext, session: &SsoSession, _now: DateTime<Utc>) -> SsoVote {
        if !ctx.authn_context_requested {
            SsoVote::Abstain
        } else if ctx.accepts_context(&session.authn_context_class_ref) {
            SsoVote::Ok
        } else {
            SsoVote::Deny
        }
    }
}

/// Denies sessions of another principal than the one the SP selected.
///
/// Each selected attribute the session also holds must carry one of the
/// selected values. Attributes the session lacks are not held against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalSelectionVoter;

impl SsoVoter for PrincipalSelectionVoter {
    fn name(&self) -> &'static str {
        "principal-selection"
    }

    fn vote(&self, ctx: &AuthnRequestContext, session: &SsoSession, _now: DateTime<Utc>) -> SsoVote {
        let mismatch = ctx.principal_selection.iter().any(|selected| {
            session.attribute(&selected.name).is_some_and(|held| {
                !selected
                    .values
                    .iter()
                    .any(|want| held.values.iter().any(|v| v.as_text() == want.as_text()))
            })
        });
        if mismatch {
            SsoVote::Deny
        } else {
            SsoVote::Abstain
        }
    }
}

/// Signature services always get a fresh authentication.
///
/// A signature is an act of will; an earlier login does not express it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignServiceVoter;

impl SsoVoter for SignServiceVoter {
    fn name(&self) -> &'static str {
        "sign-service"
    }

    fn vote(&self, ctx: &AuthnRequestContext, _session: &SsoSession, _now: DateTime<Utc>) -> SsoVote {
        if ctx.is_signature_service() {
            SsoVote::Deny
        } else {
            SsoVote::Abstain
        }
    }
}
