//! Ordered SSO voter evaluation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use idp_core::{IdpSettings, SsoDefaultPolicy};
use tracing::debug;

use super::{
    AuthnContextVoter, EntityCategoryVoter, NameIdFormatVoter, PrincipalSelectionVoter,
    RequiredAttributesVoter, SessionAgeVoter, SignServiceVoter, SsoSession, SsoVote, SsoVoter,
};
use crate::nameid::NameIdPolicyResolver;
use crate::validation::AuthnRequestContext;

/// Outcome of the voter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoDecision {
    /// Answer from the existing session.
    Reuse,
    /// Hand the subject to the external authenticator.
    Authenticate,
}

/// Evaluates SSO voters in registration order.
///
/// The first DENY forces authentication, the first OK grants reuse, and when
/// every voter abstains the configured default policy decides. Voters that
/// can only deny belong in front of voters that can grant.
#[derive(Debug, Clone)]
pub struct SsoVoterChain {
    voters: Vec<Arc<dyn SsoVoter>>,
    default_policy: SsoDefaultPolicy,
}

impl SsoVoterChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(default_policy: SsoDefaultPolicy) -> Self {
        Self {
            voters: Vec::new(),
            default_policy,
        }
    }

    /// Creates the standard chain:
    /// session age, sign service, principal selection, required attributes,
    /// entity category, NameID format, authentication context.
    #[must_use]
    pub fn standard(settings: &IdpSettings, name_ids: NameIdPolicyResolver) -> Self {
        Self::new(settings.sso.default_policy)
            .with_voter(Arc::new(SessionAgeVoter::new(settings.max_session_age())))
            .with_voter(Arc::new(SignServiceVoter))
            .with_voter(Arc::new(PrincipalSelectionVoter))
            .with_voter(Arc::new(RequiredAttributesVoter))
            .with_voter(Arc::new(EntityCategoryVoter::new(
                settings.sso.isolated_entity_categories.clone(),
            )))
            .with_voter(Arc::new(NameIdFormatVoter::new(name_ids)))
            .with_voter(Arc::new(AuthnContextVoter))
    }

    /// Appends a voter.
    #[must_use]
    pub fn with_voter(mut self, voter: Arc<dyn SsoVoter>) -> Self {
        self.voters.push(voter);
        self
    }

    /// Decides how to answer `ctx` given the subject's current session.
    #[must_use]
    pub fn decide(
        &self,
        ctx: &AuthnRequestContext,
        session: Option<&SsoSession>,
        now: DateTime<Utc>,
    ) -> SsoDecision {
        let Some(session) = session else {
            return SsoDecision::Authenticate;
        };
        if ctx.force_authn {
            debug!(request_id = %ctx.request_id, "ForceAuthn set, session not consulted");
            return SsoDecision::Authenticate;
        }

        for voter in &self.voters {
            match voter.vote(ctx, session, now) {
                SsoVote::Deny => {
                    debug!(request_id = %ctx.request_id, voter = voter.name(), "SSO denied");
                    return SsoDecision::Authenticate;
                }
                SsoVote::Ok => {
                    debug!(request_id = %ctx.request_id, voter = voter.name(), "SSO granted");
                    return SsoDecision::Reuse;
                }
                SsoVote::Abstain => {}
            }
        }

        debug!(
            request_id = %ctx.request_id,
            policy = ?self.default_policy,
            "All SSO voters abstained"
        );
        match self.default_policy {
            SsoDefaultPolicy::Reuse => SsoDecision::Reuse,
            SsoDefaultPolicy::Reauthenticate => SsoDecision::Authenticate,
        }
    }
}
