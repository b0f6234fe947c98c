//! Attribute release voters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ReleaseContext;
use crate::types::UserAttribute;

/// Swedish personal identity number.
pub const PERSONAL_IDENTITY_NUMBER: &str = "urn:oid:1.2.752.29.4.13";

/// Wildcard key of the deny list matching every SP.
pub const ANY_SP: &str = "*";

/// A release vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeReleaseVote {
    /// Include the attribute.
    Ok,
    /// Withhold the attribute. Final.
    Deny,
    /// No opinion.
    Abstain,
}

/// Decides whether individual candidates may be released.
pub trait AttributeReleaseVoter: Send + Sync + std::fmt::Debug {
    /// Voter name, for logs and vote records.
    fn name(&self) -> &'static str;

    /// Votes on `attribute`, seeing every candidate of the release.
    fn vote(
        &self,
        attribute: &UserAttribute,
        candidates: &[UserAttribute],
        ctx: &ReleaseContext<'_>,
    ) -> AttributeReleaseVote;
}

/// Allows requested attributes and denies everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestedAttributesOnlyVoter;

impl AttributeReleaseVoter for RequestedAttributesOnlyVoter {
    fn name(&self) -> &'static str {
        "requested-only"
    }

    fn vote(
        &self,
        attribute: &UserAttribute,
        _candidates: &[UserAttribute],
        ctx: &ReleaseContext<'_>,
    ) -> AttributeReleaseVote {
        if ctx.is_requested(&attribute.name) {
            AttributeReleaseVote::Ok
        } else {
            AttributeReleaseVote::Deny
        }
    }
}

/// Denies attributes configured as withheld from an SP.
///
/// Keys are SP entity ids, or [`ANY_SP`] for all SPs.
#[derive(Debug, Clone, Default)]
pub struct AttributeDenyListVoter {
    denied: BTreeMap<String, Vec<String>>,
}

impl AttributeDenyListVoter {
    /// Creates a voter over the given deny list.
    #[must_use]
    pub fn new(denied: BTreeMap<String, Vec<String>>) -> Self {
        Self { denied }
    }

    fn denies(&self, key: &str, attribute: &str) -> bool {
        self.denied
            .get(key)
            .is_some_and(|names| names.iter().any(|n| n == attribute))
    }
}

impl AttributeReleaseVoter for AttributeDenyListVoter {
    fn name(&self) -> &'static str {
        "deny-list"
    }

    fn vote(
        &self,
        attribute: &UserAttribute,
        _candidates: &[UserAttribute],
        ctx: &ReleaseContext<'_>,
    ) -> AttributeReleaseVote {
        if self.denies(ctx.sp_entity_id, &attribute.name) || self.denies(ANY_SP, &attribute.name) {
            AttributeReleaseVote::Deny
        } else {
            AttributeReleaseVote::Abstain
        }
    }
}

/// Withholds coordination numbers from SPs that have not opted in.
///
/// A coordination number is a personal identity number whose day of birth is
/// offset by 60.
#[derive(Debug, Clone)]
pub struct CoordinationNumberVoter {
    category: String,
}

impl CoordinationNumberVoter {
    /// Creates a voter; SPs in `category` may receive coordination numbers.
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }

    fn is_coordination_number(id: &str) -> bool {
        id.len() == 12
            && id.chars().all(|c| c.is_ascii_digit())
            && id[6..8].parse::<u8>().is_ok_and(|day| day >= 61)
    }
}

impl AttributeReleaseVoter for CoordinationNumberVoter {
    fn name(&self) -> &'static str {
        "coordination-number"
    }

    fn vote(
        &self,
        attribute: &UserAttribute,
        _candidates: &[UserAttribute],
        ctx: &ReleaseContext<'_>,
    ) -> AttributeReleaseVote {
        if attribute.name != PERSONAL_IDENTITY_NUMBER {
            return AttributeReleaseVote::Abstain;
        }
        match attribute.first_str() {
            None => AttributeReleaseVote::Deny,
            Some(id) if Self::is_coordination_number(id) => {
                if ctx.has_entity_category(&self.category) {
                    AttributeReleaseVote::Ok
                } else {
                    tracing::info!(
                        sp = ctx.sp_entity_id,
                        category = %self.category,
                        "Withholding coordination number from SP that has not opted in"
                    );
                    AttributeReleaseVote::Deny
                }
            }
            Some(_) => AttributeReleaseVote::Abstain,
        }
    }
}
