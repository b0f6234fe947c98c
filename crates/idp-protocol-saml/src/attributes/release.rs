//! Attribute release manager.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    AttributeProducer, AttributeReleaseVote, AttributeReleaseVoter, DefaultAttributeProducer,
    ReleaseContext, RequestedAttributesOnlyVoter,
};
use crate::error::{SamlError, SamlResult};
use crate::types::UserAttribute;

/// One vote cast during a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Attribute voted on.
    pub attribute: String,
    /// The vote.
    pub vote: AttributeReleaseVote,
    /// Name of the voter.
    pub voter: String,
}

/// Result of a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Attributes to put in the assertion, in production order.
    pub released: Vec<UserAttribute>,
    /// Names of produced attributes that were denied.
    pub denied: Vec<String>,
    /// Every vote cast.
    pub votes: Vec<VoteRecord>,
}

impl ReleaseOutcome {
    /// Returns the names of the released attributes.
    #[must_use]
    pub fn released_names(&self) -> Vec<String> {
        self.released.iter().map(|a| a.name.clone()).collect()
    }
}

/// Runs producers and voters over a subject's attributes.
#[derive(Debug, Clone)]
pub struct AttributeReleaseManager {
    producers: Vec<Arc<dyn AttributeProducer>>,
    voters: Vec<Arc<dyn AttributeReleaseVoter>>,
}

impl Default for AttributeReleaseManager {
    fn default() -> Self {
        Self::new()
            .with_producer(Arc::new(DefaultAttributeProducer))
            .with_voter(Arc::new(RequestedAttributesOnlyVoter))
    }
}

impl AttributeReleaseManager {
    /// Creates a manager without producers or voters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            producers: Vec::new(),
            voters: Vec::new(),
        }
    }

    /// Appends a producer. Producers run in registration order.
    #[must_use]
    pub fn with_producer(mut self, producer: Arc<dyn AttributeProducer>) -> Self {
        self.producers.push(producer);
        self
    }

    /// Appends a voter.
    #[must_use]
    pub fn with_voter(mut self, voter: Arc<dyn AttributeReleaseVoter>) -> Self {
        self.voters.push(voter);
        self
    }

    /// Releases the subject's attributes to the SP described by `ctx`.
    ///
    /// When several producers emit the same name, the first one wins.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingRequiredAttribute`] if a required attribute
    /// was not produced or was denied.
    pub fn release(
        &self,
        subject: &[UserAttribute],
        ctx: &ReleaseContext<'_>,
    ) -> SamlResult<ReleaseOutcome> {
        let mut candidates: Vec<UserAttribute> = Vec::new();
        for producer in &self.producers {
            for attribute in producer.produce(subject, ctx) {
                if attribute.values.is_empty() {
                    continue;
                }
                if !candidates.iter().any(|c| c.name == attribute.name) {
                    candidates.push(attribute);
                }
            }
        }

        let mut outcome = ReleaseOutcome::default();
        for attribute in &candidates {
            let mut denied = false;
            for voter in &self.voters {
                let vote = voter.vote(attribute, &candidates, ctx);
                outcome.votes.push(VoteRecord {
                    attribute: attribute.name.clone(),
                    vote,
                    voter: voter.name().to_string(),
                });
                if vote == AttributeReleaseVote::Deny {
                    denied = true;
                    break;
                }
            }
            if denied {
                outcome.denied.push(attribute.name.clone());
            } else {
                outcome.released.push(attribute.clone());
            }
        }

        if let Some(missing) = ctx
            .requested
            .iter()
            .filter(|r| r.required)
            .find(|r| !outcome.released.iter().any(|a| a.name == r.name))
        {
            tracing::warn!(
                sp = ctx.sp_entity_id,
                attribute = %missing.name,
                "Required attribute cannot be released"
            );
            return Err(SamlError::MissingRequiredAttribute(missing.name.clone()));
        }

        tracing::debug!(
            sp = ctx.sp_entity_id,
            released = outcome.released.len(),
            denied = outcome.denied.len(),
            "Attribute release decided"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeDenyListVoter, ReleaseAllAttributeProducer};
    use crate::types::{AttributeSource, RequestedAttribute};
    use std::collections::BTreeMap;

    #[derive(Debug)]
    struct Fixed(&'static str, AttributeReleaseVote);

    impl AttributeReleaseVoter for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn vote(&self, a: &UserAttribute, _: &[UserAttribute], _: &ReleaseContext<'_>) -> AttributeReleaseVote {
            if a.name == self.0 {
                self.1
            } else {
                AttributeReleaseVote::Abstain
            }
        }
    }

    #[derive(Debug)]
    struct Constant(Vec<UserAttribute>);

    impl AttributeProducer for Constant {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn produce(&self, _: &[UserAttribute], _: &ReleaseContext<'_>) -> Vec<UserAttribute> {
            self.0.clone()
        }
    }

    fn subject() -> Vec<UserAttribute> {
        vec![
            UserAttribute::single("given-name", "Anna"),
            UserAttribute::single("surname", "Svensson"),
            UserAttribute::single("mail", "anna@example.com"),
        ]
    }

    fn ctx(requested: &[RequestedAttribute]) -> ReleaseContext<'_> {
        ReleaseContext {
            sp_entity_id: "sp-1",
            entity_categories: &[],
            requested,
        }
    }

    #[test]
    fn released_iff_produced_and_not_denied() {
        let manager = AttributeReleaseManager::new()
            .with_producer(Arc::new(ReleaseAllAttributeProducer))
            .with_voter(Arc::new(Fixed("given-name", AttributeReleaseVote::Ok)))
            .with_voter(Arc::new(Fixed("surname", AttributeReleaseVote::Deny)))
            .with_voter(Arc::new(Fixed("surname", AttributeReleaseVote::Ok)));

        let outcome = manager.release(&subject(), &ctx(&[])).unwrap();
        // all-abstain (mail) and ok (given-name) are released; never-produced
        // names never appear
        assert_eq!(outcome.released_names(), ["given-name", "mail"]);
        assert_eq!(outcome.denied, ["surname"]);
    }

    #[test]
    fn single_deny_beats_any_number_of_oks() {
        let mut denied = BTreeMap::new();
        denied.insert("sp-1".to_string(), vec!["given-name".to_string()]);
        let manager = AttributeReleaseManager::new()
            .with_producer(Arc::new(ReleaseAllAttributeProducer))
            .with_voter(Arc::new(Fixed("given-name", AttributeReleaseVote::Ok)))
            .with_voter(Arc::new(Fixed("given-name", AttributeReleaseVote::Ok)))
            .with_voter(Arc::new(AttributeDenyListVoter::new(denied)));

        let outcome = manager.release(&subject(), &ctx(&[])).unwrap();
        assert!(!outcome.released_names().contains(&"given-name".to_string()));
    }

    #[test]
    fn first_producer_wins_on_duplicates() {
        let manager = AttributeReleaseManager::new()
            .with_producer(Arc::new(Constant(vec![UserAttribute::single("given-name", "First")])))
            .with_producer(Arc::new(ReleaseAllAttributeProducer));
        let outcome = manager.release(&subject(), &ctx(&[])).unwrap();
        assert_eq!(outcome.released[0], UserAttribute::single("given-name", "First"));
        assert_eq!(outcome.released.len(), 3);
    }

    #[test]
    fn missing_required_attribute_is_an_error() {
        let requested = [
            RequestedAttribute::new("given-name", true, AttributeSource::Request),
            RequestedAttribute::new("birth-date", true, AttributeSource::Metadata),
        ];
        let err = AttributeReleaseManager::default()
            .release(&subject(), &ctx(&requested))
            .unwrap_err();
        assert!(matches!(err, SamlError::MissingRequiredAttribute(name) if name == "birth-date"));
    }

    #[test]
    fn denied_required_attribute_is_missing() {
        let requested = [RequestedAttribute::new("given-name", true, AttributeSource::Request)];
        let manager = AttributeReleaseManager::default()
            .with_voter(Arc::new(Fixed("given-name", AttributeReleaseVote::Deny)));
        assert!(manager.release(&subject(), &ctx(&requested)).is_err());
    }

    #[test]
    fn default_manager_releases_requested_only() {
        let requested = [RequestedAttribute::new("given-name", true, AttributeSource::Request)];
        let outcome = AttributeReleaseManager::default()
            .release(&subject(), &ctx(&requested))
            .unwrap();
        assert_eq!(outcome.released, [UserAttribute::single("given-name", "Anna")]);
        assert!(outcome.denied.is_empty());
        assert_eq!(outcome.votes.len(), 1);
    }
}
