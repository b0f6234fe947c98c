//! SSO session state handed back to the authentication layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserAttribute;

/// An SP that received an assertion from this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoParticipant {
    /// SP entity id.
    pub entity_id: String,
    /// Entity categories of the SP at the time of issuance.
    #[serde(default)]
    pub entity_categories: Vec<String>,
    /// Names of the attributes released to the SP.
    #[serde(default)]
    pub released_attributes: Vec<String>,
}

/// An established single sign-on session.
///
/// The engine does not store sessions; it receives the current one with each
/// request and returns the updated one with each successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsoSession {
    /// Subject identifier known to the IdP.
    pub subject_id: String,
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,
    /// Authentication context class achieved.
    pub authn_context_class_ref: String,
    /// Authority that performed the authentication, if delegated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticating_authority: Option<String>,
    /// Session index placed in issued assertions.
    pub session_index: String,
    /// Raw subject attributes from the authentication.
    #[serde(default)]
    pub attributes: Vec<UserAttribute>,
    /// SPs served from this session.
    #[serde(default)]
    pub participants: Vec<SsoParticipant>,
}

impl SsoSession {
    /// Returns how long ago the subject authenticated.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.authn_instant
    }

    /// Returns the raw attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&UserAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name == name && !a.values.is_empty())
    }

    /// Returns true if the session holds a value for `name`.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Returns the entity categories of every SP served so far.
    pub fn participant_categories(&self) -> impl Iterator<Item = &str> {
        self.participants
            .iter()
            .flat_map(|p| p.entity_categories.iter().map(String::as_str))
    }

    /// Records an SP served from this session, replacing an earlier entry
    /// for the same SP.
    pub fn record_participant(&mut self, participant: SsoParticipant) {
        self.participants
            .retain(|p| p.entity_id != participant.entity_id);
        self.participants.push(participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participants_are_recorded_once_per_sp() {
        let mut session = SsoSession {
            subject_id: "anna".into(),
            authn_instant: Utc::now(),
            authn_context_class_ref: "ctx".into(),
            authenticating_authority: None,
            session_index: "s".into(),
            attributes: vec![UserAttribute::single("given-name", "Anna"), UserAttribute::new("empty", vec![])],
            participants: Vec::new(),
        };
        let participant = |released: &str| SsoParticipant {
            entity_id: "sp-1".into(),
            entity_categories: vec!["cat".into()],
            released_attributes: vec![released.into()],
        };
        session.record_participant(participant("a"));
        session.record_participant(participant("b"));
        assert_eq!(session.participants.len(), 1);
        assert_eq!(session.participants[0].released_attributes, ["b"]);
        assert_eq!(session.participant_categories().collect::<Vec<_>>(), ["cat"]);
        assert!(session.has_attribute("given-name"));
        assert!(!session.has_attribute("empty"));
    }
}
