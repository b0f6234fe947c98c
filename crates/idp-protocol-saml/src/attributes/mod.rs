//! Attribute resolution and release.
//!
//! Resolution merges what an SP asks for (request extensions, metadata and
//! entity-category defaults) into one list. Release then runs in two phases:
//! producers emit candidate attributes for the authenticated subject, and
//! voters may veto individual candidates. A candidate is released iff it was
//! produced and no voter denied it.
//!
//! The principal selection of a request is extracted here as well, as
//! attributes naming the subject the SP expects.
//!
//! # NIST 800-53 Rev5: AC-21 (Information Sharing)
//!
//! Release decisions are made per SP; a single deny vote withholds an
//! attribute regardless of other votes.

mod principal_selection;
mod producer;
mod release;
mod resolver;
mod voter;

pub use principal_selection::*;
pub use producer::*;
pub use release::*;
pub use resolver::*;
pub use voter::*;

use crate::types::RequestedAttribute;

/// What producers and voters know about the recipient of a release.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseContext<'a> {
    /// Entity id of the receiving SP.
    pub sp_entity_id: &'a str,
    /// Entity categories of the receiving SP.
    pub entity_categories: &'a [String],
    /// The resolved attribute requests.
    pub requested: &'a [RequestedAttribute],
}

impl ReleaseContext<'_> {
    /// Returns true if `name` was requested.
    #[must_use]
    pub fn is_requested(&self, name: &str) -> bool {
        self.requested.iter().any(|r| r.name == name)
    }

    /// Returns true if the SP belongs to `category`.
    #[must_use]
    pub fn has_entity_category(&self, category: &str) -> bool {
        self.entity_categories.iter().any(|c| c == category)
    }
}
