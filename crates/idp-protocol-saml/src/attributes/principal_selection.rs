//! Principal selection.
//!
//! An SP that already knows who should log in names the principal by
//! attribute values in the request. They are handed to the authenticator
//! for pre-filling and compared against sessions before reuse.

use crate::types::{AttributeValue, AuthnRequest, MatchValue, UserAttribute};

/// Turns the principal selection of a request into user attributes.
pub trait PrincipalSelectionProcessor: Send + Sync + std::fmt::Debug {
    /// Returns the selected principal attributes; empty when the request
    /// names none.
    fn extract(&self, request: &AuthnRequest) -> Vec<UserAttribute>;
}

/// Maps every `MatchValue` with a value to a single-valued attribute.
///
/// Several values for the same name are merged into one multi-valued
/// attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrincipalSelectionProcessor;

impl DefaultPrincipalSelectionProcessor {
    fn usable(value: &MatchValue) -> bool {
        !value.name.is_empty() && !value.value.is_empty()
    }
}

impl PrincipalSelectionProcessor for DefaultPrincipalSelectionProcessor {
    fn extract(&self, request: &AuthnRequest) -> Vec<UserAttribute> {
        let mut selected: Vec<UserAttribute> = Vec::new();
        for value in request.principal_selection.iter().filter(|v| Self::usable(v)) {
            let attribute_value = AttributeValue::from(value.value.as_str());
            match selected.iter_mut().find(|a| a.name == value.name) {
                Some(existing) => existing.values.push(attribute_value),
                None => selected.push(UserAttribute::new(&value.name, vec![attribute_value])),
            }
        }
        selected
    }
}
