//! Requested attribute resolution.

use std::collections::HashSet;
use std::sync::Arc;

use idp_core::IdpSettings;

use crate::types::{AttributeSource, AuthnRequest, RequestedAttribute, ServiceProviderMetadata};

/// Merges the attribute requests of an SP into one ordered list.
///
/// Entries from the request come first, then the SP metadata, then the
/// defaults implied by the SP's entity categories. The first entry for a
/// name wins, so the request overrides metadata and metadata overrides
/// category defaults.
#[derive(Debug, Clone)]
pub struct RequestedAttributeResolver {
    settings: Arc<IdpSettings>,
}

impl RequestedAttributeResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(settings: Arc<IdpSettings>) -> Self {
        Self { settings }
    }

    /// Resolves the attribute requests for `request` from `sp`.
    #[must_use]
    pub fn resolve(
        &self,
        request: &AuthnRequest,
        sp: &ServiceProviderMetadata,
    ) -> Vec<RequestedAttribute> {
        let category_defaults = sp.entity_categories.iter().flat_map(|category| {
            self.settings
                .attributes
                .entity_category_attributes
                .get(category)
                .into_iter()
                .flatten()
                .map(|attr| {
                    let mut requested =
                        RequestedAttribute::new(&attr.name, attr.required, AttributeSource::EntityCategory);
                    requested.friendly_name = attr.friendly_name.clone();
                    requested
                })
        });

        let mut seen = HashSet::new();
        let resolved: Vec<RequestedAttribute> = request
            .requested_attributes
            .iter()
            .cloned()
            .map(|mut a| {
                a.source = AttributeSource::Request;
                a
            })
            .chain(sp.requested_attributes.iter().cloned().map(|mut a| {
                a.source = AttributeSource::Metadata;
                a
            }))
            .chain(category_defaults)
            .filter(|a| seen.insert(a.name.clone()))
            .collect();

        tracing::debug!(
            issuer = %request.issuer,
            count = resolved.len(),
            "Resolved requested attributes"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idp_core::config::EntityCategoryAttribute;

    const CATEGORY: &str = "http://id.example.com/ec/natural-person";

    fn resolver() -> RequestedAttributeResolver {
        let mut settings = IdpSettings::for_testing();
        settings.attributes.entity_category_attributes.insert(
            CATEGORY.to_string(),
            vec![
                EntityCategoryAttribute::new("given-name", Some("givenName"), false),
                EntityCategoryAttribute::new("surname", None, true),
                EntityCategoryAttribute::new("birth-date", None, false),
            ],
        );
        RequestedAttributeResolver::new(Arc::new(settings))
    }

    #[test]
    fn request_wins_over_metadata_wins_over_category() {
        let sp = ServiceProviderMetadata::new("sp-1")
            .with_entity_category(CATEGORY)
            .with_requested_attribute(RequestedAttribute::new("surname", false, AttributeSource::Metadata))
            .with_requested_attribute(RequestedAttribute::new("mail", false, AttributeSource::Metadata));
        let request = AuthnRequest::new("sp-1")
            .with_requested_attribute(RequestedAttribute::new("given-name", true, AttributeSource::Metadata));

        let resolved = resolver().resolve(&request, &sp);
        let summary: Vec<_> = resolved
            .iter()
            .map(|a| (a.name.as_str(), a.required, a.source))
            .collect();
        assert_eq!(
            summary,
            [
                ("given-name", true, AttributeSource::Request),
                ("surname", false, AttributeSource::Metadata),
                ("mail", false, AttributeSource::Metadata),
                ("birth-date", false, AttributeSource::EntityCategory),
            ]
        );
    }

    #[test]
    fn category_defaults_apply_without_other_sources() {
        let sp = ServiceProviderMetadata::new("sp-1").with_entity_category(CATEGORY);
        let resolved = resolver().resolve(&AuthnRequest::new("sp-1"), &sp);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].friendly_name.as_deref(), Some("givenName"));
        assert!(resolved[1].required);
    }

    #[test]
    fn nothing_requested() {
        let resolved = resolver().resolve(&AuthnRequest::new("sp-1"), &ServiceProviderMetadata::new("sp-1"));
        assert!(resolved.is_empty());
    }
}
