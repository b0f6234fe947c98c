//! Attribute producers.

use super::ReleaseContext;
use crate::types::{AttributeValue, UserAttribute};

/// Emits candidate attributes for a release.
pub trait AttributeProducer: Send + Sync + std::fmt::Debug {
    /// Producer name, for logs and vote records.
    fn name(&self) -> &'static str;

    /// Returns the candidates derived from the subject's raw attributes.
    fn produce(&self, subject: &[UserAttribute], ctx: &ReleaseContext<'_>) -> Vec<UserAttribute>;
}

/// Releases the raw attributes the SP requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAttributeProducer;

impl AttributeProducer for DefaultAttributeProducer {
    fn name(&self) -> &'static str {
        "default"
    }

    fn produce(&self, subject: &[UserAttribute], ctx: &ReleaseContext<'_>) -> Vec<UserAttribute> {
        subject
            .iter()
            .filter(|a| ctx.is_requested(&a.name))
            .cloned()
            .map(|mut a| {
                if a.friendly_name.is_none() {
                    a.friendly_name = ctx
                        .requested
                        .iter()
                        .find(|r| r.name == a.name)
                        .and_then(|r| r.friendly_name.clone());
                }
                a
            })
            .collect()
    }
}

/// Releases every raw attribute of the subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseAllAttributeProducer;

impl AttributeProducer for ReleaseAllAttributeProducer {
    fn name(&self) -> &'static str {
        "release-all"
    }

    fn produce(&self, subject: &[UserAttribute], _ctx: &ReleaseContext<'_>) -> Vec<UserAttribute> {
        subject.to_vec()
    }
}

/// ISO 3166-1 alpha-3 to alpha-2 pairs accepted on input.
const ALPHA3: &[(&str, &str)] = &[
    ("DNK", "DK"),
    ("FIN", "FI"),
    ("ISL", "IS"),
    ("NOR", "NO"),
    ("SWE", "SE"),
    ("DEU", "DE"),
    ("FRA", "FR"),
    ("GBR", "GB"),
    ("NLD", "NL"),
    ("USA", "US"),
];

/// Derives an ISO 3166-1 alpha-2 country code attribute from a raw
/// country attribute.
///
/// Alpha-2 input is upper-cased; known alpha-3 codes are mapped. Other values
/// produce nothing. The derived attribute is emitted only when `target` was
/// requested.
#[derive(Debug, Clone)]
pub struct CountryCodeAttributeProducer {
    source: String,
    target: String,
}

impl CountryCodeAttributeProducer {
    /// Creates a producer reading `source` and emitting `target`.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    fn normalize(raw: &str) -> Option<String> {
        let code = raw.trim().to_ascii_uppercase();
        match code.len() {
            2 if code.chars().all(|c| c.is_ascii_alphabetic()) => Some(code),
            3 => ALPHA3
                .iter()
                .find(|(alpha3, _)| *alpha3 == code)
                .map(|(_, alpha2)| (*alpha2).to_string()),
            _ => None,
        }
    }
}

impl AttributeProducer for CountryCodeAttributeProducer {
    fn name(&self) -> &'static str {
        "country-code"
    }

    fn produce(&self, subject: &[UserAttribute], ctx: &ReleaseContext<'_>) -> Vec<UserAttribute> {
        if !ctx.is_requested(&self.target) {
            return Vec::new();
        }
        subject
            .iter()
            .find(|a| a.name == self.source)
            .and_then(UserAttribute::first_str)
            .and_then(Self::normalize)
            .map(|code| vec![UserAttribute::new(&self.target, vec![AttributeValue::String(code)])])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeSource, RequestedAttribute};

    fn subject() -> Vec<UserAttribute> {
        vec![
            UserAttribute::single("given-name", "Anna"),
            UserAttribute::single("surname", "Svensson"),
            UserAttribute::single("country", "swe"),
        ]
    }

    fn requested(names: &[&str]) -> Vec<RequestedAttribute> {
        names
            .iter()
            .map(|n| RequestedAttribute::new(*n, false, AttributeSource::Request).with_friendly_name("fn"))
            .collect()
    }

    fn ctx(requested: &[RequestedAttribute]) -> ReleaseContext<'_> {
        ReleaseContext {
            sp_entity_id: "sp-1",
            entity_categories: &[],
            requested,
        }
    }

    #[test]
    fn default_producer_emits_requested_only() {
        let requested = requested(&["given-name", "mail"]);
        let produced = DefaultAttributeProducer.produce(&subject(), &ctx(&requested));
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].name, "given-name");
        assert_eq!(produced[0].friendly_name.as_deref(), Some("fn"));
    }

    #[test]
    fn release_all_emits_everything() {
        assert_eq!(ReleaseAllAttributeProducer.produce(&subject(), &ctx(&[])).len(), 3);
    }

    #[test]
    fn country_code_is_derived() {
        let producer = CountryCodeAttributeProducer::new("country", "c");
        let requested = requested(&["c"]);
        let produced = producer.produce(&subject(), &ctx(&requested));
        assert_eq!(produced, [UserAttribute::single("c", "SE")]);

        assert!(producer.produce(&subject(), &ctx(&[])).is_empty());
        assert_eq!(CountryCodeAttributeProducer::normalize(" fi "), Some("FI".to_string()));
        assert_eq!(CountryCodeAttributeProducer::normalize("XYZ"), None);
        assert_eq!(CountryCodeAttributeProducer::normalize("S1"), None);
    }
}
