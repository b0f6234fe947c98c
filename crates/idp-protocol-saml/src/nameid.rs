//! NameID generation.
//!
//! A [`NameIdPolicyResolver`] picks the format to issue for a request from
//! the request's `NameIDPolicy`, the SP's declared formats and the IdP
//! configuration, and hands back a [`NameIdGenerator`] for it.
//!
//! - persistent identifiers are a keyed digest over (SP, IdP, subject): stable
//!   for one SP, unlinkable across SPs
//! - transient identifiers are fresh random values for every assertion
//! - attribute based formats pass a user attribute through after checking it
//!   has the shape the format promises
//!
//! # NIST 800-53 Rev5: IA-4 (Identifier Management)
//!
//! Pairwise persistent identifiers keep one SP from correlating a user with
//! another SP's view of the same user.

use std::sync::Arc;

use base64::Engine;
use idp_core::IdpSettings;
use idp_crypto::hmac_sha256;

use crate::error::{SamlError, SamlResult};
use crate::types::{NameId, NameIdFormat, NameIdPolicy, ServiceProviderMetadata, UserAttribute};

/// Strategy producing the NameID of an assertion.
#[derive(Clone, PartialEq, Eq)]
pub enum NameIdGenerator {
    /// Pairwise stable identifier.
    Persistent {
        /// HMAC key.
        secret: Arc<[u8]>,
    },
    /// Random single-use identifier.
    Transient,
    /// A user attribute passed through as the identifier.
    Attribute {
        /// NameID format URI.
        format: String,
        /// Name of the source attribute.
        attribute: String,
    },
}

impl std::fmt::Debug for NameIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistent { .. } => f.write_str("Persistent"),
            Self::Transient => f.write_str("Transient"),
            Self::Attribute { format, attribute } => f
                .debug_struct("Attribute")
                .field("format", format)
                .field("attribute", attribute)
                .finish(),
        }
    }
}

impl NameIdGenerator {
    /// Returns the format URI this generator issues.
    #[must_use]
    pub fn format(&self) -> &str {
        match self {
            Self::Persistent { .. } => NameIdFormat::Persistent.uri(),
            Self::Transient => NameIdFormat::Transient.uri(),
            Self::Attribute { format, .. } => format,
        }
    }

    /// Returns the attribute a subject must carry for this generator, if any.
    #[must_use]
    pub fn source_attribute(&self) -> Option<&str> {
        match self {
            Self::Attribute { attribute, .. } => Some(attribute),
            _ => None,
        }
    }

    /// Produces the NameID for `subject_id` as seen by `sp_entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedNameIdFormat`] if an attribute based
    /// format cannot be served from the subject's attributes.
    pub fn generate(
        &self,
        subject_id: &str,
        attributes: &[UserAttribute],
        idp_entity_id: &str,
        sp_entity_id: &str,
    ) -> SamlResult<NameId> {
        match self {
            Self::Persistent { secret } => {
                let input = pairwise_input(sp_entity_id, idp_entity_id, subject_id);
                let value =
                    base64::engine::general_purpose::STANDARD.encode(hmac_sha256(secret, &input));
                Ok(NameId::new(value, self.format()).qualified_by(idp_entity_id, sp_entity_id))
            }
            Self::Transient => Ok(NameId::new(
                idp_crypto::random::random_base64url(32),
                self.format(),
            )),
            Self::Attribute { format, attribute } => {
                let value = attributes
                    .iter()
                    .find(|a| &a.name == attribute)
                    .and_then(|a| match a.values.as_slice() {
                        [single] => Some(single.as_text()),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        SamlError::UnsupportedNameIdFormat(format!(
                            "{format} requires a single-valued '{attribute}' attribute"
                        ))
                    })?;
                check_shape(format, &value)?;
                Ok(NameId::new(value, format.clone()))
            }
        }
    }
}

/// HMAC input for a persistent identifier. Fields are NUL separated, a byte
/// no entity ID or subject ID contains, so shifting text between them
/// changes the input.
fn pairwise_input(sp_entity_id: &str, idp_entity_id: &str, subject_id: &str) -> Vec<u8> {
    let mut input =
        Vec::with_capacity(sp_entity_id.len() + idp_entity_id.len() + subject_id.len() + 2);
    for (i, field) in [sp_entity_id, idp_entity_id, subject_id].into_iter().enumerate() {
        if i > 0 {
            input.push(0);
        }
        input.extend_from_slice(field.as_bytes());
    }
    input
}

fn check_shape(format: &str, value: &str) -> SamlResult<()> {
    let valid = match NameIdFormat::from_uri(format) {
        Some(NameIdFormat::Email) => {
            let mut parts = value.split('@');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
            ) && !value.chars().any(char::is_whitespace)
        }
        Some(NameIdFormat::X509SubjectName) => value.contains('='),
        _ => !value.trim().is_empty(),
    };
    if valid {
        Ok(())
    } else {
        Err(SamlError::UnsupportedNameIdFormat(format!(
            "attribute value is not a valid {format} identifier"
        )))
    }
}

/// Negotiates the NameID format of a request.
#[derive(Clone)]
pub struct NameIdPolicyResolver {
    settings: Arc<IdpSettings>,
    secret: Arc<[u8]>,
}

impl std::fmt::Debug for NameIdPolicyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameIdPolicyResolver").finish_non_exhaustive()
    }
}

impl NameIdPolicyResolver {
    /// Creates a resolver. `secret` keys persistent identifiers.
    #[must_use]
    pub fn new(settings: Arc<IdpSettings>, secret: impl Into<Arc<[u8]>>) -> Self {
        Self {
            settings,
            secret: secret.into(),
        }
    }

    /// Selects the generator for a request.
    ///
    /// An explicit format in the request must be supported by the IdP and, if
    /// the SP declares formats, by the SP. Without one, the first SP format
    /// the IdP supports wins, then the IdP default.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedNameIdFormat`] if no acceptable format
    /// exists.
    pub fn select(
        &self,
        policy: Option<&NameIdPolicy>,
        sp: &ServiceProviderMetadata,
    ) -> SamlResult<NameIdGenerator> {
        let supported = &self.settings.name_id.supported_formats;

        if let Some(requested) = policy.and_then(NameIdPolicy::explicit_format) {
            let idp_ok = supported.iter().any(|f| f == requested);
            let sp_ok = sp.name_id_formats.is_empty()
                || sp.name_id_formats.iter().any(|f| f == requested);
            if !(idp_ok && sp_ok) {
                return Err(SamlError::UnsupportedNameIdFormat(requested.to_string()));
            }
            return self.generator(requested);
        }

        let format = sp
            .name_id_formats
            .iter()
            .find(|f| supported.contains(f))
            .unwrap_or(&self.settings.name_id.default_format);
        self.generator(format)
    }

    /// Returns the generator for a format URI.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedNameIdFormat`] for formats that are
    /// neither persistent, transient nor backed by a configured attribute.
    pub fn generator(&self, format: &str) -> SamlResult<NameIdGenerator> {
        match NameIdFormat::from_uri(format) {
            Some(NameIdFormat::Persistent) => Ok(NameIdGenerator::Persistent {
                secret: self.secret.clone(),
            }),
            Some(NameIdFormat::Transient) => Ok(NameIdGenerator::Transient),
            _ => self
                .settings
                .name_id
                .attribute_sources
                .get(format)
                .map(|attribute| NameIdGenerator::Attribute {
                    format: format.to_string(),
                    attribute: attribute.clone(),
                })
                .ok_or_else(|| SamlError::UnsupportedNameIdFormat(format.to_string())),
        }
    }
}
