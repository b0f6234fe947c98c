//! Identity provider settings.
//!
//! Settings are plain structs built once at startup, either from struct
//! literals, from `IdpSettings::default()`, or from the environment via
//! [`IdpSettings::from_env`]. Nothing in the processing pipeline mutates them.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Persistent NameID format URI.
pub const NAMEID_FORMAT_PERSISTENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";
/// Transient NameID format URI.
pub const NAMEID_FORMAT_TRANSIENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";
/// Email address NameID format URI.
pub const NAMEID_FORMAT_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

/// Entity category through which an SP opts in to receive coordination numbers.
pub const CATEGORY_ACCEPTS_COORDINATION_NUMBER: &str =
    "http://id.swedenconnect.se/general-ec/1.0/accepts-coordination-number";

/// Top-level identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpSettings {
    /// The IdP entity identifier, used as assertion and response issuer.
    pub entity_id: String,

    /// Endpoint URLs at which this IdP receives authentication requests.
    pub sso_endpoints: Vec<String>,

    /// Allowed clock skew between IdP and SPs, in seconds.
    pub clock_skew_secs: i64,

    /// Maximum age of an inbound request, in seconds.
    pub max_message_age_secs: i64,

    /// Whether every authentication request must be signed.
    ///
    /// When false, an unsigned request is accepted from SPs whose metadata
    /// does not declare `AuthnRequestsSigned`.
    pub require_signed_requests: bool,

    /// Replay protection.
    pub replay: ReplaySettings,

    /// Assertion issuance.
    pub assertion: AssertionSettings,

    /// Single sign-on reuse.
    pub sso: SsoSettings,

    /// External authentication.
    pub authn: AuthnSettings,

    /// NameID negotiation.
    pub name_id: NameIdSettings,

    /// Assertion encryption.
    pub encryption: EncryptionSettings,

    /// Attribute resolution and release.
    pub attributes: AttributeSettings,
}

/// Replay cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// How long an accepted message identifier is remembered, in seconds.
    pub window_secs: i64,
}

/// Assertion issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionSettings {
    /// Assertion validity after issuance, in seconds.
    pub lifetime_secs: i64,

    /// How far `NotBefore` is backdated, in seconds.
    pub not_before_skew_secs: i64,

    /// Whether assertions must be encrypted for every SP.
    pub encrypt_assertions: bool,
}

/// Outcome of an SSO voter chain in which every voter abstained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SsoDefaultPolicy {
    /// Reuse the existing session.
    Reuse,
    /// Require the user to authenticate again.
    #[default]
    Reauthenticate,
}

impl FromStr for SsoDefaultPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" => Ok(Self::Reuse),
            "reauthenticate" => Ok(Self::Reauthenticate),
            other => Err(Error::Config(format!("unknown SSO default policy '{other}'"))),
        }
    }
}

/// Single sign-on settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoSettings {
    /// Decision taken when every voter abstains.
    pub default_policy: SsoDefaultPolicy,

    /// Sessions older than this are never reused, in seconds.
    pub max_session_age_secs: i64,

    /// Entity categories whose sessions may only be reused by SPs declaring
    /// the same category.
    pub isolated_entity_categories: Vec<String>,
}

/// External authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthnSettings {
    /// Authentication context classes this IdP can deliver, in preference order.
    pub supported_authn_contexts: Vec<String>,

    /// How long a suspended request may wait for the external authenticator,
    /// in seconds.
    pub suspension_timeout_secs: i64,

    /// Additional time a timed-out suspension is kept so that a late resume
    /// can still be answered with an error response, in seconds.
    pub suspension_grace_secs: i64,
}

/// NameID negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NameIdSettings {
    /// Format used when the SP expresses no usable preference.
    pub default_format: String,

    /// Formats this IdP is willing to issue.
    pub supported_formats: Vec<String>,

    /// Subject attribute carrying the value for pass-through formats.
    pub attribute_sources: BTreeMap<String, String>,
}

/// Assertion encryption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    /// Allowed block encryption algorithm URIs, in IdP preference order.
    pub allowed_data_algorithms: Vec<String>,

    /// Allowed key transport algorithm URIs, in IdP preference order.
    pub allowed_key_transport_algorithms: Vec<String>,
}

/// Attribute implicitly requested by membership in an entity category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCategoryAttribute {
    /// Attribute name.
    pub name: String,
    /// Human-readable attribute name.
    pub friendly_name: Option<String>,
    /// Whether the category makes the attribute mandatory.
    pub required: bool,
}

impl EntityCategoryAttribute {
    /// Creates an entity category attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, friendly_name: Option<&str>, required: bool) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.map(String::from),
            required,
        }
    }
}

/// Attribute resolution and release settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AttributeSettings {
    /// Attributes implied by each entity category URI.
    pub entity_category_attributes: BTreeMap<String, Vec<EntityCategoryAttribute>>,

    /// Attribute names that must never be released to a given SP entity id.
    pub denied_attributes: BTreeMap<String, Vec<String>>,

    /// Entity category by which an SP accepts coordination numbers.
    pub coordination_number_category: Option<String>,
}

impl Default for IdpSettings {
    fn default() -> Self {
        Self {
            entity_id: "https://idp.example.com/idp".to_string(),
            sso_endpoints: vec![
                "https://idp.example.com/saml2/post".to_string(),
                "https://idp.example.com/saml2/redirect".to_string(),
            ],
            clock_skew_secs: 30,
            max_message_age_secs: 180,
            require_signed_requests: true,
            replay: ReplaySettings::default(),
            assertion: AssertionSettings::default(),
            sso: SsoSettings::default(),
            authn: AuthnSettings::default(),
            name_id: NameIdSettings::default(),
            encryption: EncryptionSettings::default(),
            attributes: AttributeSettings::default(),
        }
    }
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self { window_secs: 300 }
    }
}

impl Default for AssertionSettings {
    fn default() -> Self {
        Self {
            lifetime_secs: 300,
            not_before_skew_secs: 10,
            encrypt_assertions: true,
        }
    }
}

impl Default for SsoSettings {
    fn default() -> Self {
        Self {
            default_policy: SsoDefaultPolicy::Reauthenticate,
            max_session_age_secs: 3600,
            isolated_entity_categories: Vec::new(),
        }
    }
}

impl Default for AuthnSettings {
    fn default() -> Self {
        Self {
            supported_authn_contexts: vec![
                "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport".to_string(),
                "urn:oasis:names:tc:SAML:2.0:ac:classes:X509".to_string(),
            ],
            suspension_timeout_secs: 600,
            suspension_grace_secs: 300,
        }
    }
}

impl Default for NameIdSettings {
    fn default() -> Self {
        let mut attribute_sources = BTreeMap::new();
        attribute_sources.insert(
            NAMEID_FORMAT_EMAIL.to_string(),
            "urn:oid:0.9.2342.19200300.100.1.3".to_string(),
        );
        Self {
            default_format: NAMEID_FORMAT_PERSISTENT.to_string(),
            supported_formats: vec![
                NAMEID_FORMAT_PERSISTENT.to_string(),
                NAMEID_FORMAT_TRANSIENT.to_string(),
            ],
            attribute_sources,
        }
    }
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            allowed_data_algorithms: vec![
                "http://www.w3.org/2009/xmlenc11#aes256-gcm".to_string(),
                "http://www.w3.org/2009/xmlenc11#aes128-gcm".to_string(),
            ],
            allowed_key_transport_algorithms: vec![
                "http://www.w3.org/2009/xmlenc11#rsa-oaep".to_string(),
                "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p".to_string(),
            ],
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect()
    })
}

impl IdpSettings {
    /// Loads settings from environment variables on top of the defaults.
    ///
    /// A `.env` file in the working directory is honoured. Recognised
    /// variables are `IDP_ENTITY_ID`, `IDP_SSO_ENDPOINTS`,
    /// `IDP_CLOCK_SKEW_SECS`, `IDP_MAX_MESSAGE_AGE_SECS`,
    /// `IDP_REQUIRE_SIGNED_REQUESTS`, `IDP_REPLAY_WINDOW_SECS`,
    /// `IDP_ASSERTION_LIFETIME_SECS`, `IDP_ENCRYPT_ASSERTIONS`,
    /// `IDP_SSO_DEFAULT_POLICY`, `IDP_SSO_MAX_SESSION_AGE_SECS`,
    /// `IDP_AUTHN_CONTEXTS`, `IDP_SUSPENSION_TIMEOUT_SECS`,
    /// `IDP_NAMEID_DEFAULT_FORMAT` and `IDP_NAMEID_FORMATS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is present but malformed, or
    /// if the resulting settings fail [`IdpSettings::validate`].
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut settings = Self::default();

        if let Ok(entity_id) = std::env::var("IDP_ENTITY_ID") {
            settings.entity_id = entity_id;
        }
        if let Some(endpoints) = env_list("IDP_SSO_ENDPOINTS") {
            settings.sso_endpoints = endpoints;
        }
        if let Some(v) = env_parse("IDP_CLOCK_SKEW_SECS")? {
            settings.clock_skew_secs = v;
        }
        if let Some(v) = env_parse("IDP_MAX_MESSAGE_AGE_SECS")? {
            settings.max_message_age_secs = v;
        }
        if let Some(v) = env_parse("IDP_REQUIRE_SIGNED_REQUESTS")? {
            settings.require_signed_requests = v;
        }
        if let Some(v) = env_parse("IDP_REPLAY_WINDOW_SECS")? {
            settings.replay.window_secs = v;
        }
        if let Some(v) = env_parse("IDP_ASSERTION_LIFETIME_SECS")? {
            settings.assertion.lifetime_secs = v;
        }
        if let Some(v) = env_parse("IDP_ENCRYPT_ASSERTIONS")? {
            settings.assertion.encrypt_assertions = v;
        }
        if let Some(v) = env_parse("IDP_SSO_DEFAULT_POLICY")? {
            settings.sso.default_policy = v;
        }
        if let Some(v) = env_parse("IDP_SSO_MAX_SESSION_AGE_SECS")? {
            settings.sso.max_session_age_secs = v;
        }
        if let Some(contexts) = env_list("IDP_AUTHN_CONTEXTS") {
            settings.authn.supported_authn_contexts = contexts;
        }
        if let Some(v) = env_parse("IDP_SUSPENSION_TIMEOUT_SECS")? {
            settings.authn.suspension_timeout_secs = v;
        }
        if let Ok(format) = std::env::var("IDP_NAMEID_DEFAULT_FORMAT") {
            settings.name_id.default_format = format;
        }
        if let Some(formats) = env_list("IDP_NAMEID_FORMATS") {
            settings.name_id.supported_formats = formats;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Creates settings for testing.
    ///
    /// Identical to the defaults except that the entity id and endpoint are
    /// fixed test values.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            entity_id: "https://idp.test.example/idp".to_string(),
            sso_endpoints: vec!["https://idp.test.example/saml2/sso".to_string()],
            ..Self::default()
        }
    }

    /// Checks the settings for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.trim().is_empty() {
            return Err(Error::Config("entity id must not be empty".into()));
        }
        if self.sso_endpoints.is_empty() {
            return Err(Error::Config("at least one SSO endpoint is required".into()));
        }
        if self.clock_skew_secs < 0 || self.max_message_age_secs <= 0 {
            return Err(Error::Config("message age limits must be positive".into()));
        }
        if self.replay.window_secs < self.max_message_age_secs + self.clock_skew_secs {
            return Err(Error::Config(
                "replay window must cover the maximum message age plus clock skew".into(),
            ));
        }
        if self.assertion.lifetime_secs <= 0 {
            return Err(Error::Config("assertion lifetime must be positive".into()));
        }
        if !self
            .name_id
            .supported_formats
            .contains(&self.name_id.default_format)
        {
            return Err(Error::Config(format!(
                "default NameID format {} is not among the supported formats",
                self.name_id.default_format
            )));
        }
        if self.encryption.allowed_data_algorithms.is_empty()
            || self.encryption.allowed_key_transport_algorithms.is_empty()
        {
            return Err(Error::Config("encryption algorithm lists must not be empty".into()));
        }
        if self.authn.suspension_timeout_secs <= 0 {
            return Err(Error::Config("suspension timeout must be positive".into()));
        }
        Ok(())
    }

    /// Returns the allowed clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::seconds(self.clock_skew_secs)
    }

    /// Returns the maximum accepted message age.
    #[must_use]
    pub fn max_message_age(&self) -> Duration {
        Duration::seconds(self.max_message_age_secs)
    }

    /// Returns the replay window.
    #[must_use]
    pub fn replay_window(&self) -> Duration {
        Duration::seconds(self.replay.window_secs)
    }

    /// Returns the assertion lifetime.
    #[must_use]
    pub fn assertion_lifetime(&self) -> Duration {
        Duration::seconds(self.assertion.lifetime_secs)
    }

    /// Returns how far assertion validity is backdated.
    #[must_use]
    pub fn not_before_skew(&self) -> Duration {
        Duration::seconds(self.assertion.not_before_skew_secs)
    }

    /// Returns the maximum age of a reusable SSO session.
    #[must_use]
    pub fn max_session_age(&self) -> Duration {
        Duration::seconds(self.sso.max_session_age_secs)
    }

    /// Returns the suspension timeout.
    #[must_use]
    pub fn suspension_timeout(&self) -> Duration {
        Duration::seconds(self.authn.suspension_timeout_secs)
    }

    /// Returns the total time a suspended request is retained.
    #[must_use]
    pub fn suspension_retention(&self) -> Duration {
        Duration::seconds(self.authn.suspension_timeout_secs + self.authn.suspension_grace_secs)
    }
}
