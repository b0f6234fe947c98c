//! Shared fixtures for unit tests.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use idp_core::IdpSettings;
use idp_crypto::{RsaDecryptionKey, RsaSigningKey};

use crate::sso::SsoSession;
use crate::types::{authn_context_classes, NameIdFormat, SamlBinding, UserAttribute};
use crate::validation::AuthnRequestContext;

pub static IDP_KEY: LazyLock<Arc<RsaSigningKey>> =
    LazyLock::new(|| Arc::new(RsaSigningKey::generate().expect("key generation")));

pub static SP_ENCRYPTION_KEY: LazyLock<RsaDecryptionKey> =
    LazyLock::new(|| RsaDecryptionKey::generate().expect("key generation"));

/// A validated request from `https://sp-1.example.com` without explicit
/// requirements.
pub fn request_context() -> AuthnRequestContext {
    let now = Utc::now();
    AuthnRequestContext {
        request_id: "_req-1".into(),
        sp_entity_id: "https://sp-1.example.com".into(),
        issue_instant: now,
        received_at: now,
        acs_url: "https://sp-1.example.com/acs".into(),
        binding: SamlBinding::HttpPost,
        relay_state: None,
        name_id_format: NameIdFormat::Persistent.uri().into(),
        sp_name_qualifier: None,
        allow_create: true,
        authn_contexts: IdpSettings::for_testing().authn.supported_authn_contexts,
        authn_context_requested: false,
        force_authn: false,
        is_passive: false,
        requested_attributes: Vec::new(),
        entity_categories: Vec::new(),
        signed: true,
        subject_address: None,
        principal_selection: Vec::new(),
        sign_message: None,
    }
}

/// A password session for `anna` holding `given-name`.
pub fn session(authn_instant: DateTime<Utc>) -> SsoSession {
    SsoSession {
        subject_id: "anna".into(),
        authn_instant,
        authn_context_class_ref: authn_context_classes::PASSWORD_PROTECTED_TRANSPORT.into(),
        authenticating_authority: None,
        session_index: "_s1".into(),
        attributes: vec![UserAttribute::single("given-name", "Anna")],
        participants: Vec::new(),
    }
}
