//! Common test utilities and fixtures.

use std::sync::{Arc, LazyLock};

use anyhow::{anyhow, bail};
use chrono::{DateTime, Utc};
use idp_core::{AuditPublisher, IdpSettings, MemoryAuditHandler};
use idp_crypto::{RsaDecryptionKey, RsaSigningKey};
use idp_protocol_saml::authn::AuthenticationHandoff;
use idp_protocol_saml::encryption::decrypt_assertion;
use idp_protocol_saml::signature::XmlSigner;
use idp_protocol_saml::xml::{parse_encrypted_assertion, write_authn_request};
use idp_protocol_saml::{
    AcsEndpoint, AttributeSource, AuthenticatedSubject, AuthnRequest, EncryptionCredential,
    IdentityProvider, IdpCredentials, InMemoryMetadataProvider, InboundMessage, IssuedResponse,
    NameIdFormat, NameIdPolicy, ProcessingOutcome, RequestedAttribute, ServiceProviderMetadata,
    TrustedKey, UserAttribute, SIGSERVICE_ENTITY_CATEGORY,
};

pub const SP1: &str = "sp-1";
pub const SP2: &str = "sp-2";
pub const SIGN_SERVICE: &str = "sign-service";
pub const GIVEN_NAME: &str = "given-name";
pub const PASSWORD: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";

pub static IDP_KEY: LazyLock<Arc<RsaSigningKey>> = LazyLock::new(|| Arc::new(signing_key()));

/// Per-SP key material.
pub struct SpKeys {
    pub signing: Arc<RsaSigningKey>,
    pub encryption: RsaDecryptionKey,
}

pub static SP1_KEYS: LazyLock<SpKeys> = LazyLock::new(sp_keys);
pub static SP2_KEYS: LazyLock<SpKeys> = LazyLock::new(sp_keys);

fn signing_key() -> RsaSigningKey {
    RsaSigningKey::generate().expect("signing key generation")
}

fn sp_keys() -> SpKeys {
    SpKeys {
        signing: Arc::new(signing_key()),
        encryption: RsaDecryptionKey::generate().expect("encryption key generation"),
    }
}

pub fn keys(entity_id: &str) -> &'static SpKeys {
    if entity_id == SP2 {
        &SP2_KEYS
    } else {
        &SP1_KEYS
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("idp_protocol_saml=debug,idp_cache=debug")
        .with_test_writer()
        .try_init();
}

pub fn acs_url(entity_id: &str) -> String {
    format!("https://{entity_id}.example.org/saml2/acs")
}

pub fn sp_metadata(entity_id: &str) -> ServiceProviderMetadata {
    let keys = keys(entity_id);
    ServiceProviderMetadata::new(entity_id)
        .with_acs(AcsEndpoint::post(acs_url(entity_id), 0).as_default())
        .with_signing_key(TrustedKey::from_public_key(keys.signing.public_key_der()))
        .with_encryption(EncryptionCredential::from_public_key(
            keys.encryption.public_key_der().to_vec(),
        ))
}

pub fn endpoint() -> String {
    IdpSettings::for_testing().sso_endpoints[0].clone()
}

/// A request for a persistent NameID and a required `given-name`.
pub fn authn_request(entity_id: &str) -> AuthnRequest {
    AuthnRequest::new(entity_id)
        .with_destination(endpoint())
        .with_acs_url(acs_url(entity_id))
        .with_name_id_policy(NameIdPolicy::new(NameIdFormat::Persistent))
        .with_requested_attribute(RequestedAttribute::new(
            GIVEN_NAME,
            true,
            AttributeSource::Request,
        ))
}

/// Signs `request` with its issuer's key and wraps it as an HTTP-POST message.
pub fn signed(request: &AuthnRequest) -> anyhow::Result<InboundMessage> {
    let signer = XmlSigner::new(keys(&request.issuer).signing.clone(), None);
    let xml = signer.sign(&write_authn_request(request), &request.id)?;
    Ok(InboundMessage::post(&xml, endpoint())?.with_relay_state("relay-42"))
}

pub fn anna(now: DateTime<Utc>) -> AuthenticatedSubject {
    AuthenticatedSubject::new("anna", PASSWORD, now)
        .with_attribute(UserAttribute::single(GIVEN_NAME, "Anna"))
        .with_attribute(UserAttribute::single("surname", "Svensson"))
}

/// An identity provider serving `sp-1`, `sp-2` and a signature service,
/// recording audit events.
pub struct TestIdp {
    pub idp: IdentityProvider,
    pub audit: Arc<MemoryAuditHandler>,
}

impl TestIdp {
    pub fn new() -> Self {
        Self::with_settings(IdpSettings::for_testing())
    }

    pub fn with_settings(settings: IdpSettings) -> Self {
        init_tracing();
        let metadata = InMemoryMetadataProvider::new()
            .with(sp_metadata(SP1))
            .with(sp_metadata(SP2))
            .with(sp_metadata(SIGN_SERVICE).with_entity_category(SIGSERVICE_ENTITY_CATEGORY));
        let audit = Arc::new(MemoryAuditHandler::new());
        let credentials = IdpCredentials {
            signing_key: IDP_KEY.clone(),
            certificate_der: None,
            persistent_id_secret: b"integration-persistent-secret".to_vec(),
        };
        let idp = IdentityProvider::new(settings, credentials, Arc::new(metadata))
            .with_audit(AuditPublisher::new().with_handler(audit.clone()));
        Self { idp, audit }
    }

    /// Runs a request through external authentication as `subject`.
    pub async fn login(
        &self,
        request: &AuthnRequest,
        subject: AuthenticatedSubject,
    ) -> anyhow::Result<IssuedResponse> {
        let handoff = expect_handoff(self.idp.receive(&signed(request)?, None).await?)?;
        let response = self
            .idp
            .resume(&handoff.token, idp_protocol_saml::AuthenticatorResponse::Authenticated(subject))
            .await?;
        Ok(response)
    }
}

pub fn expect_handoff(outcome: ProcessingOutcome) -> anyhow::Result<AuthenticationHandoff> {
    match outcome {
        ProcessingOutcome::Authenticate(handoff) => Ok(handoff),
        ProcessingOutcome::Respond(response) => {
            bail!("expected hand-off, got response {:?}", response.response.status)
        }
    }
}

pub fn expect_response(outcome: ProcessingOutcome) -> anyhow::Result<IssuedResponse> {
    match outcome {
        ProcessingOutcome::Respond(response) => Ok(*response),
        ProcessingOutcome::Authenticate(handoff) => {
            bail!("expected response, got hand-off for {}", handoff.requirements.request_id)
        }
    }
}

/// Decrypts the delivered assertion with the recipient's key.
pub fn decrypt(response: &IssuedResponse, entity_id: &str) -> anyhow::Result<String> {
    let encrypted = parse_encrypted_assertion(&response.xml)?
        .ok_or_else(|| anyhow!("response carries no encrypted assertion"))?;
    Ok(decrypt_assertion(&encrypted, &keys(entity_id).encryption)?)
}
