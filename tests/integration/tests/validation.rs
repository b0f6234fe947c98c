//! Request validation through the full pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use idp_core::{AuditEventKind, IdpSettings, SsoDefaultPolicy};
use idp_protocol_saml::attributes::{AttributeProducer, AttributeReleaseManager, ReleaseContext};
use idp_protocol_saml::bindings::redirect::deflate;
use idp_protocol_saml::signature::XmlSigner;
use idp_protocol_saml::sso::{SsoSession, SsoVote, SsoVoter, SsoVoterChain};
use idp_protocol_saml::validation::AuthnRequestContext;
use idp_protocol_saml::xml::write_authn_request;
use idp_protocol_saml::{AuthnRequest, ErrorKind, InboundMessage, SamlError, UserAttribute};

use crate::common::{
    anna, authn_request, endpoint, expect_response, signed, TestIdp, SP1, SP2, SP2_KEYS,
};

/// Counts how often release runs for the pipeline.
#[derive(Debug, Default)]
struct CountingProducer(AtomicUsize);

impl AttributeProducer for CountingProducer {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn produce(&self, _: &[UserAttribute], _: &ReleaseContext<'_>) -> Vec<UserAttribute> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }
}

/// Grants reuse and counts how often it was asked.
#[derive(Debug, Default)]
struct CountingVoter(AtomicUsize);

impl SsoVoter for CountingVoter {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn vote(&self, _: &AuthnRequestContext, _: &SsoSession, _: DateTime<Utc>) -> SsoVote {
        self.0.fetch_add(1, Ordering::SeqCst);
        SsoVote::Ok
    }
}

#[tokio::test]
async fn test_expired_request_never_reaches_attribute_resolution() -> anyhow::Result<()> {
    let producer = Arc::new(CountingProducer::default());
    let mut test = TestIdp::new();
    test.idp = test.idp.with_attribute_release(
        AttributeReleaseManager::default().with_producer(producer.clone()),
    );

    let request = authn_request(SP1).issued_at(Utc::now() - Duration::minutes(10));
    let response = expect_response(test.idp.receive(&signed(&request)?, None).await?)?;

    assert_eq!(response.error, Some(ErrorKind::RequestExpired));
    assert!(response.assertion().is_none());
    assert_eq!(producer.0.load(Ordering::SeqCst), 0);
    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert!(!kinds.contains(&AuditEventKind::AfterUserAuthn));
    assert!(!kinds.contains(&AuditEventKind::BeforeUserAuthn));

    // A fresh request runs the producer.
    test.login(&authn_request(SP1), anna(Utc::now())).await?;
    assert_eq!(producer.0.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_request_from_the_future_is_expired() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).issued_at(Utc::now() + Duration::minutes(5));

    let response = expect_response(test.idp.receive(&signed(&request)?, None).await?)?;
    assert_eq!(response.error, Some(ErrorKind::RequestExpired));

    Ok(())
}

#[tokio::test]
async fn test_acs_mismatch_fails_before_sso_decision() -> anyhow::Result<()> {
    let voter = Arc::new(CountingVoter::default());
    let mut test = TestIdp::new();
    test.idp = test
        .idp
        .with_sso_chain(SsoVoterChain::new(SsoDefaultPolicy::Reuse).with_voter(voter.clone()));

    let session = test
        .login(&authn_request(SP1), anna(Utc::now()))
        .await?
        .session
        .expect("session after success");

    let request = authn_request(SP1).with_acs_url("https://attacker.example.net/acs");
    let result = test.idp.receive(&signed(&request)?, Some(&session)).await;

    assert!(matches!(result, Err(SamlError::DestinationMismatch(_))));
    assert_eq!(voter.0.load(Ordering::SeqCst), 0);
    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AuditEventKind::RequestReceived, AuditEventKind::UnrecoverableError]
    );

    // The same session is consulted for a well-formed request.
    let outcome = test
        .idp
        .receive(&signed(&authn_request(SP1))?, Some(&session))
        .await?;
    assert!(expect_response(outcome)?.is_success());
    assert_eq!(voter.0.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_acs_of_another_sp_is_refused() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).with_acs_url(crate::common::acs_url(SP2));

    let result = test.idp.receive(&signed(&request)?, None).await;
    assert!(matches!(result, Err(SamlError::DestinationMismatch(_))));

    Ok(())
}

#[tokio::test]
async fn test_wrong_destination_is_transport_error() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).with_destination("https://other-idp.example.com/sso");

    let err = test
        .idp
        .receive(&signed(&request)?, None)
        .await
        .expect_err("destination mismatch");
    assert_eq!(err.kind(), ErrorKind::DestinationMismatch);
    assert!(err.is_transport_level());

    Ok(())
}

#[tokio::test]
async fn test_untrusted_issuer_gets_no_response() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request("https://unknown.example.org/sp");

    let result = test.idp.receive(&signed(&request)?, None).await;

    assert!(matches!(result, Err(SamlError::UntrustedIssuer(_))));
    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AuditEventKind::RequestReceived, AuditEventKind::UnrecoverableError]
    );

    Ok(())
}

#[tokio::test]
async fn test_tampered_request_fails_signature_check() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let signer = XmlSigner::new(crate::common::SP1_KEYS.signing.clone(), None);
    let xml = signer.sign(&write_authn_request(&request), &request.id)?;
    let tampered = xml.replace("given-name", "national-id");

    let result = test.idp.receive(&InboundMessage::post(&tampered, endpoint())?, None).await;
    assert!(matches!(result, Err(SamlError::SignatureInvalid(_))));

    Ok(())
}

#[tokio::test]
async fn test_request_signed_by_another_sp_is_refused() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let signer = XmlSigner::new(SP2_KEYS.signing.clone(), None);
    let xml = signer.sign(&write_authn_request(&request), &request.id)?;

    let result = test.idp.receive(&InboundMessage::post(&xml, endpoint())?, None).await;
    assert!(matches!(result, Err(SamlError::SignatureInvalid(_))));

    Ok(())
}

#[tokio::test]
async fn test_unsigned_request_refused_when_signing_required() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let xml = write_authn_request(&request);

    let result = test.idp.receive(&InboundMessage::post(&xml, endpoint())?, None).await;
    assert!(matches!(result, Err(SamlError::SignatureInvalid(_))));

    let mut settings = IdpSettings::for_testing();
    settings.require_signed_requests = false;
    let lenient = TestIdp::with_settings(settings);
    let outcome = lenient
        .idp
        .receive(&InboundMessage::post(&xml, endpoint())?, None)
        .await?;
    assert!(matches!(
        outcome,
        idp_protocol_saml::ProcessingOutcome::Authenticate(_)
    ));

    Ok(())
}

fn redirect_query(request: &AuthnRequest, relay_state: Option<&str>) -> anyhow::Result<String> {
    let encoded = deflate(&write_authn_request(request))?;
    let signer = XmlSigner::new(crate::common::SP1_KEYS.signing.clone(), None);
    Ok(signer.sign_redirect(&encoded, relay_state, true)?.to_query())
}

#[tokio::test]
async fn test_signed_redirect_request_is_accepted() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let query = redirect_query(&request, Some("relay-7"))?;

    let message = InboundMessage::redirect(&query, endpoint())?;
    assert_eq!(message.relay_state.as_deref(), Some("relay-7"));
    let outcome = test.idp.receive(&message, None).await?;
    assert!(matches!(
        outcome,
        idp_protocol_saml::ProcessingOutcome::Authenticate(_)
    ));

    Ok(())
}

#[tokio::test]
async fn test_redirect_signature_cannot_be_moved_to_another_request() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let genuine = redirect_query(&authn_request(SP1), None)?;
    let signature_part = &genuine[genuine.find("&SigAlg=").unwrap_or(genuine.len())..];

    let other = authn_request(SP1).force_authn(true);
    let deflated = deflate(&write_authn_request(&other))?;
    let encoded = urlencoding::encode(&deflated);
    let spliced = format!("SAMLRequest={encoded}{signature_part}");

    let result = test
        .idp
        .receive(&InboundMessage::redirect(&spliced, endpoint())?, None)
        .await;
    assert!(matches!(result, Err(SamlError::SignatureInvalid(_))));

    Ok(())
}
