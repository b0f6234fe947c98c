//! Complete authentication flows.

use chrono::Utc;
use idp_core::config::NAMEID_FORMAT_PERSISTENT;
use idp_core::{AuditEventKind, IdpSettings, SsoDefaultPolicy};
use idp_protocol_saml::signature::XmlSignatureValidator;
use idp_protocol_saml::{AuthenticatedSubject, AuthenticatorResponse, ErrorKind, TrustedKey};

use crate::common::{
    anna, authn_request, decrypt, expect_handoff, expect_response, signed, TestIdp, GIVEN_NAME,
    IDP_KEY, PASSWORD, SP1, SP2,
};

fn idp_keys() -> Vec<TrustedKey> {
    vec![TrustedKey::from_public_key(IDP_KEY.public_key_der())]
}

#[tokio::test]
async fn test_sp1_receives_signed_encrypted_persistent_assertion() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);

    let response = test.login(&request, anna(Utc::now())).await?;

    assert!(response.is_success());
    assert!(response.encrypted);
    assert_eq!(response.destination, crate::common::acs_url(SP1));
    assert_eq!(response.relay_state.as_deref(), Some("relay-42"));
    assert_eq!(response.response.in_response_to, request.id);

    let keys = idp_keys();
    let validator = XmlSignatureValidator::new(&keys);
    validator.validate_enveloped(&response.xml, &response.response.id)?;
    assert!(!response.xml.contains("Anna"));

    let assertion = response.assertion().expect("success carries an assertion");
    assert_eq!(assertion.subject.name_id.format, NAMEID_FORMAT_PERSISTENT);
    assert_eq!(assertion.conditions.audiences, vec![SP1.to_string()]);
    assert_eq!(assertion.authn_statement.authn_context_class_ref, PASSWORD);
    assert_eq!(
        assertion.attribute(GIVEN_NAME).and_then(|a| a.first_str()),
        Some("Anna")
    );
    // Not requested, so not released.
    assert!(assertion.attribute("surname").is_none());
    assert!(assertion.acceptable_to(SP1, Utc::now()));
    assert!(!assertion.acceptable_to(SP2, Utc::now()));

    let clear = decrypt(&response, SP1)?;
    validator.validate_enveloped(&clear, &assertion.id)?;
    assert!(clear.contains("Anna"));
    assert!(clear.contains(&assertion.subject.name_id.value));

    Ok(())
}

#[tokio::test]
async fn test_audit_trail_precedes_response() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);

    let response = test.login(&request, anna(Utc::now())).await?;

    let kinds: Vec<_> = test
        .audit
        .events_for(&request.id)
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            AuditEventKind::RequestReceived,
            AuditEventKind::BeforeUserAuthn,
            AuditEventKind::AfterUserAuthn,
            AuditEventKind::SuccessResponse,
        ]
    );
    let success = test
        .audit
        .events_for(&request.id)
        .into_iter()
        .find(|e| e.kind == AuditEventKind::SuccessResponse)
        .expect("success audited");
    assert_eq!(success.sp_entity_id.as_deref(), Some(SP1));
    let payload = serde_json::to_string(&success.payload)?;
    assert!(payload.contains(&response.response.id));

    Ok(())
}

#[tokio::test]
async fn test_persistent_name_id_is_stable_per_sp_and_distinct_across_sps() -> anyhow::Result<()> {
    let test = TestIdp::new();

    let first = test.login(&authn_request(SP1), anna(Utc::now())).await?;
    let again = test.login(&authn_request(SP1), anna(Utc::now())).await?;
    let other = test.login(&authn_request(SP2), anna(Utc::now())).await?;

    let name_id = |r: &idp_protocol_saml::IssuedResponse| {
        r.assertion()
            .map(|a| a.subject.name_id.value.clone())
            .unwrap_or_default()
    };
    assert!(!name_id(&first).is_empty());
    assert_eq!(name_id(&first), name_id(&again));
    assert_ne!(name_id(&first), name_id(&other));

    let audience = other.assertion().map(|a| a.conditions.audiences.clone());
    assert_eq!(audience, Some(vec![SP2.to_string()]));
    assert_eq!(
        other
            .assertion()
            .and_then(|a| a.attribute(GIVEN_NAME))
            .and_then(|a| a.first_str()),
        Some("Anna")
    );
    decrypt(&other, SP2)?;
    assert!(decrypt(&other, SP1).is_err());

    Ok(())
}

#[tokio::test]
async fn test_sso_session_answers_second_sp_without_authentication() -> anyhow::Result<()> {
    let mut settings = IdpSettings::for_testing();
    settings.sso.default_policy = SsoDefaultPolicy::Reuse;
    let test = TestIdp::with_settings(settings);

    let first = test.login(&authn_request(SP1), anna(Utc::now())).await?;
    let session = first.session.clone().expect("session after success");

    let request = authn_request(SP2);
    let outcome = test.idp.receive(&signed(&request)?, Some(&session)).await?;
    let second = expect_response(outcome)?;

    assert!(second.is_success());
    let assertion = second.assertion().expect("assertion");
    assert_eq!(assertion.authn_statement.session_index, session.session_index);
    assert_eq!(assertion.authn_statement.authn_instant, session.authn_instant);
    assert_ne!(
        assertion.subject.name_id.value,
        first.assertion().map(|a| a.subject.name_id.value.clone()).unwrap_or_default()
    );

    let participants: Vec<_> = second
        .session
        .as_ref()
        .map(|s| s.participants.iter().map(|p| p.entity_id.clone()).collect())
        .unwrap_or_default();
    assert_eq!(participants, vec![SP1.to_string(), SP2.to_string()]);

    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert!(!kinds.contains(&AuditEventKind::BeforeUserAuthn));
    assert!(kinds.contains(&AuditEventKind::AfterUserAuthn));

    Ok(())
}

#[tokio::test]
async fn test_default_policy_reauthenticates_with_session() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let first = test.login(&authn_request(SP1), anna(Utc::now())).await?;
    let session = first.session.expect("session after success");

    let outcome = test
        .idp
        .receive(&signed(&authn_request(SP2))?, Some(&session))
        .await?;
    let handoff = expect_handoff(outcome)?;
    assert_eq!(handoff.requirements.sp_entity_id, SP2);

    Ok(())
}

#[tokio::test]
async fn test_missing_required_attribute_is_signed_error() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let subject = AuthenticatedSubject::new("bertil", PASSWORD, Utc::now());

    let response = test.login(&authn_request(SP1), subject).await?;

    assert!(!response.is_success());
    assert_eq!(response.error, Some(ErrorKind::MissingRequiredAttribute));
    assert!(response.assertion().is_none());
    assert!(!response.xml.contains("<saml2:Assertion"));
    assert!(!response.xml.contains("EncryptedAssertion"));
    let keys = idp_keys();
    XmlSignatureValidator::new(&keys).validate_enveloped(&response.xml, &response.response.id)?;

    Ok(())
}

#[tokio::test]
async fn test_passive_request_without_session_fails() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).is_passive(true);

    let outcome = test.idp.receive(&signed(&request)?, None).await?;
    let response = expect_response(outcome)?;

    assert_eq!(response.error, Some(ErrorKind::PassiveAuthenticationNotPossible));
    assert!(response.assertion().is_none());
    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AuditEventKind::RequestReceived, AuditEventKind::ErrorResponse]
    );

    Ok(())
}

#[tokio::test]
async fn test_failed_and_cancelled_authentication() -> anyhow::Result<()> {
    let test = TestIdp::new();

    let handoff = expect_handoff(test.idp.receive(&signed(&authn_request(SP1))?, None).await?)?;
    let failed = test
        .idp
        .resume(
            &handoff.token,
            AuthenticatorResponse::Failed {
                reason: "wrong password".to_string(),
            },
        )
        .await?;
    assert_eq!(failed.error, Some(ErrorKind::AuthenticationFailed));
    assert!(failed.session.is_none());

    let handoff = expect_handoff(test.idp.receive(&signed(&authn_request(SP2))?, None).await?)?;
    let cancelled = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Cancelled)
        .await?;
    assert_eq!(cancelled.error, Some(ErrorKind::AuthenticationCancelled));
    assert_eq!(cancelled.destination, crate::common::acs_url(SP2));

    Ok(())
}
