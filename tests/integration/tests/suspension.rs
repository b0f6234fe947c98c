//! Suspension for external authentication and resumption.

use chrono::{Duration, Utc};
use idp_core::AuditEventKind;
use idp_protocol_saml::{
    AuthenticatedSubject, AuthenticatorResponse, ErrorKind, RequestedAuthnContext, SamlError,
    UserAttribute,
};

use crate::common::{anna, authn_request, expect_handoff, signed, TestIdp, GIVEN_NAME, PASSWORD, SP1};

const X509: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:X509";

#[tokio::test]
async fn test_handoff_describes_requirements() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).force_authn(true);
    let now = Utc::now();

    let handoff = expect_handoff(test.idp.receive_at(&signed(&request)?, None, now).await?)?;

    let requirements = &handoff.requirements;
    assert_eq!(requirements.request_id, request.id);
    assert_eq!(requirements.sp_entity_id, SP1);
    assert!(requirements.force_authn);
    assert!(!requirements.is_passive);
    assert_eq!(
        requirements.deadline,
        now + test.idp.settings().suspension_timeout()
    );
    assert!(requirements.authn_contexts.iter().any(|c| c == PASSWORD));
    assert!(requirements
        .requested_attributes
        .iter()
        .any(|a| a.name == GIVEN_NAME && a.required));
    assert!(!handoff.token.is_empty());
    assert!(!handoff.token.contains(&request.id));

    Ok(())
}

#[tokio::test]
async fn test_correlation_token_is_single_use() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let handoff = expect_handoff(test.idp.receive(&signed(&authn_request(SP1))?, None).await?)?;

    let first = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(anna(Utc::now())))
        .await?;
    assert!(first.is_success());

    let second = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(anna(Utc::now())))
        .await;
    assert!(matches!(second, Err(SamlError::ExternalAuthenticationTokenInvalid)));

    let unknown = test
        .idp
        .resume("not-a-token", AuthenticatorResponse::Cancelled)
        .await;
    assert!(matches!(unknown, Err(SamlError::ExternalAuthenticationTokenInvalid)));

    Ok(())
}

#[tokio::test]
async fn test_resume_after_deadline_answers_timeout() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let now = Utc::now();
    let handoff = expect_handoff(test.idp.receive_at(&signed(&request)?, None, now).await?)?;

    let late = handoff.requirements.deadline + Duration::seconds(1);
    let response = test
        .idp
        .resume_at(&handoff.token, AuthenticatorResponse::Authenticated(anna(now)), late)
        .await?;

    assert_eq!(response.error, Some(ErrorKind::ExternalAuthenticationTimeout));
    assert!(response.assertion().is_none());
    assert!(response.session.is_none());
    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert_eq!(kinds.last(), Some(&AuditEventKind::ErrorResponse));
    assert!(!kinds.contains(&AuditEventKind::AfterUserAuthn));

    Ok(())
}

#[tokio::test]
async fn test_abandoned_request_is_reclaimed_without_response() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let now = Utc::now();
    let handoff = expect_handoff(test.idp.receive_at(&signed(&request)?, None, now).await?)?;

    assert_eq!(test.idp.reclaim_expired_at(now).await?, 0);
    assert_eq!(
        test.idp.reclaim_expired_at(handoff.requirements.deadline).await?,
        0
    );

    let retention_end = now + test.idp.settings().suspension_retention() + Duration::seconds(1);
    assert_eq!(test.idp.reclaim_expired_at(retention_end).await?, 1);

    let events = test.audit.events_for(&request.id);
    let last = events.last().expect("events recorded");
    assert_eq!(last.kind, AuditEventKind::UnrecoverableError);
    assert!(!events.iter().any(|e| e.kind == AuditEventKind::ErrorResponse));

    let resumed = test
        .idp
        .resume_at(
            &handoff.token,
            AuthenticatorResponse::Authenticated(anna(now)),
            retention_end,
        )
        .await;
    assert!(matches!(resumed, Err(SamlError::ExternalAuthenticationTokenInvalid)));

    Ok(())
}

#[tokio::test]
async fn test_achieved_context_must_be_acceptable() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).with_authn_context(RequestedAuthnContext::exact([PASSWORD]));
    let handoff = expect_handoff(test.idp.receive(&signed(&request)?, None).await?)?;
    assert_eq!(handoff.requirements.authn_contexts, vec![PASSWORD.to_string()]);

    let subject = AuthenticatedSubject::new("anna", X509, Utc::now())
        .with_attribute(UserAttribute::single(GIVEN_NAME, "Anna"));
    let response = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(subject))
        .await?;

    assert_eq!(response.error, Some(ErrorKind::AuthnContextNotSupported));
    assert!(response.assertion().is_none());

    Ok(())
}

#[tokio::test]
async fn test_unsupported_requested_context_is_refused() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1)
        .with_authn_context(RequestedAuthnContext::exact(["urn:example:ac:classes:retina"]));

    let outcome = test.idp.receive(&signed(&request)?, None).await?;
    let response = crate::common::expect_response(outcome)?;
    assert_eq!(response.error, Some(ErrorKind::AuthnContextNotSupported));

    Ok(())
}
