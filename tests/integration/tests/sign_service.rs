//! Signature service requests: sign messages and principal selection.

use chrono::Utc;
use idp_core::{AuditEventKind, AuditPayload, IdpSettings, SsoDefaultPolicy};
use idp_protocol_saml::{AuthenticatorResponse, ErrorKind, MatchValue, SignMessage, UserAttribute};

use crate::common::{
    anna, authn_request, expect_handoff, expect_response, signed, TestIdp, GIVEN_NAME,
    SIGN_SERVICE, SP1, SP2,
};

#[tokio::test]
async fn test_sign_message_that_must_show_is_enforced() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let message = SignMessage::text("I approve the transfer of 100 SEK").must_show(true);

    let request = authn_request(SIGN_SERVICE).with_sign_message(message.clone());
    let handoff = expect_handoff(test.idp.receive(&signed(&request)?, None).await?)?;
    assert_eq!(handoff.requirements.sign_message.as_ref(), Some(&message));

    let response = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(anna(Utc::now())))
        .await?;
    assert_eq!(response.error, Some(ErrorKind::SignMessageNotDisplayed));
    assert!(response.assertion().is_none());
    assert!(response.session.is_none());

    let request = authn_request(SIGN_SERVICE).with_sign_message(message);
    let displayed = anna(Utc::now()).with_sign_message_displayed();
    let response = test.login(&request, displayed).await?;
    assert!(response.is_success());

    let shown = test.audit.events_for(&request.id).into_iter().any(|e| {
        e.kind == AuditEventKind::AfterUserAuthn
            && matches!(
                e.payload,
                AuditPayload::UserAuthentication {
                    sign_message_displayed: true,
                    ..
                }
            )
    });
    assert!(shown);

    Ok(())
}

#[tokio::test]
async fn test_sign_message_of_ordinary_sp_is_ignored() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1).with_sign_message(SignMessage::text("Sign").must_show(true));

    let handoff = expect_handoff(test.idp.receive(&signed(&request)?, None).await?)?;
    assert!(handoff.requirements.sign_message.is_none());

    let response = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(anna(Utc::now())))
        .await?;
    assert!(response.is_success());

    Ok(())
}

#[tokio::test]
async fn test_signature_service_always_authenticates() -> anyhow::Result<()> {
    let mut settings = IdpSettings::for_testing();
    settings.sso.default_policy = SsoDefaultPolicy::Reuse;
    let test = TestIdp::with_settings(settings);

    let first = test.login(&authn_request(SP1), anna(Utc::now())).await?;
    let session = first.session.expect("session after success");

    let outcome = test
        .idp
        .receive(&signed(&authn_request(SIGN_SERVICE))?, Some(&session))
        .await?;
    expect_handoff(outcome)?;

    Ok(())
}

#[tokio::test]
async fn test_principal_selection_guards_session_reuse() -> anyhow::Result<()> {
    let mut settings = IdpSettings::for_testing();
    settings.sso.default_policy = SsoDefaultPolicy::Reuse;
    let test = TestIdp::with_settings(settings);

    let first = test.login(&authn_request(SP1), anna(Utc::now())).await?;
    let session = first.session.expect("session after success");

    let other = authn_request(SP2).with_principal_selection(MatchValue::new(GIVEN_NAME, "Bertil"));
    let handoff = expect_handoff(test.idp.receive(&signed(&other)?, Some(&session)).await?)?;
    assert_eq!(
        handoff.requirements.principal_selection,
        [UserAttribute::single(GIVEN_NAME, "Bertil")]
    );

    let same = authn_request(SP2).with_principal_selection(MatchValue::new(GIVEN_NAME, "Anna"));
    let response = expect_response(test.idp.receive(&signed(&same)?, Some(&session)).await?)?;
    assert!(response.is_success());

    Ok(())
}
