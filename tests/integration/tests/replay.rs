//! Replay protection.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use idp_cache::{
    CacheCorrelationStore, LocalReplayCache, MemoryCacheProvider, ReplayCache, ReplayOutcome,
    SharedReplayCache,
};
use idp_core::AuditEventKind;
use idp_protocol_saml::{AuthenticatorResponse, ErrorKind, ProcessingOutcome};

use crate::common::{anna, authn_request, expect_handoff, expect_response, signed, TestIdp, SP1};

#[tokio::test]
async fn test_replayed_request_is_rejected_and_first_flow_completes() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let request = authn_request(SP1);
    let message = signed(&request)?;

    let handoff = expect_handoff(test.idp.receive(&message, None).await?)?;

    let replayed = expect_response(test.idp.receive(&message, None).await?)?;
    assert_eq!(replayed.error, Some(ErrorKind::ReplayDetected));
    assert!(replayed.assertion().is_none());
    assert_eq!(replayed.response.in_response_to, request.id);

    let response = test
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(anna(Utc::now())))
        .await?;
    assert!(response.is_success());
    assert_eq!(
        response
            .assertion()
            .and_then(|a| a.attribute("given-name"))
            .and_then(|a| a.first_str()),
        Some("Anna")
    );

    let kinds: Vec<_> = test.audit.events_for(&request.id).iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == AuditEventKind::SuccessResponse).count(),
        1
    );
    assert_eq!(
        kinds.iter().filter(|k| **k == AuditEventKind::ErrorResponse).count(),
        1
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_accept_exactly_one() -> anyhow::Result<()> {
    let test = Arc::new(TestIdp::new());
    let message = Arc::new(signed(&authn_request(SP1))?);

    let tasks = (0..16).map(|_| {
        let test = test.clone();
        let message = message.clone();
        tokio::spawn(async move { test.idp.receive(&message, None).await })
    });
    let results = join_all(tasks).await;

    let mut handoffs = 0;
    let mut replays = 0;
    for result in results {
        match result?? {
            ProcessingOutcome::Authenticate(_) => handoffs += 1,
            ProcessingOutcome::Respond(response) => {
                assert_eq!(response.error, Some(ErrorKind::ReplayDetected));
                replays += 1;
            }
        }
    }
    assert_eq!(handoffs, 1);
    assert_eq!(replays, 15);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replay_cache_accepts_once_under_contention() -> anyhow::Result<()> {
    let cache = Arc::new(LocalReplayCache::new(Duration::seconds(300)));
    let now = Utc::now();

    let tasks = (0..32).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache.accept("_contended", "sp-1", now).await
        })
    });
    let outcomes = join_all(tasks).await;

    let mut accepted = 0;
    for outcome in outcomes {
        if outcome?? == ReplayOutcome::Accepted {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    // Same id from another issuer is a different message.
    let other = cache.accept("_contended", "sp-2", now).await?;
    assert_eq!(other, ReplayOutcome::Accepted);

    Ok(())
}

#[tokio::test]
async fn test_instances_sharing_a_cache_detect_cross_instance_replay() -> anyhow::Result<()> {
    let provider = Arc::new(MemoryCacheProvider::new());
    let share = |test: TestIdp| {
        let window = test.idp.settings().replay_window();
        let idp = test
            .idp
            .with_replay_cache(Arc::new(SharedReplayCache::new(provider.clone(), window)))
            .with_correlation_store(Arc::new(CacheCorrelationStore::new(provider.clone())));
        TestIdp { idp, audit: test.audit }
    };
    let first = share(TestIdp::new());
    let second = share(TestIdp::new());

    let message = signed(&authn_request(SP1))?;
    let handoff = expect_handoff(first.idp.receive(&message, None).await?)?;

    let replayed = expect_response(second.idp.receive(&message, None).await?)?;
    assert_eq!(replayed.error, Some(ErrorKind::ReplayDetected));

    // The suspension is shared too, and still single use.
    let response = second
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Authenticated(anna(Utc::now())))
        .await?;
    assert!(response.is_success());
    assert!(first
        .idp
        .resume(&handoff.token, AuthenticatorResponse::Cancelled)
        .await
        .is_err());

    Ok(())
}

#[tokio::test]
async fn test_sweep_evicts_records_past_window() -> anyhow::Result<()> {
    let test = TestIdp::new();
    let message = signed(&authn_request(SP1))?;
    expect_handoff(test.idp.receive(&message, None).await?)?;

    let window = test.idp.settings().replay_window();
    assert_eq!(test.idp.sweep_at(Utc::now()).await?, 0);
    assert_eq!(test.idp.sweep_at(Utc::now() + window + Duration::seconds(1)).await?, 1);

    Ok(())
}
