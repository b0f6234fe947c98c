//! The identity provider pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use idp_cache::{CorrelationTokenStore, LocalReplayCache, MemoryCorrelationStore, ReplayCache};
use idp_core::{AuditEvent, AuditEventKind, AuditPayload, AuditPublisher, IdpSettings};
use idp_crypto::random::{generate_correlation_token, generate_session_index};
use idp_crypto::RsaSigningKey;
use tracing::{debug, error, info, warn};

use super::authenticator::SuspendedRequest;
use super::{
    AuthenticatedSubject, AuthenticationHandoff, AuthenticationRequirements,
    AuthenticatorResponse, PostAuthenticationCheck, ProcessingState, SignMessageDisplayedCheck,
    StateTracker,
};
use crate::attributes::{
    AttributeReleaseManager, DefaultPrincipalSelectionProcessor, PrincipalSelectionProcessor,
    ReleaseContext,
};
use crate::builder::{AssertionInput, IssuedResponse, ResponseBuilder};
use crate::error::{SamlError, SamlResult};
use crate::metadata::MetadataProvider;
use crate::nameid::NameIdPolicyResolver;
use crate::signature::XmlSigner;
use crate::sso::{SsoDecision, SsoParticipant, SsoSession, SsoVoterChain};
use crate::types::ServiceProviderMetadata;
use crate::validation::{
    AuthnRequestContext, InboundMessage, ReplyChannel, RequestValidator, ValidationError,
};

/// Signing and pseudonymisation secrets of the IdP.
#[derive(Clone)]
pub struct IdpCredentials {
    /// Key signing responses and assertions.
    pub signing_key: Arc<RsaSigningKey>,
    /// Certificate announced in signatures.
    pub certificate_der: Option<Vec<u8>>,
    /// Key for persistent NameID derivation.
    pub persistent_id_secret: Vec<u8>,
}

impl std::fmt::Debug for IdpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpCredentials")
            .field("certificate", &self.certificate_der.is_some())
            .finish_non_exhaustive()
    }
}

/// What to do after a request was received.
#[derive(Debug, Clone)]
pub enum ProcessingOutcome {
    /// Deliver this response to the SP.
    Respond(Box<IssuedResponse>),
    /// Send the user to the external authenticator.
    Authenticate(AuthenticationHandoff),
}

/// SAML2 identity provider.
///
/// Owns the pipeline from an inbound `AuthnRequest` to a signed response:
///
/// ```text
/// RECEIVED -> VALIDATED -> REUSE_GRANTED ----------> AUTHENTICATED -> ATTRIBUTES_RESOLVED -> RESPONSE_READY -> SENT
///                       \-> AWAITING_EXTERNAL_AUTH -/
/// ```
///
/// Suspended requests live in a [`CorrelationTokenStore`] so that the
/// resume may happen on another instance.
///
/// ## NIST 800-53 Rev5: AU-2 (Event Logging)
///
/// Each pipeline transition publishes an [`AuditEvent`], and every response
/// is audited before it is returned.
pub struct IdentityProvider {
    settings: Arc<IdpSettings>,
    metadata: Arc<dyn MetadataProvider>,
    replay: Arc<dyn ReplayCache>,
    suspensions: Arc<dyn CorrelationTokenStore>,
    name_ids: NameIdPolicyResolver,
    principal_selection: Arc<dyn PrincipalSelectionProcessor>,
    validator: RequestValidator,
    sso: SsoVoterChain,
    checks: Vec<Arc<dyn PostAuthenticationCheck>>,
    release: AttributeReleaseManager,
    builder: ResponseBuilder,
    audit: AuditPublisher,
}

impl std::fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProvider")
            .field("entity_id", &self.settings.entity_id)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl IdentityProvider {
    /// Creates an identity provider with in-process replay cache and
    /// suspension store, the standard SSO chain, the sign message check and
    /// default attribute release.
    #[must_use]
    pub fn new(
        settings: IdpSettings,
        credentials: IdpCredentials,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        let settings = Arc::new(settings);
        let replay: Arc<dyn ReplayCache> =
            Arc::new(LocalReplayCache::new(settings.replay_window()));
        let name_ids =
            NameIdPolicyResolver::new(settings.clone(), credentials.persistent_id_secret);
        let signer = XmlSigner::new(credentials.signing_key, credentials.certificate_der);
        let principal_selection: Arc<dyn PrincipalSelectionProcessor> =
            Arc::new(DefaultPrincipalSelectionProcessor);

        Self {
            validator: RequestValidator::new(
                settings.clone(),
                metadata.clone(),
                replay.clone(),
                name_ids.clone(),
            )
            .with_principal_selection(principal_selection.clone()),
            sso: SsoVoterChain::standard(&settings, name_ids.clone()),
            checks: vec![Arc::new(SignMessageDisplayedCheck)],
            principal_selection,
            release: AttributeReleaseManager::default(),
            builder: ResponseBuilder::new(settings.clone(), signer),
            suspensions: Arc::new(MemoryCorrelationStore::new()),
            audit: AuditPublisher::new(),
            settings,
            metadata,
            replay,
            name_ids,
        }
    }

    /// Replaces the replay cache.
    #[must_use]
    pub fn with_replay_cache(mut self, replay: Arc<dyn ReplayCache>) -> Self {
        self.validator = RequestValidator::new(
            self.settings.clone(),
            self.metadata.clone(),
            replay.clone(),
            self.name_ids.clone(),
        )
        .with_principal_selection(self.principal_selection.clone());
        self.replay = replay;
        self
    }

    /// Replaces the principal selection processor.
    #[must_use]
    pub fn with_principal_selection(mut self, processor: Arc<dyn PrincipalSelectionProcessor>) -> Self {
        self.validator = self.validator.with_principal_selection(processor.clone());
        self.principal_selection = processor;
        self
    }

    /// Appends a post-authentication check.
    #[must_use]
    pub fn with_post_authentication_check(mut self, check: Arc<dyn PostAuthenticationCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Replaces the suspension store.
    #[must_use]
    pub fn with_correlation_store(mut self, store: Arc<dyn CorrelationTokenStore>) -> Self {
        self.suspensions = store;
        self
    }

    /// Sets the audit publisher.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditPublisher) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the SSO voter chain.
    #[must_use]
    pub fn with_sso_chain(mut self, chain: SsoVoterChain) -> Self {
        self.sso = chain;
        self
    }

    /// Replaces the attribute release manager.
    #[must_use]
    pub fn with_attribute_release(mut self, release: AttributeReleaseManager) -> Self {
        self.release = release;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &IdpSettings {
        &self.settings
    }

    /// Returns the NameID resolver, e.g. for building custom SSO voters.
    #[must_use]
    pub fn name_id_resolver(&self) -> &NameIdPolicyResolver {
        &self.name_ids
    }

    /// Processes an inbound request now. See [`Self::receive_at`].
    ///
    /// # Errors
    ///
    /// See [`Self::receive_at`].
    pub async fn receive(
        &self,
        message: &InboundMessage,
        session: Option<&SsoSession>,
    ) -> SamlResult<ProcessingOutcome> {
        self.receive_at(message, session, Utc::now()).await
    }

    /// Processes an inbound request.
    ///
    /// `session` is the subject's current SSO session, if the
    /// authentication layer knows one.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that must not be answered with a
    /// SAML response: untrusted or malformed requests, and failures to build
    /// even an error response. Every other failure is answered with a signed
    /// error response.
    pub async fn receive_at(
        &self,
        message: &InboundMessage,
        session: Option<&SsoSession>,
        now: DateTime<Utc>,
    ) -> SamlResult<ProcessingOutcome> {
        let request = &message.request;
        let mut tracker = StateTracker::received(&request.id);
        info!(request_id = %request.id, issuer = %request.issuer, "Authentication request received");

        self.audit
            .publish(
                AuditEvent::builder(AuditEventKind::RequestReceived)
                    .at(now)
                    .correlation(&request.id)
                    .sp(&request.issuer)
                    .payload(AuditPayload::Request {
                        request_id: request.id.clone(),
                        issuer: Some(request.issuer.clone()),
                        issue_instant: Some(request.issue_instant),
                        assertion_consumer_service_url: request
                            .assertion_consumer_service_url
                            .clone(),
                        protocol_binding: request.protocol_binding.clone(),
                        signed: message.signature.is_signed(),
                        relay_state: message.relay_state.clone(),
                    })
                    .build(),
            )
            .await;

        let validated = match self.validator.validate(message, now).await {
            Ok(validated) => validated,
            Err(ValidationError {
                error,
                reply: Some(reply),
            }) => {
                return self
                    .answer_error(&mut tracker, &reply, error, now)
                    .await
                    .map(|r| ProcessingOutcome::Respond(Box::new(r)));
            }
            Err(ValidationError { error, reply: None }) => {
                tracker.fail();
                return Err(self
                    .unrecoverable(&request.id, Some(&request.issuer), error, now)
                    .await);
            }
        };
        let (ctx, sp) = (validated.context, validated.sp);
        tracker.advance(ProcessingState::Validated)?;

        match (self.sso.decide(&ctx, session, now), session) {
            (SsoDecision::Reuse, Some(session)) => {
                info!(request_id = %ctx.request_id, subject = %session.subject_id, "Reusing SSO session");
                tracker.advance(ProcessingState::ReuseGranted)?;
                let subject = AuthenticatedSubject {
                    subject_id: session.subject_id.clone(),
                    attributes: session.attributes.clone(),
                    authn_context_class_ref: session.authn_context_class_ref.clone(),
                    authn_instant: session.authn_instant,
                    authenticating_authority: session.authenticating_authority.clone(),
                    sign_message_displayed: false,
                };
                self.complete(&mut tracker, &ctx, &sp, subject, Some(session.clone()), now)
                    .await
                    .map(|r| ProcessingOutcome::Respond(Box::new(r)))
            }
            _ if ctx.is_passive => self
                .answer_error(&mut tracker, &ctx.reply(), SamlError::PassiveAuthenticationNotPossible, now)
                .await
                .map(|r| ProcessingOutcome::Respond(Box::new(r))),
            _ => match self.suspend(&mut tracker, &ctx, now).await {
                Ok(handoff) => Ok(ProcessingOutcome::Authenticate(handoff)),
                Err(e) => self
                    .answer_error(&mut tracker, &ctx.reply(), e, now)
                    .await
                    .map(|r| ProcessingOutcome::Respond(Box::new(r))),
            },
        }
    }

    async fn suspend(
        &self,
        tracker: &mut StateTracker,
        ctx: &AuthnRequestContext,
        now: DateTime<Utc>,
    ) -> SamlResult<AuthenticationHandoff> {
        let deadline = now + self.settings.suspension_timeout();
        let suspended = SuspendedRequest {
            context: ctx.clone(),
            suspended_at: now,
            deadline,
        };
        let token = generate_correlation_token();
        self.suspensions
            .store(
                &token,
                &serde_json::to_string(&suspended)?,
                now,
                now + self.settings.suspension_retention(),
            )
            .await?;

        let requirements = AuthenticationRequirements::new(ctx, deadline);
        self.audit
            .publish(
                AuditEvent::builder(AuditEventKind::BeforeUserAuthn)
                    .at(now)
                    .correlation(&ctx.request_id)
                    .sp(&ctx.sp_entity_id)
                    .payload(AuditPayload::Requirements {
                        force_authn: ctx.force_authn,
                        is_passive: ctx.is_passive,
                        authn_contexts: ctx.authn_contexts.clone(),
                        name_id_format: ctx.name_id_format.clone(),
                        requested_attributes: ctx
                            .requested_attributes
                            .iter()
                            .map(|a| a.name.clone())
                            .collect(),
                        entity_categories: ctx.entity_categories.clone(),
                        principal_selection: ctx
                            .principal_selection
                            .iter()
                            .map(|a| a.name.clone())
                            .collect(),
                        sign_message: ctx.sign_message.is_some(),
                    })
                    .build(),
            )
            .await;
        tracker.advance(ProcessingState::AwaitingExternalAuth)?;
        info!(request_id = %ctx.request_id, %deadline, "Request suspended for external authentication");

        Ok(AuthenticationHandoff {
            token,
            requirements,
        })
    }

    /// Resumes a suspended request now. See [`Self::resume_at`].
    ///
    /// # Errors
    ///
    /// See [`Self::resume_at`].
    pub async fn resume(
        &self,
        token: &str,
        result: AuthenticatorResponse,
    ) -> SamlResult<IssuedResponse> {
        self.resume_at(token, result, Utc::now()).await
    }

    /// Resumes a suspended request with the external authenticator's result.
    ///
    /// The token is consumed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ExternalAuthenticationTokenInvalid`] for unknown,
    /// consumed or reclaimed tokens. Other failures are answered with a
    /// signed error response.
    pub async fn resume_at(
        &self,
        token: &str,
        result: AuthenticatorResponse,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let suspended = match self.suspensions.consume(token, now).await {
            Ok(Some(payload)) => serde_json::from_str::<SuspendedRequest>(&payload),
            Ok(None) => {
                warn!("Resume with unknown or consumed correlation token");
                return Err(self
                    .unrecoverable("", None, SamlError::ExternalAuthenticationTokenInvalid, now)
                    .await);
            }
            Err(e) => return Err(self.unrecoverable("", None, e.into(), now).await),
        };
        let suspended = match suspended {
            Ok(suspended) => suspended,
            Err(e) => return Err(self.unrecoverable("", None, e.into(), now).await),
        };

        let ctx = suspended.context;
        let reply = ctx.reply();
        let mut tracker = StateTracker::resumed(&ctx.request_id);
        debug!(request_id = %ctx.request_id, "Resuming suspended request");

        if now > suspended.deadline {
            return self
                .answer_error(&mut tracker, &reply, SamlError::ExternalAuthenticationTimeout, now)
                .await;
        }

        let subject = match result {
            AuthenticatorResponse::Authenticated(subject) => subject,
            AuthenticatorResponse::Failed { reason } => {
                return self
                    .answer_error(&mut tracker, &reply, SamlError::AuthenticationFailed(reason), now)
                    .await;
            }
            AuthenticatorResponse::Cancelled => {
                return self
                    .answer_error(&mut tracker, &reply, SamlError::AuthenticationCancelled, now)
                    .await;
            }
        };

        if !ctx.accepts_context(&subject.authn_context_class_ref) {
            let error = SamlError::AuthnContextNotSupported(format!(
                "achieved {} is not acceptable",
                subject.authn_context_class_ref
            ));
            return self.answer_error(&mut tracker, &reply, error, now).await;
        }

        let sp = match self.metadata.service_provider(&ctx.sp_entity_id).await {
            Ok(Some(sp)) => sp,
            Ok(None) => {
                tracker.fail();
                let error = SamlError::UntrustedIssuer(ctx.sp_entity_id.clone());
                return Err(self
                    .unrecoverable(&ctx.request_id, Some(&ctx.sp_entity_id), error, now)
                    .await);
            }
            Err(e) => return self.answer_error(&mut tracker, &reply, e, now).await,
        };

        self.complete(&mut tracker, &ctx, &sp, subject, None, now).await
    }

    /// Resolves, releases and builds the success response for an
    /// authenticated subject.
    async fn complete(
        &self,
        tracker: &mut StateTracker,
        ctx: &AuthnRequestContext,
        sp: &ServiceProviderMetadata,
        subject: AuthenticatedSubject,
        session: Option<SsoSession>,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let reused = session.is_some();
        self.audit
            .publish(
                AuditEvent::builder(AuditEventKind::AfterUserAuthn)
                    .at(now)
                    .correlation(&ctx.request_id)
                    .sp(&ctx.sp_entity_id)
                    .payload(AuditPayload::UserAuthentication {
                        subject: subject.subject_id.clone(),
                        authn_instant: subject.authn_instant,
                        authn_context_class_ref: subject.authn_context_class_ref.clone(),
                        authenticating_authority: subject.authenticating_authority.clone(),
                        subject_address: ctx.subject_address.clone(),
                        attributes: subject.attributes.iter().map(|a| a.name.clone()).collect(),
                        sso: reused,
                        sign_message_displayed: subject.sign_message_displayed,
                    })
                    .build(),
            )
            .await;
        tracker.advance(ProcessingState::Authenticated)?;

        for check in &self.checks {
            if let Err(e) = check.check(ctx, &subject) {
                debug!(request_id = %ctx.request_id, check = check.name(), "Post-authentication check failed");
                return self.answer_error(tracker, &ctx.reply(), e, now).await;
            }
        }

        match self.issue(tracker, ctx, sp, &subject, session, now) {
            Ok(issued) => {
                self.publish_success(ctx, &issued, now).await;
                tracker.advance(ProcessingState::Sent)?;
                info!(
                    request_id = %ctx.request_id,
                    response_id = %issued.response.id,
                    sso = reused,
                    "Success response issued"
                );
                Ok(issued)
            }
            Err(e) => self.answer_error(tracker, &ctx.reply(), e, now).await,
        }
    }

    fn issue(
        &self,
        tracker: &mut StateTracker,
        ctx: &AuthnRequestContext,
        sp: &ServiceProviderMetadata,
        subject: &AuthenticatedSubject,
        session: Option<SsoSession>,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let release = self.release.release(
            &subject.attributes,
            &ReleaseContext {
                sp_entity_id: &ctx.sp_entity_id,
                entity_categories: &ctx.entity_categories,
                requested: &ctx.requested_attributes,
            },
        )?;
        tracker.advance(ProcessingState::AttributesResolved)?;

        let name_id = self.name_ids.generator(&ctx.name_id_format)?.generate(
            &subject.subject_id,
            &subject.attributes,
            &self.settings.entity_id,
            &ctx.sp_entity_id,
        )?;

        let mut session = session.unwrap_or_else(|| SsoSession {
            subject_id: subject.subject_id.clone(),
            authn_instant: subject.authn_instant,
            authn_context_class_ref: subject.authn_context_class_ref.clone(),
            authenticating_authority: subject.authenticating_authority.clone(),
            session_index: generate_session_index(),
            attributes: subject.attributes.clone(),
            participants: Vec::new(),
        });
        session.record_participant(SsoParticipant {
            entity_id: ctx.sp_entity_id.clone(),
            entity_categories: ctx.entity_categories.clone(),
            released_attributes: release.released_names(),
        });

        let input = AssertionInput {
            name_id,
            authn_instant: subject.authn_instant,
            session_index: session.session_index.clone(),
            authn_context_class_ref: subject.authn_context_class_ref.clone(),
            authenticating_authority: subject.authenticating_authority.clone(),
            attributes: release.released,
        };
        let mut issued = self.builder.success(ctx, sp, input, now)?;
        tracker.advance(ProcessingState::ResponseReady)?;
        issued.session = Some(session);
        Ok(issued)
    }

    /// Answers a post-trust failure with a signed error response.
    async fn answer_error(
        &self,
        tracker: &mut StateTracker,
        reply: &ReplyChannel,
        error: SamlError,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        warn!(
            request_id = %reply.request_id,
            sp = %reply.sp_entity_id,
            state = %tracker.state(),
            error = %error,
            "Request failed, answering with error response"
        );
        tracker.fail();
        match self.builder.error(reply, &error, now) {
            Ok(issued) => {
                self.audit
                    .publish(
                        AuditEvent::builder(AuditEventKind::ErrorResponse)
                            .at(now)
                            .correlation(&reply.request_id)
                            .sp(&reply.sp_entity_id)
                            .payload(response_payload(&issued))
                            .build(),
                    )
                    .await;
                Ok(issued)
            }
            Err(build_error) => Err(self
                .unrecoverable(&reply.request_id, Some(&reply.sp_entity_id), build_error, now)
                .await),
        }
    }

    async fn publish_success(
        &self,
        ctx: &AuthnRequestContext,
        issued: &IssuedResponse,
        now: DateTime<Utc>,
    ) {
        self.audit
            .publish(
                AuditEvent::builder(AuditEventKind::SuccessResponse)
                    .at(now)
                    .correlation(&ctx.request_id)
                    .sp(&ctx.sp_entity_id)
                    .payload(response_payload(issued))
                    .build(),
            )
            .await;
    }

    /// Audits a failure that ends processing without a response.
    async fn unrecoverable(
        &self,
        request_id: &str,
        sp: Option<&str>,
        error: SamlError,
        now: DateTime<Utc>,
    ) -> SamlError {
        error!(request_id, error = %error, "Request dropped without response");
        let mut event = AuditEvent::builder(AuditEventKind::UnrecoverableError)
            .at(now)
            .error(error.kind().as_str(), error.to_string());
        if !request_id.is_empty() {
            event = event.correlation(request_id);
        }
        if let Some(sp) = sp {
            event = event.sp(sp);
        }
        self.audit.publish(event.build()).await;
        error
    }

    /// Discards suspended requests abandoned past their retention now.
    ///
    /// # Errors
    ///
    /// See [`Self::reclaim_expired_at`].
    pub async fn reclaim_expired(&self) -> SamlResult<usize> {
        self.reclaim_expired_at(Utc::now()).await
    }

    /// Discards suspended requests whose retention ended before `now`.
    ///
    /// No response is sent for them; each is audited as an unrecoverable
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Storage`] if the suspension store fails.
    pub async fn reclaim_expired_at(&self, now: DateTime<Utc>) -> SamlResult<usize> {
        let expired = self.suspensions.reclaim_expired(now).await?;
        for payload in &expired {
            match serde_json::from_str::<SuspendedRequest>(payload) {
                Ok(suspended) => {
                    info!(
                        request_id = %suspended.context.request_id,
                        suspended_at = %suspended.suspended_at,
                        "Abandoned request reclaimed"
                    );
                    self.audit
                        .publish(
                            AuditEvent::builder(AuditEventKind::UnrecoverableError)
                                .at(now)
                                .correlation(&suspended.context.request_id)
                                .sp(&suspended.context.sp_entity_id)
                                .error(
                                    SamlError::ExternalAuthenticationTimeout.kind().as_str(),
                                    "suspended request abandoned",
                                )
                                .build(),
                        )
                        .await;
                }
                Err(e) => warn!(error = %e, "Unreadable suspended request discarded"),
            }
        }
        Ok(expired.len())
    }

    /// Runs replay cache maintenance now.
    ///
    /// # Errors
    ///
    /// See [`Self::sweep_at`].
    pub async fn sweep(&self) -> SamlResult<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Evicts replay records that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Storage`] if the replay cache fails.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SamlResult<usize> {
        let evicted = self.replay.sweep(now).await?;
        if evicted > 0 {
            debug!(evicted, "Replay cache swept");
        }
        Ok(evicted)
    }
}

fn response_payload(issued: &IssuedResponse) -> AuditPayload {
    let response = &issued.response;
    let assertion = response.assertion.as_ref();
    AuditPayload::Response {
        response_id: response.id.clone(),
        in_response_to: response.in_response_to.clone(),
        destination: response.destination.clone(),
        status_code: response.status.code.clone(),
        sub_status_code: response.status.sub_code.clone(),
        status_message: response.status.message.clone(),
        assertion_id: assertion.map(|a| a.id.clone()),
        name_id: assertion.map(|a| a.subject.name_id.value.clone()),
        encrypted: issued.encrypted,
        released_attributes: assertion
            .map(|a| a.attributes.iter().map(|attr| attr.name.clone()).collect())
            .unwrap_or_default(),
    }
}
