//! Request validation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use idp_cache::{ReplayCache, ReplayOutcome};
use idp_core::IdpSettings;
use tracing::{debug, info, warn};

use super::{AuthnRequestContext, InboundMessage, ReplyChannel, RequestSignature};
use crate::attributes::{
    DefaultPrincipalSelectionProcessor, PrincipalSelectionProcessor, RequestedAttributeResolver,
};
use crate::bindings::RedirectQuery;
use crate::encryption::AssertionEncrypter;
use crate::error::{SamlError, SamlResult};
use crate::metadata::MetadataProvider;
use crate::nameid::NameIdPolicyResolver;
use crate::signature::XmlSignatureValidator;
use crate::types::{
    AcsEndpoint, AuthnRequest, SamlBinding, ServiceProviderMetadata, SignMessage,
    SIGSERVICE_ENTITY_CATEGORY,
};
use crate::xml::parse_authn_request;

/// A failed validation.
///
/// `reply` is set once the issuer is trusted and its ACS endpoint resolved;
/// only then may the failure be answered with a SAML error response.
#[derive(Debug)]
pub struct ValidationError {
    /// What went wrong.
    pub error: SamlError,
    /// Where an error response may be sent.
    pub reply: Option<ReplyChannel>,
}

impl ValidationError {
    fn transport(error: SamlError) -> Self {
        Self { error, reply: None }
    }
}

/// A request that passed validation, with the metadata of its SP.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// The validated request.
    pub context: AuthnRequestContext,
    /// Metadata of the requesting SP.
    pub sp: Arc<ServiceProviderMetadata>,
}

/// Validates inbound authentication requests.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. structure
/// 2. issuer is a registered SP
/// 3. signature
/// 4. destination
/// 5. ACS endpoint and binding
/// 6. encryption capability
/// 7. freshness
/// 8. replay
/// 9. request policy (ForceAuthn/IsPassive, NameID, authentication context)
/// 10. attribute resolution
///
/// # NIST 800-53 Rev5: SC-23 (Session Authenticity)
///
/// Each (message id, issuer) pair is accepted once; replays are rejected
/// before any session or attribute decision.
pub struct RequestValidator {
    settings: Arc<IdpSettings>,
    metadata: Arc<dyn MetadataProvider>,
    replay: Arc<dyn ReplayCache>,
    name_ids: NameIdPolicyResolver,
    attributes: RequestedAttributeResolver,
    principal_selection: Arc<dyn PrincipalSelectionProcessor>,
    encrypter: AssertionEncrypter,
}

impl std::fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestValidator")
            .field("entity_id", &self.settings.entity_id)
            .finish_non_exhaustive()
    }
}

impl RequestValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        settings: Arc<IdpSettings>,
        metadata: Arc<dyn MetadataProvider>,
        replay: Arc<dyn ReplayCache>,
        name_ids: NameIdPolicyResolver,
    ) -> Self {
        Self {
            attributes: RequestedAttributeResolver::new(settings.clone()),
            principal_selection: Arc::new(DefaultPrincipalSelectionProcessor),
            encrypter: AssertionEncrypter::new(&settings),
            settings,
            metadata,
            replay,
            name_ids,
        }
    }

    /// Replaces the principal selection processor.
    #[must_use]
    pub fn with_principal_selection(mut self, processor: Arc<dyn PrincipalSelectionProcessor>) -> Self {
        self.principal_selection = processor;
        self
    }

    /// Validates `message` as received at `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first failed check.
    pub async fn validate(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<ValidatedRequest, ValidationError> {
        let request = &message.request;

        request.validate().map_err(ValidationError::transport)?;

        let sp = self
            .metadata
            .service_provider(&request.issuer)
            .await
            .map_err(ValidationError::transport)?
            .ok_or_else(|| {
                warn!(issuer = %request.issuer, "Request from unknown issuer");
                ValidationError::transport(SamlError::UntrustedIssuer(request.issuer.clone()))
            })?;

        self.check_signature(message, &sp)
            .map_err(ValidationError::transport)?;
        self.check_destination(message)
            .map_err(ValidationError::transport)?;
        let acs = resolve_acs(message, &sp).map_err(ValidationError::transport)?;

        let reply = ReplyChannel {
            request_id: request.id.clone(),
            sp_entity_id: sp.entity_id.clone(),
            acs_url: acs.location.clone(),
            binding: acs.binding,
            relay_state: message.relay_state.clone(),
        };
        debug!(
            request_id = %request.id,
            issuer = %request.issuer,
            acs = %reply.acs_url,
            "Issuer trusted, reply channel established"
        );
        let with_reply = |error: SamlError| ValidationError {
            error,
            reply: Some(reply.clone()),
        };

        if self.settings.assertion.encrypt_assertions || sp.encrypt_assertions {
            self.encrypter
                .check_capability(sp.encryption.as_ref())
                .map_err(with_reply)?;
        }

        self.check_freshness(request.issue_instant, now)
            .map_err(with_reply)?;

        match self
            .replay
            .accept(&request.id, &request.issuer, now)
            .await
            .map_err(|e| with_reply(e.into()))?
        {
            ReplayOutcome::Accepted => {}
            ReplayOutcome::RejectedDuplicate => {
                warn!(request_id = %request.id, issuer = %request.issuer, "Replayed request rejected");
                return Err(with_reply(SamlError::ReplayDetected {
                    message_id: request.id.clone(),
                    issuer: request.issuer.clone(),
                }));
            }
        }

        let context = self
            .build_context(message, &sp, &reply, now)
            .map_err(with_reply)?;
        info!(
            request_id = %context.request_id,
            issuer = %context.sp_entity_id,
            name_id_format = %context.name_id_format,
            "Authentication request validated"
        );
        Ok(ValidatedRequest { context, sp })
    }

    fn check_signature(&self, message: &InboundMessage, sp: &ServiceProviderMetadata) -> SamlResult<()> {
        let validator = XmlSignatureValidator::new(&sp.signing_keys);
        match &message.signature {
            RequestSignature::Enveloped { xml } => {
                validator.validate_enveloped(xml, &message.request.id)?;
                let covered = parse_authn_request(xml).map_err(unreadable)?;
                covers(&covered, message)
            }
            RequestSignature::Detached {
                signed_query,
                signature,
                algorithm,
            } => {
                validator.validate_detached(signed_query, signature, algorithm)?;
                let signed = RedirectQuery::parse(signed_query).map_err(unreadable)?;
                if signed.signature().is_some() || signed.sig_alg() != Some(algorithm.as_str()) {
                    return Err(SamlError::SignatureInvalid(
                        "SigAlg is not covered by the signature".to_string(),
                    ));
                }
                if signed.relay_state() != message.relay_state.as_deref() {
                    return Err(SamlError::SignatureInvalid(
                        "RelayState is not covered by the signature".to_string(),
                    ));
                }
                let covered = signed
                    .request_xml()
                    .and_then(|xml| parse_authn_request(&xml))
                    .map_err(unreadable)?;
                covers(&covered, message)
            }
            RequestSignature::Unsigned => {
                if self.settings.require_signed_requests || sp.authn_requests_signed {
                    Err(SamlError::SignatureInvalid(
                        "signed requests are required".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn check_destination(&self, message: &InboundMessage) -> SamlResult<()> {
        if !self.settings.sso_endpoints.iter().any(|e| *e == message.endpoint) {
            return Err(SamlError::DestinationMismatch(format!(
                "{} is not an SSO endpoint of this IdP",
                message.endpoint
            )));
        }
        match message.request.destination.as_deref() {
            Some(destination) if destination == message.endpoint => Ok(()),
            Some(destination) => Err(SamlError::DestinationMismatch(format!(
                "request addressed to {destination}, received at {}",
                message.endpoint
            ))),
            None if message.signature.is_signed() => Err(SamlError::DestinationMismatch(
                "signed request without Destination".to_string(),
            )),
            None => Ok(()),
        }
    }

    fn check_freshness(&self, issue_instant: DateTime<Utc>, now: DateTime<Utc>) -> SamlResult<()> {
        let skew = self.settings.clock_skew();
        if issue_instant > now + skew {
            return Err(SamlError::RequestExpired(format!(
                "issued in the future ({issue_instant})"
            )));
        }
        if issue_instant < now - (self.settings.max_message_age() + skew) {
            return Err(SamlError::RequestExpired(format!(
                "issued at {issue_instant}, older than the accepted message age"
            )));
        }
        Ok(())
    }

    fn build_context(
        &self,
        message: &InboundMessage,
        sp: &ServiceProviderMetadata,
        reply: &ReplyChannel,
        now: DateTime<Utc>,
    ) -> SamlResult<AuthnRequestContext> {
        let request = &message.request;

        if request.force_authn && request.is_passive {
            return Err(SamlError::UnsupportedRequest(
                "ForceAuthn and IsPassive are mutually exclusive".to_string(),
            ));
        }

        let policy = request.name_id_policy.as_ref();
        if let Some(qualifier) = policy.and_then(|p| p.sp_name_qualifier.as_deref()) {
            if qualifier != sp.entity_id {
                return Err(SamlError::UnsupportedNameIdFormat(format!(
                    "SPNameQualifier {qualifier} does not name the requesting SP"
                )));
            }
        }
        let generator = self.name_ids.select(policy, sp)?;

        let supported = &self.settings.authn.supported_authn_contexts;
        let requested = request.requested_context_classes();
        let authn_contexts: Vec<String> = if requested.is_empty() {
            supported.clone()
        } else {
            requested
                .iter()
                .filter(|c| supported.contains(c))
                .cloned()
                .collect()
        };
        if authn_contexts.is_empty() {
            return Err(SamlError::AuthnContextNotSupported(requested.join(", ")));
        }

        let sign_message = self.sign_message(request, sp)?;

        Ok(AuthnRequestContext {
            request_id: request.id.clone(),
            sp_entity_id: sp.entity_id.clone(),
            issue_instant: request.issue_instant,
            received_at: now,
            acs_url: reply.acs_url.clone(),
            binding: reply.binding,
            relay_state: reply.relay_state.clone(),
            name_id_format: generator.format().to_string(),
            sp_name_qualifier: policy.and_then(|p| p.sp_name_qualifier.clone()),
            allow_create: policy.map_or(true, |p| p.allow_create),
            authn_contexts,
            authn_context_requested: !requested.is_empty(),
            force_authn: request.force_authn,
            is_passive: request.is_passive,
            requested_attributes: self.attributes.resolve(request, sp),
            entity_categories: sp.entity_categories.clone(),
            signed: message.signature.is_signed(),
            subject_address: message.subject_address.clone(),
            principal_selection: self.principal_selection.extract(request),
            sign_message,
        })
    }

    /// Keeps the sign message of a signature service addressed to this IdP.
    ///
    /// Messages from other SPs, or for another display entity, are ignored.
    fn sign_message(
        &self,
        request: &AuthnRequest,
        sp: &ServiceProviderMetadata,
    ) -> SamlResult<Option<SignMessage>> {
        let Some(message) = request.sign_message.as_ref() else {
            return Ok(None);
        };
        if !sp.entity_categories.iter().any(|c| c == SIGSERVICE_ENTITY_CATEGORY) {
            info!(request_id = %request.id, sp = %sp.entity_id, "SignMessage from an SP that is not a signature service ignored");
            return Ok(None);
        }
        if let Some(entity) = message.display_entity.as_deref() {
            if !entity.eq_ignore_ascii_case(&self.settings.entity_id) {
                info!(request_id = %request.id, display_entity = %entity, "SignMessage addressed to another entity ignored");
                return Ok(None);
            }
        }
        message.decoded()?;
        Ok(Some(message.clone()))
    }
}

/// Resolves the ACS endpoint of a request against SP metadata.
///
/// Responses are only delivered over HTTP-POST.
fn resolve_acs<'a>(message: &InboundMessage, sp: &'a ServiceProviderMetadata) -> SamlResult<&'a AcsEndpoint> {
    let request = &message.request;
    let binding = match request.protocol_binding.as_deref() {
        Some(uri) => Some(SamlBinding::from_uri(uri).ok_or_else(|| {
            SamlError::DestinationMismatch(format!("unknown ProtocolBinding {uri}"))
        })?),
        None => None,
    };

    let endpoint = if let Some(url) = request.assertion_consumer_service_url.as_deref() {
        sp.find_acs(url, binding).ok_or_else(|| {
            SamlError::DestinationMismatch(format!("{url} is not a registered ACS of {}", sp.entity_id))
        })?
    } else if let Some(index) = request.assertion_consumer_service_index {
        sp.find_acs_by_index(index).ok_or_else(|| {
            SamlError::DestinationMismatch(format!("no ACS with index {index} for {}", sp.entity_id))
        })?
    } else {
        sp.default_acs().ok_or_else(|| {
            SamlError::DestinationMismatch(format!("{} registers no ACS", sp.entity_id))
        })?
    };

    if binding.is_some_and(|b| b != endpoint.binding) {
        return Err(SamlError::DestinationMismatch(
            "requested binding does not match the ACS endpoint".to_string(),
        ));
    }
    if endpoint.binding != SamlBinding::HttpPost {
        return Err(SamlError::DestinationMismatch(format!(
            "ACS {} does not accept HTTP-POST",
            endpoint.location
        )));
    }
    Ok(endpoint)
}

fn unreadable(error: SamlError) -> SamlError {
    SamlError::SignatureInvalid(format!("signed content is unreadable: {error}"))
}

/// A verified signature only vouches for the request it was computed over.
fn covers(signed: &AuthnRequest, message: &InboundMessage) -> SamlResult<()> {
    if *signed == message.request {
        Ok(())
    } else {
        Err(SamlError::SignatureInvalid(
            "signature does not cover the delivered request".to_string(),
        ))
    }
}
