//! Assertion and response building.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use idp_core::IdpSettings;
use idp_crypto::random::generate_message_id;

use crate::encryption::AssertionEncrypter;
use crate::error::{ErrorKind, SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::sso::SsoSession;
use crate::types::{
    Assertion, AuthnStatement, Conditions, NameId, Response, SamlBinding,
    ServiceProviderMetadata, Status, Subject, SubjectConfirmation, UserAttribute,
};
use crate::validation::{AuthnRequestContext, ReplyChannel};
use crate::xml::{write_assertion, write_encrypted_assertion, write_response};

/// What the assertion states about the subject.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionInput {
    /// NameID issued to the SP.
    pub name_id: NameId,
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,
    /// Session index of the IdP session.
    pub session_index: String,
    /// Authentication context class achieved.
    pub authn_context_class_ref: String,
    /// Authority that performed the authentication, if delegated.
    pub authenticating_authority: Option<String>,
    /// Released attributes.
    pub attributes: Vec<UserAttribute>,
}

/// A signed response ready for delivery.
#[derive(Debug, Clone)]
pub struct IssuedResponse {
    /// Logical form of the response, with the assertion in clear.
    pub response: Response,
    /// Signed response document as delivered.
    pub xml: String,
    /// ACS URL to deliver to.
    pub destination: String,
    /// Binding to deliver with.
    pub binding: SamlBinding,
    /// `RelayState` to echo.
    pub relay_state: Option<String>,
    /// Whether the delivered assertion is encrypted.
    pub encrypted: bool,
    /// The error answered, for error responses.
    pub error: Option<ErrorKind>,
    /// Session to persist after a successful response.
    pub session: Option<SsoSession>,
}

impl IssuedResponse {
    /// Returns true for success responses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response.is_success()
    }

    /// Returns the assertion in clear, if any.
    #[must_use]
    pub fn assertion(&self) -> Option<&Assertion> {
        self.response.assertion.as_ref()
    }

    /// Returns the base64 `SAMLResponse` form value.
    #[must_use]
    pub fn encoded(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.xml)
    }
}

/// Builds signed responses.
///
/// # NIST 800-53 Rev5: SC-8 (Transmission Confidentiality and Integrity)
///
/// Every response is signed, error responses included. Assertions are signed
/// before they are encrypted.
#[derive(Debug)]
pub struct ResponseBuilder {
    settings: Arc<IdpSettings>,
    signer: XmlSigner,
    encrypter: AssertionEncrypter,
}

impl ResponseBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(settings: Arc<IdpSettings>, signer: XmlSigner) -> Self {
        Self {
            encrypter: AssertionEncrypter::new(&settings),
            settings,
            signer,
        }
    }

    /// Builds a success response carrying one assertion.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoUsableEncryptionCredential`] if encryption is
    /// required but impossible, or [`SamlError::InternalBuildFailure`] if
    /// signing or encryption fails.
    pub fn success(
        &self,
        ctx: &AuthnRequestContext,
        sp: &ServiceProviderMetadata,
        input: AssertionInput,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let not_on_or_after = now + self.settings.assertion_lifetime();
        let mut confirmation =
            SubjectConfirmation::bearer(&ctx.request_id, &ctx.acs_url, not_on_or_after);
        confirmation.address = ctx.subject_address.clone();

        let assertion = Assertion {
            id: generate_message_id(),
            issue_instant: now,
            issuer: self.settings.entity_id.clone(),
            subject: Subject {
                name_id: input.name_id,
                confirmation,
            },
            conditions: Conditions {
                not_before: now - self.settings.not_before_skew(),
                not_on_or_after,
                audiences: vec![sp.entity_id.clone()],
            },
            authn_statement: AuthnStatement {
                authn_instant: input.authn_instant,
                session_index: input.session_index,
                authn_context_class_ref: input.authn_context_class_ref,
                authenticating_authority: input.authenticating_authority,
                subject_locality: ctx.subject_address.clone(),
            },
            attributes: input.attributes,
        };

        let signed_assertion = self.signer.sign(&write_assertion(&assertion), &assertion.id)?;
        let encrypt = self.settings.assertion.encrypt_assertions || sp.encrypt_assertions;
        let fragment = if encrypt {
            let credential = sp.encryption.as_ref().ok_or_else(|| {
                SamlError::NoUsableEncryptionCredential(format!(
                    "{} declares no encryption key",
                    sp.entity_id
                ))
            })?;
            write_encrypted_assertion(&self.encrypter.encrypt(&signed_assertion, credential)?)
        } else {
            signed_assertion
        };

        let response = Response {
            id: generate_message_id(),
            in_response_to: ctx.request_id.clone(),
            issue_instant: now,
            destination: ctx.acs_url.clone(),
            issuer: self.settings.entity_id.clone(),
            status: Status::success(),
            assertion: Some(assertion),
        };
        let xml = self
            .signer
            .sign(&write_response(&response, Some(&fragment)), &response.id)?;

        tracing::debug!(
            request_id = %ctx.request_id,
            response_id = %response.id,
            encrypted = encrypt,
            "Success response built"
        );
        Ok(IssuedResponse {
            response,
            xml,
            destination: ctx.acs_url.clone(),
            binding: ctx.binding,
            relay_state: ctx.relay_state.clone(),
            encrypted: encrypt,
            error: None,
            session: None,
        })
    }

    /// Builds a signed error response without an assertion.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InternalBuildFailure`] if signing fails.
    pub fn error(
        &self,
        reply: &ReplyChannel,
        error: &SamlError,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let response = Response {
            id: generate_message_id(),
            in_response_to: reply.request_id.clone(),
            issue_instant: now,
            destination: reply.acs_url.clone(),
            issuer: self.settings.entity_id.clone(),
            status: error.status(),
            assertion: None,
        };
        let xml = self.signer.sign(&write_response(&response, None), &response.id)?;

        tracing::debug!(
            request_id = %reply.request_id,
            response_id = %response.id,
            error = error.kind().as_str(),
            "Error response built"
        );
        Ok(IssuedResponse {
            response,
            xml,
            destination: reply.acs_url.clone(),
            binding: reply.binding,
            relay_state: reply.relay_state.clone(),
            encrypted: false,
            error: Some(error.kind()),
            session: None,
        })
    }
}
