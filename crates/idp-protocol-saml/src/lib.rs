//! SAML 2.0 identity provider protocol engine.
//!
//! This crate turns inbound `AuthnRequest`s into signed SAML responses:
//!
//! - **Request validation** - signature, destination, ACS, freshness and replay checks
//! - **SSO** - ordered voters deciding whether an existing session may answer
//! - **External authentication** - suspend/resume through a single-use correlation token
//! - **Attribute release** - producers and voters deciding what each SP receives
//! - **NameID generation** - persistent, transient and attribute-backed identifiers
//! - **Response building** - signed assertions, optionally encrypted for the SP
//! - **Signature services** - sign messages and principal selection
//!
//! # Architecture
//!
//! - [`types`] - Logical SAML messages and SP metadata
//! - [`bindings`] - HTTP-Redirect query decoding and inflation
//! - [`xml`] - Parsing of requests and serialization of responses
//! - [`signature`] - XML-DSig signing and validation
//! - [`validation`] - The request validator
//! - [`sso`] - SSO session reuse
//! - [`attributes`] - Attribute resolution and release
//! - [`nameid`] - NameID negotiation and generation
//! - [`encryption`] - Assertion encryption
//! - [`builder`] - Response building
//! - [`authn`] - The [`IdentityProvider`] pipeline
//! - [`error`] - Error taxonomy and SAML status mapping
//!
//! Transport stays outside this crate: callers hand over the base64
//! `SAMLRequest` form field or the raw redirect query string, and get back
//! documents and logical forms.
//!
//! # Example
//!
//! ```rust,ignore
//! use idp_protocol_saml::{IdentityProvider, InboundMessage, ProcessingOutcome};
//!
//! let idp = IdentityProvider::new(settings, credentials, metadata);
//! let message = InboundMessage::post_encoded(&form.saml_request, endpoint)?;
//! match idp.receive(&message, session.as_ref()).await? {
//!     ProcessingOutcome::Respond(response) => post_to_sp(*response),
//!     ProcessingOutcome::Authenticate(handoff) => redirect_to_login(handoff),
//! }
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Profiles](https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption 1.1](https://www.w3.org/TR/xmlenc-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod authn;
pub mod bindings;
pub mod builder;
pub mod encryption;
pub mod error;
pub mod metadata;
pub mod nameid;
pub mod signature;
pub mod sso;
pub mod types;
pub mod validation;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use authn::{
    AuthenticatedSubject, AuthenticationHandoff, AuthenticatorResponse, IdentityProvider,
    IdpCredentials, ProcessingOutcome, ProcessingState,
};
pub use builder::IssuedResponse;
pub use error::{ErrorKind, SamlError, SamlResult};
pub use metadata::{InMemoryMetadataProvider, MetadataProvider};
pub use sso::SsoSession;
pub use types::*;
pub use validation::InboundMessage;
