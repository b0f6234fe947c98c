//! Inbound messages.

use base64::Engine;

use crate::bindings::RedirectQuery;
use crate::error::{SamlError, SamlResult};
use crate::signature::DocumentLayout;
use crate::types::{AuthnRequest, SamlBinding};
use crate::xml::parse_authn_request;

/// How the inbound request is protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSignature {
    /// XML-DSig signature inside the request (HTTP-POST).
    Enveloped {
        /// The request document exactly as received.
        xml: String,
    },
    /// Query string signature (HTTP-Redirect).
    Detached {
        /// The signed query string in received order and encoding.
        signed_query: String,
        /// Base64 `Signature` parameter.
        signature: String,
        /// `SigAlg` parameter.
        algorithm: String,
    },
    /// No signature.
    Unsigned,
}

impl RequestSignature {
    /// Returns true unless the request is unsigned.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        !matches!(self, Self::Unsigned)
    }
}

/// An authentication request as delivered by a binding.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// The logical request.
    pub request: AuthnRequest,
    /// Signature protecting the request.
    pub signature: RequestSignature,
    /// Binding the request arrived on.
    pub binding: SamlBinding,
    /// URL of the IdP endpoint that received the request.
    pub endpoint: String,
    /// `RelayState` to return with the response.
    pub relay_state: Option<String>,
    /// Network address of the user agent.
    pub subject_address: Option<String>,
}

impl InboundMessage {
    /// Wraps a logical request delivered without a signature.
    #[must_use]
    pub fn unsigned(request: AuthnRequest, binding: SamlBinding, endpoint: impl Into<String>) -> Self {
        Self {
            request,
            signature: RequestSignature::Unsigned,
            binding,
            endpoint: endpoint.into(),
            relay_state: None,
            subject_address: None,
        }
    }

    /// Parses a request received on the HTTP-POST binding.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedRequest`] if the document cannot be parsed.
    pub fn post(xml: &str, endpoint: impl Into<String>) -> SamlResult<Self> {
        let request = parse_authn_request(xml)?;
        let signature = if DocumentLayout::scan(xml)?.signatures.is_empty() {
            RequestSignature::Unsigned
        } else {
            RequestSignature::Enveloped {
                xml: xml.to_string(),
            }
        };
        Ok(Self {
            signature,
            ..Self::unsigned(request, SamlBinding::HttpPost, endpoint)
        })
    }

    /// Decodes and parses the base64 `SAMLRequest` form field of the
    /// HTTP-POST binding.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedRequest`] if decoding or parsing fails.
    pub fn post_encoded(encoded: &str, endpoint: impl Into<String>) -> SamlResult<Self> {
        let compact: String = encoded.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(bytes)
            .map_err(|_| SamlError::MalformedRequest("request is not valid UTF-8".to_string()))?;
        Self::post(&xml, endpoint)
    }

    /// Parses a request received on the HTTP-Redirect binding from the raw
    /// query string.
    ///
    /// The request document, `RelayState` and any signature all come from
    /// `query`, and the signed octets are kept exactly as received.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedRequest`] if the query does not decode,
    /// the request does not parse, or only one of `Signature` and `SigAlg`
    /// is present.
    pub fn redirect(query: &str, endpoint: impl Into<String>) -> SamlResult<Self> {
        let query = RedirectQuery::parse(query)?;
        let request = parse_authn_request(&query.request_xml()?)?;
        let signature = match (query.signature(), query.sig_alg(), query.signed_octets()) {
            (Some(signature), Some(algorithm), Some(signed_query)) => RequestSignature::Detached {
                signed_query,
                signature: signature.to_string(),
                algorithm: algorithm.to_string(),
            },
            (None, None, _) => RequestSignature::Unsigned,
            _ => {
                return Err(SamlError::MalformedRequest(
                    "Signature and SigAlg must be sent together".to_string(),
                ))
            }
        };
        Ok(Self {
            signature,
            relay_state: query.relay_state().map(str::to_string),
            ..Self::unsigned(request, SamlBinding::HttpRedirect, endpoint)
        })
    }

    /// Sets the relay state.
    #[must_use]
    pub fn with_relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    /// Sets the user agent address.
    #[must_use]
    pub fn with_subject_address(mut self, address: impl Into<String>) -> Self {
        self.subject_address = Some(address.into());
        self
    }
}
