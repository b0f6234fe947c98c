//! HTTP-Redirect binding.
//!
//! The request travels as `SAMLRequest`, raw DEFLATE then base64 then URL
//! encoding. A signed request adds `SigAlg` and `Signature`; the signature
//! covers `SAMLRequest`, `RelayState` (when present) and `SigAlg`, in that
//! order and exactly as the sender encoded them.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{SamlError, SamlResult};

/// Upper bound on an inflated request.
const MAX_INFLATED_SIZE: u64 = 64 * 1024;

fn malformed(message: impl Into<String>) -> SamlError {
    SamlError::MalformedRequest(message.into())
}

/// The SAML parameters of a redirect query.
///
/// Each parameter is kept both as received and decoded: the signature is
/// checked over the received form, everything else reads the decoded one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectQuery {
    saml_request: Option<(String, String)>,
    relay_state: Option<(String, String)>,
    sig_alg: Option<(String, String)>,
    signature: Option<String>,
}

impl RedirectQuery {
    /// Splits a query string, with or without a leading `?`.
    ///
    /// Parameters other than the four SAML ones are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedRequest`] if a SAML parameter repeats or
    /// does not percent-decode.
    pub fn parse(query: &str) -> SamlResult<Self> {
        let mut parsed = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match name {
                "SAMLRequest" => &mut parsed.saml_request,
                "RelayState" => &mut parsed.relay_state,
                "SigAlg" => &mut parsed.sig_alg,
                "Signature" => {
                    if parsed.signature.is_some() {
                        return Err(malformed("Signature given more than once"));
                    }
                    parsed.signature = Some(decode_component(raw)?);
                    continue;
                }
                _ => continue,
            };
            if slot.is_some() {
                return Err(malformed(format!("{name} given more than once")));
            }
            *slot = Some((raw.to_string(), decode_component(raw)?));
        }
        Ok(parsed)
    }

    /// Decoded `RelayState`.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_ref().map(|(_, decoded)| decoded.as_str())
    }

    /// Decoded `SigAlg`.
    #[must_use]
    pub fn sig_alg(&self) -> Option<&str> {
        self.sig_alg.as_ref().map(|(_, decoded)| decoded.as_str())
    }

    /// Decoded base64 `Signature`.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// The octets a redirect signature is computed over, or `None` when the
    /// query carries no `SigAlg`.
    #[must_use]
    pub fn signed_octets(&self) -> Option<String> {
        let (sig_alg, _) = self.sig_alg.as_ref()?;
        let mut octets = String::from("SAMLRequest=");
        if let Some((raw, _)) = &self.saml_request {
            octets.push_str(raw);
        }
        if let Some((raw, _)) = &self.relay_state {
            octets.push_str("&RelayState=");
            octets.push_str(raw);
        }
        octets.push_str("&SigAlg=");
        octets.push_str(sig_alg);
        Some(octets)
    }

    /// Inflates `SAMLRequest` into the request document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MalformedRequest`] if the parameter is missing or
    /// does not decode and inflate to UTF-8 within the size limit.
    pub fn request_xml(&self) -> SamlResult<String> {
        let (_, encoded) = self
            .saml_request
            .as_ref()
            .ok_or_else(|| malformed("query carries no SAMLRequest"))?;
        inflate(encoded)
    }
}

fn decode_component(raw: &str) -> SamlResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| malformed(format!("query parameter does not decode: {e}")))
}

/// Deflates and base64 encodes a document for the redirect binding. The
/// result still needs URL encoding.
///
/// # Errors
///
/// Returns [`SamlError::InternalBuildFailure`] if compression fails.
pub fn deflate(xml: &str) -> SamlResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| SamlError::InternalBuildFailure(format!("compression error: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SamlError::InternalBuildFailure(format!("compression error: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Reverses [`deflate`].
///
/// # Errors
///
/// Returns [`SamlError::MalformedRequest`] on bad base64, a corrupt or
/// oversized stream, or non-UTF-8 content.
pub fn inflate(encoded: &str) -> SamlResult<String> {
    let compact: String = encoded.split_whitespace().collect();
    let compressed = base64::engine::general_purpose::STANDARD.decode(compact)?;

    let mut xml = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_SIZE)
        .read_to_end(&mut xml)
        .map_err(|e| malformed(format!("request does not inflate: {e}")))?;
    if xml.len() as u64 >= MAX_INFLATED_SIZE {
        return Err(malformed("inflated request is too large"));
    }
    String::from_utf8(xml).map_err(|_| malformed("request is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_octets_keep_sender_encoding() {
        let query = "?SAMLRequest=ab%2Bc&RelayState=one+two&foo=bar\
                     &SigAlg=urn%3Aalg&Signature=c2ln%3D";
        let parsed = RedirectQuery::parse(query).unwrap();

        assert_eq!(parsed.relay_state(), Some("one two"));
        assert_eq!(parsed.sig_alg(), Some("urn:alg"));
        assert_eq!(parsed.signature(), Some("c2ln="));
        assert_eq!(
            parsed.signed_octets().as_deref(),
            Some("SAMLRequest=ab%2Bc&RelayState=one+two&SigAlg=urn%3Aalg")
        );
    }

    #[test]
    fn unsigned_query_has_no_signed_octets() {
        let parsed = RedirectQuery::parse("SAMLRequest=abc").unwrap();
        assert_eq!(parsed.signed_octets(), None);
        assert_eq!(parsed.relay_state(), None);
    }

    #[test]
    fn repeated_parameter_is_malformed() {
        assert!(matches!(
            RedirectQuery::parse("SAMLRequest=a&SAMLRequest=b"),
            Err(SamlError::MalformedRequest(_))
        ));
    }

    #[test]
    fn deflated_request_inflates() {
        let xml = "<samlp:AuthnRequest ID=\"_1\"/>";
        let query = format!("SAMLRequest={}", urlencoding::encode(&deflate(xml).unwrap()));
        assert_eq!(RedirectQuery::parse(&query).unwrap().request_xml().unwrap(), xml);
    }

    #[test]
    fn oversized_request_is_refused() {
        let xml = format!("<a>{}</a>", "x".repeat(MAX_INFLATED_SIZE as usize));
        assert!(matches!(
            inflate(&deflate(&xml).unwrap()),
            Err(SamlError::MalformedRequest(_))
        ));
    }

    #[test]
    fn missing_request_is_malformed() {
        assert!(RedirectQuery::parse("RelayState=x").unwrap().request_xml().is_err());
        assert!(inflate("bm90IGRlZmxhdGU=").is_err());
    }
}
