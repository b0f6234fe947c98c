//! XML Signature validation.

use base64::Engine;
use idp_crypto::{hash, rsa_verify, HashAlgorithm, RsaAlgorithm};

use super::{canonical_signed_info, canonicalize, DocumentLayout, SignatureLayout};
use crate::error::{SamlError, SamlResult};
use crate::types::TrustedKey;

/// XML signature validator.
///
/// Validates signatures against the keys registered for one SP. Embedded
/// certificates are never trusted on their own.
#[derive(Debug)]
pub struct XmlSignatureValidator<'a> {
    trusted_keys: &'a [TrustedKey],
}

fn invalid(message: impl Into<String>) -> SamlError {
    SamlError::SignatureInvalid(message.into())
}

impl<'a> XmlSignatureValidator<'a> {
    /// Creates a validator over the given keys.
    #[must_use]
    pub const fn new(trusted_keys: &'a [TrustedKey]) -> Self {
        Self { trusted_keys }
    }

    /// Validates an enveloped signature on the root element of `xml`.
    ///
    /// The root must carry `expected_id`, hold exactly one signature as a
    /// direct child, and that signature must reference the root and nothing
    /// else.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] on any deviation.
    pub fn validate_enveloped(&self, xml: &str, expected_id: &str) -> SamlResult<()> {
        let layout = DocumentLayout::scan(xml)
            .map_err(|e| invalid(format!("cannot read signed document: {e}")))?;

        if layout.root_id.as_deref() != Some(expected_id) {
            return Err(invalid("signed root does not carry the message ID"));
        }
        let signature = match layout.signatures.as_slice() {
            [] => return Err(invalid("message is not signed")),
            [signature] => signature,
            _ => return Err(invalid("multiple signatures on the message")),
        };
        match signature.references.as_slice() {
            [uri] if uri.strip_prefix('#') == Some(expected_id) => {}
            [_] => return Err(invalid("signature references another element")),
            _ => return Err(invalid("signature must carry exactly one reference")),
        }

        let algorithm = signature
            .signature_method
            .as_deref()
            .and_then(RsaAlgorithm::from_xml_dsig_uri)
            .ok_or_else(|| invalid("unsupported signature algorithm"))?;
        let digest_algorithm = signature
            .digest_method
            .as_deref()
            .and_then(HashAlgorithm::from_xml_dsig_uri)
            .ok_or_else(|| invalid("unsupported digest algorithm"))?;

        verify_digest(xml, &layout, signature, digest_algorithm)?;

        let signed_info = canonical_signed_info(xml, signature)?;
        let signature_value = decode(signature.signature_value.as_deref(), "SignatureValue")?;
        self.verify_with_any(signed_info.as_bytes(), &signature_value, algorithm)
    }

    /// Validates a detached HTTP-Redirect signature.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the algorithm is not
    /// supported or no trusted key verifies the signature.
    pub fn validate_detached(
        &self,
        signed_query: &str,
        signature_b64: &str,
        sig_alg: &str,
    ) -> SamlResult<()> {
        let algorithm = RsaAlgorithm::from_xml_dsig_uri(sig_alg)
            .ok_or_else(|| invalid(format!("unsupported signature algorithm: {sig_alg}")))?;
        let signature = decode(Some(signature_b64), "Signature")?;
        self.verify_with_any(signed_query.as_bytes(), &signature, algorithm)
    }

    fn verify_with_any(&self, data: &[u8], signature: &[u8], algorithm: RsaAlgorithm) -> SamlResult<()> {
        if self.trusted_keys.is_empty() {
            return Err(invalid("no signing keys registered for the issuer"));
        }
        if self
            .trusted_keys
            .iter()
            .any(|key| rsa_verify(&key.public_key, data, signature, algorithm).is_ok())
        {
            Ok(())
        } else {
            Err(invalid("signature does not verify with any registered key"))
        }
    }
}

fn decode(value: Option<&str>, element: &str) -> SamlResult<Vec<u8>> {
    let value = value.ok_or_else(|| invalid(format!("signature has no {element}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| invalid(format!("invalid {element} encoding: {e}")))
}

fn verify_digest(
    xml: &str,
    layout: &DocumentLayout,
    signature: &SignatureLayout,
    algorithm: HashAlgorithm,
) -> SamlResult<()> {
    let expected = decode(signature.digest_value.as_deref(), "DigestValue")?;

    let mut content = String::with_capacity(layout.root.len());
    content.push_str(&xml[layout.root.start..signature.span.start]);
    content.push_str(&xml[signature.span.end..layout.root.end]);
    let actual = hash(algorithm, canonicalize(&content)?.as_bytes());

    if actual == expected {
        Ok(())
    } else {
        Err(invalid("digest value mismatch"))
    }
}
