//! XML Signature creation.

use std::sync::Arc;

use base64::Engine;
use idp_crypto::{hash, RsaAlgorithm, RsaSigningKey};

use super::{canonical_signed_info, canonicalize, digest_for, DocumentLayout};
use crate::error::{SamlError, SamlResult};
use crate::types::{ENVELOPED_SIGNATURE_TRANSFORM, EXCLUSIVE_C14N, XMLDSIG_NS};

/// A detached HTTP-Redirect signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// The exact query string that was signed.
    pub signed_query: String,
    /// Base64 signature value.
    pub signature: String,
    /// Signature algorithm URI (`SigAlg`).
    pub algorithm: String,
}

impl DetachedSignature {
    /// The full redirect query: the signed parameters followed by
    /// `Signature`.
    #[must_use]
    pub fn to_query(&self) -> String {
        format!(
            "{}&Signature={}",
            self.signed_query,
            urlencoding::encode(&self.signature)
        )
    }
}

/// XML document signer.
///
/// Signs messages with the IdP signing key.
pub struct XmlSigner {
    key: Arc<RsaSigningKey>,
    certificate_der: Option<Vec<u8>>,
    algorithm: RsaAlgorithm,
}

impl std::fmt::Debug for XmlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSigner")
            .field("algorithm", &self.algorithm)
            .field("certificate", &self.certificate_der.is_some())
            .finish_non_exhaustive()
    }
}

impl XmlSigner {
    /// Creates a signer using RSA-SHA256.
    #[must_use]
    pub fn new(key: Arc<RsaSigningKey>, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            key,
            certificate_der,
            algorithm: RsaAlgorithm::Rs256,
        }
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: RsaAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> RsaAlgorithm {
        self.algorithm
    }

    /// Signs the root element of `xml`, whose `ID` must be `reference_id`.
    ///
    /// The `<ds:Signature>` is inserted after the root's `Issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InternalBuildFailure`] if the document cannot be
    /// scanned, the ID does not match or signing fails.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let layout = DocumentLayout::scan(xml)
            .map_err(|e| SamlError::InternalBuildFailure(format!("cannot sign document: {e}")))?;
        if layout.root_id.as_deref() != Some(reference_id) {
            return Err(SamlError::InternalBuildFailure(format!(
                "root element ID does not match reference '{reference_id}'"
            )));
        }
        if !layout.signatures.is_empty() {
            return Err(SamlError::InternalBuildFailure(
                "document is already signed".to_string(),
            ));
        }

        let b64 = base64::engine::general_purpose::STANDARD;
        let build_failure =
            |e: SamlError| SamlError::InternalBuildFailure(format!("cannot sign document: {e}"));
        let digest_alg = digest_for(self.algorithm);
        let canonical_root = canonicalize(&xml[layout.root.clone()]).map_err(build_failure)?;
        let digest = hash(digest_alg, canonical_root.as_bytes());

        let signed_info = format!(
            concat!(
                r#"<ds:SignedInfo xmlns:ds="{ns}">"#,
                r#"<ds:CanonicalizationMethod Algorithm="{c14n}"/>"#,
                r#"<ds:SignatureMethod Algorithm="{sig}"/>"#,
                r##"<ds:Reference URI="#{id}"><ds:Transforms>"##,
                r#"<ds:Transform Algorithm="{env}"/><ds:Transform Algorithm="{c14n}"/>"#,
                r#"</ds:Transforms><ds:DigestMethod Algorithm="{dig}"/>"#,
                r#"<ds:DigestValue>{digest}</ds:DigestValue></ds:Reference></ds:SignedInfo>"#
            ),
            ns = XMLDSIG_NS,
            c14n = EXCLUSIVE_C14N,
            sig = self.algorithm.xml_dsig_uri(),
            id = reference_id,
            env = ENVELOPED_SIGNATURE_TRANSFORM,
            dig = digest_alg.xml_dsig_uri(),
            digest = b64.encode(digest),
        );

        let mut element = String::with_capacity(signed_info.len() + 2048);
        element.push_str(r#"<ds:Signature xmlns:ds=""#);
        element.push_str(XMLDSIG_NS);
        element.push_str(r#"">"#);
        element.push_str(&signed_info);
        element.push_str("<ds:SignatureValue>");
        let value_offset = element.len();
        element.push_str("</ds:SignatureValue>");
        if let Some(cert) = &self.certificate_der {
            element.push_str("<ds:KeyInfo><ds:X509Data><ds:X509Certificate>");
            element.push_str(&b64.encode(cert));
            element.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo>");
        }
        element.push_str("</ds:Signature>");

        let at = layout.signature_insert_position();
        let mut signed = String::with_capacity(xml.len() + element.len() + 700);
        signed.push_str(&xml[..at]);
        signed.push_str(&element);
        signed.push_str(&xml[at..]);

        // SignedInfo is signed in place, with the namespaces it inherits
        // there, exactly as a verifier will canonicalize it.
        let placed = DocumentLayout::scan(&signed).map_err(build_failure)?;
        let signature = placed
            .signatures
            .first()
            .ok_or_else(|| SamlError::InternalBuildFailure("signature not found after insertion".into()))?;
        let canonical_info = canonical_signed_info(&signed, signature).map_err(build_failure)?;
        let signature_value = self.key.sign(self.algorithm, canonical_info.as_bytes())?;
        signed.insert_str(at + value_offset, &b64.encode(signature_value));
        Ok(signed)
    }

    /// Creates a detached signature for the HTTP-Redirect binding.
    ///
    /// `message` is the base64 encoded (deflated) SAML message.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InternalBuildFailure`] if signing fails.
    pub fn sign_redirect(
        &self,
        message: &str,
        relay_state: Option<&str>,
        is_request: bool,
    ) -> SamlResult<DetachedSignature> {
        let param = if is_request { "SAMLRequest" } else { "SAMLResponse" };
        let mut signed_query = format!("{param}={}", urlencoding::encode(message));
        if let Some(relay_state) = relay_state {
            signed_query.push_str("&RelayState=");
            signed_query.push_str(&urlencoding::encode(relay_state));
        }
        let algorithm = self.algorithm.xml_dsig_uri();
        signed_query.push_str("&SigAlg=");
        signed_query.push_str(&urlencoding::encode(algorithm));

        let signature = self.key.sign(self.algorithm, signed_query.as_bytes())?;
        Ok(DetachedSignature {
            signed_query,
            signature: base64::engine::general_purpose::STANDARD.encode(signature),
            algorithm: algorithm.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static KEY: LazyLock<Arc<RsaSigningKey>> =
        LazyLock::new(|| Arc::new(RsaSigningKey::generate().expect("key generation")));

    const DOC: &str = r#"<p:Response xmlns:p="urn:p" xmlns:s="urn:s" ID="_r1"><s:Issuer>idp</s:Issuer><p:Status/></p:Response>"#;

    #[test]
    fn signature_lands_after_issuer() {
        let signed = XmlSigner::new(KEY.clone(), Some(vec![1, 2, 3])).sign(DOC, "_r1").unwrap();
        assert!(signed.contains("</s:Issuer><ds:Signature"));
        assert!(signed.contains("</ds:Signature><p:Status/>"));
        assert!(signed.contains(r##"URI="#_r1""##));
        assert!(signed.contains("<ds:X509Certificate>AQID</ds:X509Certificate>"));
    }

    #[test]
    fn mismatched_reference_is_refused() {
        let result = XmlSigner::new(KEY.clone(), None).sign(DOC, "_other");
        assert!(matches!(result, Err(SamlError::InternalBuildFailure(_))));
    }

    #[test]
    fn signing_twice_is_refused() {
        let signer = XmlSigner::new(KEY.clone(), None);
        let signed = signer.sign(DOC, "_r1").unwrap();
        assert!(signer.sign(&signed, "_r1").is_err());
    }

    #[test]
    fn redirect_query_layout() {
        let detached = XmlSigner::new(KEY.clone(), None)
            .sign_redirect("abc+/=", Some("state 1"), true)
            .unwrap();
        assert_eq!(
            detached.signed_query,
            format!(
                "SAMLRequest=abc%2B%2F%3D&RelayState=state%201&SigAlg={}",
                urlencoding::encode(RsaAlgorithm::Rs256.xml_dsig_uri())
            )
        );
        assert!(detached.to_query().starts_with(&detached.signed_query));
        assert!(detached.to_query().contains("&Signature="));
    }
}
