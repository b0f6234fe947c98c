//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over the root element of a message, and
//! detached signatures over the query string of the HTTP-Redirect binding.
//!
//! # Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//!
//! SHA-1 and ECDSA are not accepted.
//!
//! # Canonicalization
//!
//! Digests and signatures are computed over Exclusive XML Canonicalization
//! (without comments) of the signed content, so documents survive
//! re-serialization by intermediaries: empty-element tags may be expanded
//! and attributes or namespace declarations reordered. `SignedInfo` is
//! canonicalized with the namespace declarations it inherits from its
//! ancestors in the signed document.
//!
//! # NIST 800-53 Rev5: SC-8 (Transmission Confidentiality and Integrity)
//!
//! Every response leaving the IdP is signed, and every signed request is
//! verified against the keys registered in SP metadata.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use std::ops::Range;

use idp_crypto::{HashAlgorithm, RsaAlgorithm};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use xml_canonicalization::Canonicalizer;

use crate::error::{SamlError, SamlResult};

/// Returns the digest algorithm paired with a signature algorithm.
#[must_use]
pub const fn digest_for(algorithm: RsaAlgorithm) -> HashAlgorithm {
    match algorithm {
        RsaAlgorithm::Rs256 => HashAlgorithm::Sha256,
        RsaAlgorithm::Rs384 => HashAlgorithm::Sha384,
        RsaAlgorithm::Rs512 => HashAlgorithm::Sha512,
    }
}

/// Exclusive XML canonicalization, comments dropped.
///
/// # Errors
///
/// Returns [`SamlError::SignatureInvalid`] if `xml` is not a well-formed
/// fragment with every prefix bound.
pub fn canonicalize(xml: &str) -> SamlResult<String> {
    let mut output = Vec::with_capacity(xml.len());
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| SamlError::SignatureInvalid(format!("canonicalization failed: {e}")))?;
    String::from_utf8(output)
        .map_err(|e| SamlError::SignatureInvalid(format!("canonical form is not UTF-8: {e}")))
}

/// Canonical form of a signature's `SignedInfo` as it sits in `xml`.
pub(crate) fn canonical_signed_info(xml: &str, signature: &SignatureLayout) -> SamlResult<String> {
    let range = signature
        .signed_info
        .clone()
        .ok_or_else(|| SamlError::SignatureInvalid("signature has no SignedInfo".to_string()))?;
    let fragment = with_inherited_namespaces(&xml[range], &signature.signed_info_namespaces)?;
    canonicalize(&fragment)
}

/// Copies the namespace declarations in scope at a fragment's position onto
/// the fragment's top element, skipping prefixes it declares itself.
fn with_inherited_namespaces(fragment: &str, inherited: &[(String, String)]) -> SamlResult<String> {
    let mut reader = Reader::from_str(fragment);
    let own = loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => break declarations(&e)?,
            Event::Eof => return Ok(fragment.to_string()),
            _ => {}
        }
    };
    let name_end = fragment
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_whitespace() || *c == '/' || *c == '>')
        .map_or(fragment.len(), |(i, _)| i);

    let mut injected = String::new();
    for (prefix, uri) in inherited {
        if uri.is_empty() || own.iter().any(|(p, _)| p == prefix) {
            continue;
        }
        injected.push_str(" xmlns");
        if !prefix.is_empty() {
            injected.push(':');
            injected.push_str(prefix);
        }
        injected.push_str("=\"");
        injected.push_str(&escape(uri.as_str()));
        injected.push('"');
    }

    let mut out = String::with_capacity(fragment.len() + injected.len());
    out.push_str(&fragment[..name_end]);
    out.push_str(&injected);
    out.push_str(&fragment[name_end..]);
    Ok(out)
}

/// Namespace declarations carried on one start tag, as `(prefix, uri)`
/// pairs. The default namespace has an empty prefix.
fn declarations(e: &BytesStart<'_>) -> SamlResult<Vec<(String, String)>> {
    let mut found = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        let prefix = if key == b"xmlns" {
            String::new()
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            String::from_utf8_lossy(prefix).into_owned()
        } else {
            continue;
        };
        found.push((prefix, attr.unescape_value()?.into_owned()));
    }
    Ok(found)
}

/// Byte layout of a `<ds:Signature>` that is a direct child of the root.
#[derive(Debug, Default)]
pub(crate) struct SignatureLayout {
    pub(crate) span: Range<usize>,
    pub(crate) signed_info: Option<Range<usize>>,
    pub(crate) signed_info_namespaces: Vec<(String, String)>,
    pub(crate) references: Vec<String>,
    pub(crate) signature_method: Option<String>,
    pub(crate) digest_method: Option<String>,
    pub(crate) digest_value: Option<String>,
    pub(crate) signature_value: Option<String>,
    pub(crate) certificate: Option<String>,
}

/// Byte layout of a document as far as signing and verification need it.
#[derive(Debug, Default)]
pub(crate) struct DocumentLayout {
    pub(crate) root: Range<usize>,
    pub(crate) root_id: Option<String>,
    pub(crate) root_start_tag_end: usize,
    pub(crate) issuer_end: Option<usize>,
    pub(crate) signatures: Vec<SignatureLayout>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    DigestValue,
    SignatureValue,
    Certificate,
}

fn attribute(e: &BytesStart<'_>, name: &str) -> SamlResult<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

struct Scanner {
    layout: DocumentLayout,
    depth: usize,
    seen_root: bool,
    signature: Option<SignatureLayout>,
    signature_depth: usize,
    in_signed_info: bool,
    signed_info_start: usize,
    capture: Option<Capture>,
    text: String,
    namespaces: Vec<Vec<(String, String)>>,
}

/// Declarations in scope from the open ancestors, innermost winning.
fn in_scope(frames: &[Vec<(String, String)>]) -> Vec<(String, String)> {
    let mut scope: Vec<(String, String)> = Vec::new();
    for (prefix, uri) in frames.iter().flatten() {
        match scope.iter_mut().find(|(p, _)| p == prefix) {
            Some(slot) => slot.1.clone_from(uri),
            None => scope.push((prefix.clone(), uri.clone())),
        }
    }
    scope
}

impl Scanner {
    fn element(&mut self, e: &BytesStart<'_>, start: usize, end: usize, empty: bool) -> SamlResult<()> {
        let local = e.local_name();
        let name = local.as_ref();

        if self.depth == 0 {
            if self.seen_root {
                return Err(SamlError::MalformedRequest(
                    "content after the root element".to_string(),
                ));
            }
            self.seen_root = true;
            self.layout.root = start..end;
            self.layout.root_id = attribute(e, "ID")?;
            self.layout.root_start_tag_end = end;
            return Ok(());
        }

        if self.depth == 1 && self.signature.is_none() && name == b"Signature" && !empty {
            self.signature = Some(SignatureLayout {
                span: start..end,
                ..SignatureLayout::default()
            });
            self.signature_depth = self.depth;
            return Ok(());
        }

        let Some(signature) = self.signature.as_mut() else {
            return Ok(());
        };
        match name {
            b"SignedInfo" if !empty => {
                self.in_signed_info = true;
                self.signed_info_start = start;
                signature.signed_info_namespaces = in_scope(&self.namespaces);
            }
            b"SignatureMethod" if self.in_signed_info => {
                signature.signature_method = attribute(e, "Algorithm")?;
            }
            b"Reference" if self.in_signed_info => {
                signature
                    .references
                    .push(attribute(e, "URI")?.unwrap_or_default());
            }
            b"DigestMethod" if self.in_signed_info => {
                signature.digest_method = attribute(e, "Algorithm")?;
            }
            b"DigestValue" if self.in_signed_info && !empty => {
                self.capture = Some(Capture::DigestValue);
            }
            b"SignatureValue" if !self.in_signed_info && !empty => {
                self.capture = Some(Capture::SignatureValue);
            }
            b"X509Certificate" if !self.in_signed_info && !empty => {
                self.capture = Some(Capture::Certificate);
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8], end: usize) {
        if self.depth == 1 {
            self.layout.root.end = end;
            return;
        }
        if self.depth == 2 && self.signature.is_none() && name == b"Issuer" {
            self.layout.issuer_end.get_or_insert(end);
            return;
        }
        if self.depth == self.signature_depth + 1 && name == b"Signature" {
            if let Some(mut signature) = self.signature.take() {
                signature.span.end = end;
                self.layout.signatures.push(signature);
            }
            return;
        }
        let Some(signature) = self.signature.as_mut() else {
            return;
        };
        if name == b"SignedInfo" && self.in_signed_info {
            self.in_signed_info = false;
            signature.signed_info = Some(self.signed_info_start..end);
        }
        if let Some(capture) = self.capture.take() {
            let value: String = self.text.split_whitespace().collect();
            self.text.clear();
            match capture {
                Capture::DigestValue => signature.digest_value = Some(value),
                Capture::SignatureValue => signature.signature_value = Some(value),
                Capture::Certificate => signature.certificate = Some(value),
            }
        }
    }
}

impl DocumentLayout {
    /// Scans a document, recording the byte ranges of its root element, the
    /// root's `Issuer` and any signatures directly below the root.
    pub(crate) fn scan(xml: &str) -> SamlResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut scanner = Scanner {
            layout: Self::default(),
            depth: 0,
            seen_root: false,
            signature: None,
            signature_depth: 0,
            in_signed_info: false,
            signed_info_start: 0,
            capture: None,
            text: String::new(),
            namespaces: Vec::new(),
        };

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event()?;
            let end = reader.buffer_position() as usize;
            match event {
                Event::Start(e) => {
                    scanner.element(&e, start, end, false)?;
                    scanner.namespaces.push(declarations(&e)?);
                    scanner.depth += 1;
                }
                Event::Empty(e) => {
                    scanner.element(&e, start, end, true)?;
                    if scanner.depth == 0 {
                        scanner.layout.root.end = end;
                    }
                }
                Event::End(e) => {
                    scanner.end(e.local_name().as_ref(), end);
                    scanner.namespaces.pop();
                    scanner.depth = scanner.depth.saturating_sub(1);
                }
                Event::Text(t) if scanner.capture.is_some() => {
                    scanner.text.push_str(&t.unescape()?);
                }
                Event::DocType(_) => {
                    return Err(SamlError::MalformedRequest(
                        "DOCTYPE is not allowed".to_string(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !scanner.seen_root {
            return Err(SamlError::MalformedRequest("empty document".to_string()));
        }
        Ok(scanner.layout)
    }

    /// Where an enveloped signature is inserted: after the root's `Issuer`,
    /// or directly after the root start tag when there is none.
    pub(crate) fn signature_insert_position(&self) -> usize {
        self.issuer_end.unwrap_or(self.root_start_tag_end)
    }
}
