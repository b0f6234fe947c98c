//! Protocol URIs: XML namespaces, bindings, NameID formats, context
//! classes, status codes and the XML-DSig algorithms the signer emits.

use idp_core::config::{NAMEID_FORMAT_EMAIL, NAMEID_FORMAT_PERSISTENT, NAMEID_FORMAT_TRANSIENT};
use serde::{Deserialize, Serialize};

/// `saml2:` namespace.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// `saml2p:` namespace.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
/// `ds:` namespace.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
/// `xenc:` namespace.
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
/// `xsi:` namespace, for typed attribute values.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// `xs:` namespace.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// `NameFormat` of every released attribute.
pub const ATTRNAME_FORMAT_URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

/// Subject confirmation method of every issued assertion.
pub const CONFIRMATION_METHOD_BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// Second-level status for an authentication the user abandoned.
pub const STATUS_CANCEL: &str = "http://id.elegnamnden.se/status/1.0/cancel";

/// `Algorithm` of the canonicalization and reference transform.
pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
/// `Algorithm` of the transform that drops the signature being verified.
pub const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
const HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";

/// Bindings the IdP receives requests on and answers over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamlBinding {
    /// Form POST.
    HttpPost,
    /// Query string redirect.
    HttpRedirect,
}

impl SamlBinding {
    const ALL: [Self; 2] = [Self::HttpPost, Self::HttpRedirect];

    /// The binding's URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::HttpPost => HTTP_POST,
            Self::HttpRedirect => HTTP_REDIRECT,
        }
    }

    /// Looks a binding up by URI. SOAP and artifact bindings are not served.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.uri() == uri)
    }
}

/// Subject identifier formats the IdP can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NameIdFormat {
    /// No preference; the IdP picks from the SP's metadata.
    #[default]
    Unspecified,
    /// The principal's mail address.
    Email,
    /// A distinguished name.
    X509SubjectName,
    /// Pairwise identifier, stable across sessions.
    Persistent,
    /// Fresh random identifier per assertion.
    Transient,
}

impl NameIdFormat {
    const ALL: [Self; 5] = [
        Self::Unspecified,
        Self::Email,
        Self::X509SubjectName,
        Self::Persistent,
        Self::Transient,
    ];

    /// The format's URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
            Self::Email => NAMEID_FORMAT_EMAIL,
            Self::X509SubjectName => "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName",
            Self::Persistent => NAMEID_FORMAT_PERSISTENT,
            Self::Transient => NAMEID_FORMAT_TRANSIENT,
        }
    }

    /// Looks a format up by URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.uri() == uri)
    }
}

/// `AuthnContextClassRef` values the IdP knows how to report.
pub mod authn_context_classes {
    /// Password over TLS.
    pub const PASSWORD_PROTECTED_TRANSPORT: &str =
        "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";
    /// Certificate login.
    pub const X509: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:X509";
    /// Method not disclosed.
    pub const UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:unspecified";
}

/// First-level `StatusCode` values.
pub mod status_codes {
    #![allow(missing_docs)]
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
}

/// Second-level `StatusCode` values carried in error responses.
pub mod sub_status_codes {
    #![allow(missing_docs)]
    pub const AUTHN_FAILED: &str = "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed";
    pub const INVALID_ATTR_NAME_OR_VALUE: &str =
        "urn:oasis:names:tc:SAML:2.0:status:InvalidAttrNameOrValue";
    pub const INVALID_NAMEID_POLICY: &str = "urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy";
    pub const NO_AUTHN_CONTEXT: &str = "urn:oasis:names:tc:SAML:2.0:status:NoAuthnContext";
    pub const NO_PASSIVE: &str = "urn:oasis:names:tc:SAML:2.0:status:NoPassive";
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";
    pub const REQUEST_UNSUPPORTED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestUnsupported";
}
