//! Service provider metadata.
//!
//! The subset of an SP's metadata entry the protocol engine consumes:
//! endpoints, trust material, requested attributes and entity categories.

use serde::{Deserialize, Serialize};
use x509_parser::prelude::{FromDer, X509Certificate};

use super::{RequestedAttribute, SamlBinding};
use crate::error::{SamlError, SamlResult};

/// A registered assertion consumer service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcsEndpoint {
    /// Endpoint URL.
    pub location: String,
    /// Binding the endpoint accepts.
    pub binding: SamlBinding,
    /// Metadata index.
    pub index: u32,
    /// Whether this is the default endpoint.
    #[serde(default)]
    pub is_default: bool,
}

impl AcsEndpoint {
    /// Creates an HTTP-POST endpoint.
    #[must_use]
    pub fn post(location: impl Into<String>, index: u32) -> Self {
        Self {
            location: location.into(),
            binding: SamlBinding::HttpPost,
            index,
            is_default: false,
        }
    }

    /// Marks the endpoint as default.
    #[must_use]
    pub const fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// A public key trusted to verify an SP's request signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    /// PKCS#1 `RSAPublicKey` DER.
    pub public_key: Vec<u8>,
}

impl TrustedKey {
    /// Wraps a PKCS#1 RSA public key.
    #[must_use]
    pub fn from_public_key(public_key: Vec<u8>) -> Self {
        Self { public_key }
    }

    /// Extracts the key from a DER encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UntrustedIssuer`] if the certificate cannot be parsed.
    pub fn from_certificate_der(der: &[u8]) -> SamlResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| SamlError::UntrustedIssuer(format!("invalid signing certificate: {e}")))?;
        Ok(Self {
            public_key: cert.public_key().subject_public_key.data.to_vec(),
        })
    }
}

/// An SP's declared encryption credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionCredential {
    /// X.509 `SubjectPublicKeyInfo` DER of the SP's RSA key.
    pub public_key: Vec<u8>,

    /// Algorithm URIs advertised in `EncryptionMethod`, in preference order.
    #[serde(default)]
    pub encryption_methods: Vec<String>,
}

impl EncryptionCredential {
    /// Wraps a `SubjectPublicKeyInfo` DER.
    #[must_use]
    pub fn from_public_key(public_key: Vec<u8>) -> Self {
        Self {
            public_key,
            encryption_methods: Vec::new(),
        }
    }

    /// Extracts the key from a DER encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoUsableEncryptionCredential`] if the certificate
    /// cannot be parsed.
    pub fn from_certificate_der(der: &[u8]) -> SamlResult<Self> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
            SamlError::NoUsableEncryptionCredential(format!("invalid encryption certificate: {e}"))
        })?;
        Ok(Self::from_public_key(cert.public_key().raw.to_vec()))
    }

    /// Adds an advertised algorithm.
    #[must_use]
    pub fn with_method(mut self, uri: impl Into<String>) -> Self {
        self.encryption_methods.push(uri.into());
        self
    }
}

/// Metadata of a registered service provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProviderMetadata {
    /// SP entity id.
    pub entity_id: String,

    /// Display name, for logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Registered assertion consumer services.
    pub acs_endpoints: Vec<AcsEndpoint>,

    /// Keys trusted for request signatures.
    #[serde(default)]
    pub signing_keys: Vec<TrustedKey>,

    /// `AuthnRequestsSigned` from the SP descriptor.
    #[serde(default)]
    pub authn_requests_signed: bool,

    /// Encryption credential, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionCredential>,

    /// Whether the SP demands encrypted assertions.
    #[serde(default)]
    pub encrypt_assertions: bool,

    /// Supported NameID formats, in preference order.
    #[serde(default)]
    pub name_id_formats: Vec<String>,

    /// Attributes declared in the attribute consuming service.
    #[serde(default)]
    pub requested_attributes: Vec<RequestedAttribute>,

    /// Entity categories the SP belongs to.
    #[serde(default)]
    pub entity_categories: Vec<String>,
}

impl ServiceProviderMetadata {
    /// Creates an entry without endpoints or keys.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: None,
            acs_endpoints: Vec::new(),
            signing_keys: Vec::new(),
            authn_requests_signed: false,
            encryption: None,
            encrypt_assertions: false,
            name_id_formats: Vec::new(),
            requested_attributes: Vec::new(),
            entity_categories: Vec::new(),
        }
    }

    /// Adds an ACS endpoint.
    #[must_use]
    pub fn with_acs(mut self, endpoint: AcsEndpoint) -> Self {
        self.acs_endpoints.push(endpoint);
        self
    }

    /// Adds a trusted signing key.
    #[must_use]
    pub fn with_signing_key(mut self, key: TrustedKey) -> Self {
        self.signing_keys.push(key);
        self
    }

    /// Sets the encryption credential.
    #[must_use]
    pub fn with_encryption(mut self, credential: EncryptionCredential) -> Self {
        self.encryption = Some(credential);
        self
    }

    /// Adds a supported NameID format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: impl Into<String>) -> Self {
        self.name_id_formats.push(format.into());
        self
    }

    /// Adds an attribute declaration.
    #[must_use]
    pub fn with_requested_attribute(mut self, attribute: RequestedAttribute) -> Self {
        self.requested_attributes.push(attribute);
        self
    }

    /// Adds an entity category.
    #[must_use]
    pub fn with_entity_category(mut self, category: impl Into<String>) -> Self {
        self.entity_categories.push(category.into());
        self
    }

    /// Returns the default ACS endpoint: the one flagged default, else the
    /// one with the lowest index.
    #[must_use]
    pub fn default_acs(&self) -> Option<&AcsEndpoint> {
        self.acs_endpoints
            .iter()
            .find(|e| e.is_default)
            .or_else(|| self.acs_endpoints.iter().min_by_key(|e| e.index))
    }

    /// Finds a registered endpoint by location, optionally by binding too.
    #[must_use]
    pub fn find_acs(&self, location: &str, binding: Option<SamlBinding>) -> Option<&AcsEndpoint> {
        self.acs_endpoints
            .iter()
            .find(|e| e.location == location && binding.map_or(true, |b| b == e.binding))
    }

    /// Finds a registered endpoint by index.
    #[must_use]
    pub fn find_acs_by_index(&self, index: u32) -> Option<&AcsEndpoint> {
        self.acs_endpoints.iter().find(|e| e.index == index)
    }

    /// Returns true if the SP belongs to the given entity category.
    #[must_use]
    pub fn has_entity_category(&self, category: &str) -> bool {
        self.entity_categories.iter().any(|c| c == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> ServiceProviderMetadata {
        ServiceProviderMetadata::new("https://sp.example.com")
            .with_acs(AcsEndpoint::post("https://sp.example.com/acs/1", 1))
            .with_acs(AcsEndpoint::post("https://sp.example.com/acs/0", 0))
    }

    #[test]
    fn default_acs_prefers_flag_then_lowest_index() {
        assert_eq!(
            sp().default_acs().map(|e| e.location.as_str()),
            Some("https://sp.example.com/acs/0")
        );

        let flagged = sp().with_acs(AcsEndpoint::post("https://sp.example.com/acs/2", 2).as_default());
        assert_eq!(flagged.default_acs().map(|e| e.index), Some(2));
    }

    #[test]
    fn acs_lookup() {
        let sp = sp();
        assert!(sp.find_acs("https://sp.example.com/acs/1", None).is_some());
        assert!(sp
            .find_acs("https://sp.example.com/acs/1", Some(SamlBinding::HttpRedirect))
            .is_none());
        assert!(sp.find_acs("https://evil.example.com/acs", None).is_none());
        assert_eq!(sp.find_acs_by_index(1).map(|e| e.index), Some(1));
    }

    #[test]
    fn invalid_certificates_are_rejected() {
        assert!(matches!(
            TrustedKey::from_certificate_der(b"not a certificate"),
            Err(SamlError::UntrustedIssuer(_))
        ));
        assert!(matches!(
            EncryptionCredential::from_certificate_der(b"not a certificate"),
            Err(SamlError::NoUsableEncryptionCredential(_))
        ));
    }
}
