//! Request extensions of the Swedish eID framework: principal selection
//! and sign messages.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

/// Namespace of `<psc:PrincipalSelection>`.
pub const PRINCIPAL_SELECTION_NS: &str = "http://id.elegnamnden.se/principal-selection/1.0";
/// Namespace of `<csig:SignMessage>`.
pub const SIGN_MESSAGE_NS: &str = "http://id.elegnamnden.se/csig/1.0/dss-ext/ns";
/// Entity category of signature services.
pub const SIGSERVICE_ENTITY_CATEGORY: &str = "http://id.elegnamnden.se/st/1.0/sigservice";

/// One `<psc:MatchValue>`: an attribute value the SP already knows the
/// principal by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchValue {
    /// Attribute name.
    pub name: String,
    /// `NameFormat`, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,
    /// The value.
    pub value: String,
}

impl MatchValue {
    /// Creates a match value without a name format.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            value: value.into(),
        }
    }
}

/// How a sign message is to be rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignMessageMimeType {
    /// Plain text.
    #[default]
    Text,
    /// HTML.
    Html,
    /// Markdown.
    Markdown,
}

impl SignMessageMimeType {
    const ALL: [Self; 3] = [Self::Text, Self::Html, Self::Markdown];

    /// Attribute value as written on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
        }
    }

    /// Reads the `MimeType` attribute; unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

/// `<csig:SignMessage>`: text a signature service wants shown to the user
/// while they authenticate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessage {
    /// Base64 of the cleartext `<csig:Message>`; `None` when the SP sent
    /// only an `<csig:EncryptedMessage>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Rendering of the message.
    #[serde(default)]
    pub mime_type: SignMessageMimeType,
    /// Whether authentication must fail unless the message was displayed.
    #[serde(default)]
    pub must_show: bool,
    /// Entity the message was encrypted for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_entity: Option<String>,
}

impl SignMessage {
    /// A cleartext message, base64-encoding `text`.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            message: Some(base64::engine::general_purpose::STANDARD.encode(text)),
            ..Self::default()
        }
    }

    /// Sets `MustShow`.
    #[must_use]
    pub const fn must_show(mut self, must_show: bool) -> Self {
        self.must_show = must_show;
        self
    }

    /// Returns true if only an encrypted form was sent.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.message.is_none()
    }

    /// Decodes the cleartext message.
    ///
    /// # Errors
    ///
    /// [`SamlError::UnsupportedRequest`] if the message is encrypted, not
    /// valid base64 UTF-8, or empty.
    pub fn decoded(&self) -> SamlResult<String> {
        let encoded = self.message.as_deref().ok_or_else(|| {
            SamlError::UnsupportedRequest("encrypted sign messages are not supported".to_string())
        })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| SamlError::UnsupportedRequest(format!("sign message is not base64: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| SamlError::UnsupportedRequest("sign message is not UTF-8".to_string()))?;
        if text.trim().is_empty() {
            return Err(SamlError::UnsupportedRequest("sign message is empty".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_parse() {
        assert_eq!(SignMessageMimeType::parse("text/markdown"), Some(SignMessageMimeType::Markdown));
        assert_eq!(SignMessageMimeType::parse("application/pdf"), None);
    }

    #[test]
    fn cleartext_message_decodes() {
        let message = SignMessage::text("I approve the transfer");
        assert!(!message.is_encrypted());
        assert_eq!(message.decoded().unwrap(), "I approve the transfer");
    }

    #[test]
    fn unusable_messages_are_unsupported() {
        let encrypted = SignMessage::default();
        assert!(encrypted.is_encrypted());
        assert!(matches!(encrypted.decoded(), Err(SamlError::UnsupportedRequest(_))));

        assert!(SignMessage::text("  ").decoded().is_err());

        let garbage = SignMessage {
            message: Some("%%%".to_string()),
            ..SignMessage::default()
        };
        assert!(garbage.decoded().is_err());
    }
}
