//! `<samlp:Status>` of a response.

use serde::{Deserialize, Serialize};

use super::status_codes;

/// Outcome reported to the SP: a first-level code, optionally refined by a
/// second-level code and explained by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// First-level `StatusCode`.
    pub code: String,
    /// Nested `StatusCode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<String>,
    /// `StatusMessage`. Never carries internal failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self::error(status_codes::SUCCESS, None)
    }
}

impl Status {
    /// `Success` with nothing nested.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// A status with the given codes and no message.
    #[must_use]
    pub fn error(code: &str, sub_code: Option<&str>) -> Self {
        Self {
            code: code.to_owned(),
            sub_code: sub_code.map(ToOwned::to_owned),
            message: None,
        }
    }

    /// Attaches a `StatusMessage`.
    #[must_use]
    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    /// Whether the first-level code is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == status_codes::SUCCESS
    }
}
