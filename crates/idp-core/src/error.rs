//! Failures of configuration and auditing.
//!
//! ## NIST 800-53 Rev5: SI-11 (Error Handling)
//!
//! Messages name the offending setting or sink; they never carry key
//! material or subject attributes.

use thiserror::Error;

/// Shorthand for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the core crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings are missing, malformed or inconsistent.
    #[error("invalid settings: {0}")]
    Config(String),

    /// An audit sink refused an event.
    #[error("audit sink failed: {0}")]
    Audit(String),

    /// An event payload could not be encoded.
    #[error("cannot encode audit payload: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
