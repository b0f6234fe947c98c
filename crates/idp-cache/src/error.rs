//! Cache error types.

use thiserror::Error;

/// Failures of the replay cache, the correlation store and their backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache backend unavailable: {0}")]
    Connection(String),

    /// A stored value could not be encoded or decoded.
    #[error("cache value encoding failed: {0}")]
    Serialization(String),

    /// The backend did not answer in time.
    #[error("cache operation timed out")]
    Timeout,

    /// Settings that cannot be applied, such as a non-positive TTL.
    #[error("invalid cache configuration: {0}")]
    Configuration(String),

    /// A stored entry collided with a fresh one or the backend misbehaved.
    #[error("cache failure: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
