//! Mapping of Redis client failures onto [`CacheError`].

use fred::error::{Error as RedisError, ErrorKind};
use idp_cache::CacheError;

/// Classifies a client error so callers can tell outages from bad input.
#[allow(clippy::needless_pass_by_value)]
pub fn from_redis_error(err: RedisError) -> CacheError {
    let detail = err.to_string();
    match err.kind() {
        ErrorKind::Timeout => CacheError::Timeout,
        ErrorKind::IO | ErrorKind::Canceled => CacheError::Connection(detail),
        ErrorKind::Config | ErrorKind::Url => CacheError::Configuration(detail),
        ErrorKind::Parse => CacheError::Serialization(detail),
        _ => CacheError::Internal(detail),
    }
}
