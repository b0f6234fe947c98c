//! Backend contract for state shared between IdP instances.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Key-value backend offering the two atomic primitives shared IdP state
/// is built from.
///
/// Values are opaque strings encoded by the caller. Every entry carries a
/// TTL and stops being visible once it lapses, whether or not the backend
/// has physically removed it yet.
#[async_trait]
pub trait AtomicCacheProvider: Send + Sync {
    /// Writes `value` under `key` unless a live entry already exists.
    ///
    /// Returns `true` if this call wrote the entry. Of any number of callers
    /// racing on one key, exactly one observes `true`.
    async fn insert_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Removes the live entry under `key` and returns its value.
    ///
    /// Reading and removing is one step, so a value is handed out at most
    /// once.
    async fn take(&self, key: &str) -> CacheResult<Option<String>>;

    /// Physically removes lapsed entries and returns how many went.
    ///
    /// Backends that expire keys on their own keep the default, which does
    /// nothing.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }
}
