//! Replay cache.
//!
//! ## NIST 800-53 Rev5: SC-23 (Session Authenticity)
//!
//! An inbound authentication request is processed at most once. The cache
//! remembers every accepted (message id, issuer) pair for a configurable
//! window; a second `accept` for the same pair within the window is rejected,
//! also when both calls race on different tasks or different IdP instances.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::provider::AtomicCacheProvider;

/// Outcome of a replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// First sighting of the pair within the window.
    Accepted,
    /// The pair was already accepted and has not expired.
    RejectedDuplicate,
}

/// A remembered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Message identifier.
    pub message_id: String,
    /// Issuer of the message.
    pub issuer: String,
    /// Instant after which the record may be evicted.
    pub expires_at: DateTime<Utc>,
}

/// Anti-replay store.
#[async_trait]
pub trait ReplayCache: Send + Sync {
    /// Records the pair, unless it was already recorded and is unexpired.
    ///
    /// The check and the insertion are a single atomic step.
    async fn accept(
        &self,
        message_id: &str,
        issuer: &str,
        observed_at: DateTime<Utc>,
    ) -> CacheResult<ReplayOutcome>;

    /// Evicts records that expired before `now`. Returns the number evicted.
    async fn sweep(&self, now: DateTime<Utc>) -> CacheResult<usize>;
}

#[async_trait]
impl<C: ReplayCache + ?Sized> ReplayCache for Arc<C> {
    async fn accept(
        &self,
        message_id: &str,
        issuer: &str,
        observed_at: DateTime<Utc>,
    ) -> CacheResult<ReplayOutcome> {
        (**self).accept(message_id, issuer, observed_at).await
    }

    async fn sweep(&self, now: DateTime<Utc>) -> CacheResult<usize> {
        (**self).sweep(now).await
    }
}

/// Single-process replay cache.
///
/// Expired records are evicted on access, at most once per window, and by
/// explicit calls to [`ReplayCache::sweep`].
#[derive(Debug)]
pub struct LocalReplayCache {
    window: Duration,
    records: DashMap<(String, String), ReplayRecord>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl LocalReplayCache {
    /// Creates a cache remembering messages for `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: DashMap::new(),
            last_sweep: Mutex::new(None),
        }
    }

    /// Returns the number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        *self.last_sweep.lock() = Some(now);
        before.saturating_sub(self.records.len())
    }

    fn sweep_due(&self, now: DateTime<Utc>) -> bool {
        let mut last_sweep = self.last_sweep.lock();
        match *last_sweep {
            Some(last) => now - last >= self.window,
            None => {
                *last_sweep = Some(now);
                false
            }
        }
    }
}

#[async_trait]
impl ReplayCache for LocalReplayCache {
    async fn accept(
        &self,
        message_id: &str,
        issuer: &str,
        observed_at: DateTime<Utc>,
    ) -> CacheResult<ReplayOutcome> {
        if self.sweep_due(observed_at) {
            let evicted = self.evict_expired(observed_at);
            tracing::debug!(evicted, "Replay cache access-time sweep");
        }

        let record = ReplayRecord {
            message_id: message_id.to_string(),
            issuer: issuer.to_string(),
            expires_at: observed_at + self.window,
        };

        let outcome = match self
            .records
            .entry((issuer.to_string(), message_id.to_string()))
        {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > observed_at {
                    ReplayOutcome::RejectedDuplicate
                } else {
                    occupied.insert(record);
                    ReplayOutcome::Accepted
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                ReplayOutcome::Accepted
            }
        };

        if outcome == ReplayOutcome::RejectedDuplicate {
            tracing::warn!(message_id, issuer, "Replay of previously accepted message");
        }
        Ok(outcome)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> CacheResult<usize> {
        Ok(self.evict_expired(now))
    }
}

/// Replay cache shared between instances through an atomic cache.
///
/// Relies on the backend's set-if-absent with TTL. [`ReplayCache::sweep`]
/// asks the backend to drop lapsed keys, which for self-expiring backends
/// does nothing.
#[derive(Debug)]
pub struct SharedReplayCache<P> {
    provider: Arc<P>,
    window: Duration,
}

impl<P: AtomicCacheProvider> SharedReplayCache<P> {
    /// Creates a shared cache on top of `provider`.
    #[must_use]
    pub fn new(provider: Arc<P>, window: Duration) -> Self {
        Self { provider, window }
    }

    /// Returns the cache key for a pair.
    ///
    /// The key is a digest so arbitrary issuer URIs and ids cannot collide or
    /// break the backend's key syntax.
    #[must_use]
    pub fn key(message_id: &str, issuer: &str) -> String {
        let mut material = Vec::with_capacity(issuer.len() + message_id.len() + 1);
        material.extend_from_slice(issuer.as_bytes());
        material.push(0);
        material.extend_from_slice(message_id.as_bytes());
        let digest = idp_crypto::sha256(&material);
        format!(
            "replay:{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
        )
    }
}

#[async_trait]
impl<P: AtomicCacheProvider + 'static> ReplayCache for SharedReplayCache<P> {
    async fn accept(
        &self,
        message_id: &str,
        issuer: &str,
        observed_at: DateTime<Utc>,
    ) -> CacheResult<ReplayOutcome> {
        let ttl = self
            .window
            .to_std()
            .map_err(|_| CacheError::Configuration("replay window must be positive".into()))?;
        let record = ReplayRecord {
            message_id: message_id.to_string(),
            issuer: issuer.to_string(),
            expires_at: observed_at + self.window,
        };

        let key = Self::key(message_id, issuer);
        let value = serde_json::to_string(&record)?;
        if self.provider.insert_if_absent(&key, &value, ttl).await? {
            Ok(ReplayOutcome::Accepted)
        } else {
            tracing::warn!(message_id, issuer, "Replay of previously accepted message");
            Ok(ReplayOutcome::RejectedDuplicate)
        }
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> CacheResult<usize> {
        let evicted = self.provider.purge_expired().await?;
        if evicted > 0 {
            tracing::debug!(evicted, "Shared replay cache sweep");
        }
        Ok(evicted)
    }
}
