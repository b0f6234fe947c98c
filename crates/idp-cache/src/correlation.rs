//! Correlation token store.
//!
//! While a request waits for the external authenticator its serialized
//! context lives here, keyed by an unguessable token. The token is consumed
//! on first use; a second resume with the same token finds nothing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::provider::AtomicCacheProvider;

/// Storage for suspended request contexts.
#[async_trait]
pub trait CorrelationTokenStore: Send + Sync {
    /// Stores a payload under `token`, observed at `now`, until
    /// `retain_until`.
    async fn store(
        &self,
        token: &str,
        payload: &str,
        now: DateTime<Utc>,
        retain_until: DateTime<Utc>,
    ) -> CacheResult<()>;

    /// Removes and returns the payload stored under `token`.
    ///
    /// Returns `None` for unknown, already consumed or reclaimed tokens.
    async fn consume(&self, token: &str, now: DateTime<Utc>) -> CacheResult<Option<String>>;

    /// Removes every payload whose retention ended before `now` and returns
    /// them.
    ///
    /// Stores whose backend expires entries on its own return an empty list.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> CacheResult<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPayload {
    payload: String,
    retain_until: DateTime<Utc>,
}

/// Single-process correlation store.
#[derive(Debug, Default)]
pub struct MemoryCorrelationStore {
    entries: DashMap<String, StoredPayload>,
}

impl MemoryCorrelationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pending tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no token is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CorrelationTokenStore for MemoryCorrelationStore {
    async fn store(
        &self,
        token: &str,
        payload: &str,
        _now: DateTime<Utc>,
        retain_until: DateTime<Utc>,
    ) -> CacheResult<()> {
        let stored = StoredPayload {
            payload: payload.to_string(),
            retain_until,
        };
        match self.entries.entry(token.to_string()) {
            Entry::Occupied(_) => Err(CacheError::Internal("correlation token collision".into())),
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(())
            }
        }
    }

    async fn consume(&self, token: &str, now: DateTime<Utc>) -> CacheResult<Option<String>> {
        Ok(self
            .entries
            .remove(token)
            .filter(|(_, stored)| stored.retain_until > now)
            .map(|(_, stored)| stored.payload))
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> CacheResult<Vec<String>> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.retain_until <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut reclaimed = Vec::with_capacity(expired.len());
        for token in expired {
            if let Some((_, stored)) = self
                .entries
                .remove_if(&token, |_, stored| stored.retain_until <= now)
            {
                reclaimed.push(stored.payload);
            }
        }
        Ok(reclaimed)
    }
}

/// Correlation store layered over an atomic cache, for multi-instance
/// deployments. Consumption uses get-and-delete. The backend TTL is derived
/// from the caller's clock, and the retention deadline travels with the
/// payload so `consume` honours the caller's `now` too.
#[derive(Debug)]
pub struct CacheCorrelationStore<P> {
    provider: Arc<P>,
}

impl<P: AtomicCacheProvider> CacheCorrelationStore<P> {
    /// Creates a store on top of `provider`.
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    fn key(token: &str) -> String {
        format!("authn-suspension:{token}")
    }
}

#[async_trait]
impl<P: AtomicCacheProvider + 'static> CorrelationTokenStore for CacheCorrelationStore<P> {
    async fn store(
        &self,
        token: &str,
        payload: &str,
        now: DateTime<Utc>,
        retain_until: DateTime<Utc>,
    ) -> CacheResult<()> {
        let ttl = (retain_until - now)
            .to_std()
            .map_err(|_| CacheError::Configuration("retention must lie in the future".into()))?;
        let value = serde_json::to_string(&StoredPayload {
            payload: payload.to_string(),
            retain_until,
        })?;
        let stored = self
            .provider
            .insert_if_absent(&Self::key(token), &value, ttl)
            .await?;
        if !stored {
            return Err(CacheError::Internal("correlation token collision".into()));
        }
        Ok(())
    }

    async fn consume(&self, token: &str, now: DateTime<Utc>) -> CacheResult<Option<String>> {
        let Some(value) = self.provider.take(&Self::key(token)).await? else {
            return Ok(None);
        };
        let stored: StoredPayload = serde_json::from_str(&value)?;
        Ok((stored.retain_until > now).then_some(stored.payload))
    }

    async fn reclaim_expired(&self, _now: DateTime<Utc>) -> CacheResult<Vec<String>> {
        let purged = self.provider.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged lapsed correlation entries");
        }
        Ok(Vec::new())
    }
}
