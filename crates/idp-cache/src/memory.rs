//! In-process [`AtomicCacheProvider`].
//!
//! Serves single-instance deployments and tests. Several IdP instances in
//! one process may share one provider through an `Arc`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::CacheResult;
use crate::provider::AtomicCacheProvider;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    lapses_at: Instant,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.lapses_at > now
    }
}

/// Thread-safe in-memory backend.
///
/// Lapsed entries stay invisible to readers;
/// [`AtomicCacheProvider::purge_expired`] reclaims their memory.
#[derive(Debug, Default)]
pub struct MemoryCacheProvider {
    slots: DashMap<String, Slot>,
}

impl MemoryCacheProvider {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of held entries, lapsed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns whether no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl AtomicCacheProvider for MemoryCacheProvider {
    async fn insert_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        let slot = Slot {
            value: value.to_string(),
            lapses_at: now + ttl,
        };
        // The shard lock held by the entry makes check and write one step.
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().live(now) => {
                occupied.insert(slot);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .slots
            .remove(key)
            .and_then(|(_, slot)| slot.live(now).then_some(slot.value)))
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.live(now));
        Ok(before.saturating_sub(self.slots.len()))
    }
}
