//! # idp-cache-redis
//!
//! Redis-backed shared state for the SAML2 identity provider.
//!
//! This crate implements the atomic cache traits of `idp-cache` with the
//! `fred` client, so that several IdP instances behind a load balancer share
//! one replay cache and one store of suspended requests:
//!
//! - `SET key value EX ttl NX` backs [`ReplayCache::accept`]
//! - `GETDEL` backs single-use consumption of correlation tokens
//!
//! ## Example
//!
//! ```ignore
//! use idp_cache_redis::{RedisCacheProvider, RedisConfig};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(RedisCacheProvider::connect(RedisConfig::from_env()).await?);
//! let replay = idp_cache_redis::replay_cache(provider.clone(), chrono::Duration::minutes(5));
//! let suspended = idp_cache_redis::correlation_store(provider);
//! ```
//!
//! [`ReplayCache::accept`]: idp_cache::ReplayCache::accept

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod provider;

use std::sync::Arc;

use idp_cache::{CacheCorrelationStore, SharedReplayCache};

pub use config::RedisConfig;
pub use provider::RedisCacheProvider;

/// Creates a replay cache shared through Redis.
#[must_use]
pub fn replay_cache(
    provider: Arc<RedisCacheProvider>,
    window: chrono::Duration,
) -> SharedReplayCache<RedisCacheProvider> {
    SharedReplayCache::new(provider, window)
}

/// Creates a correlation token store shared through Redis.
#[must_use]
pub fn correlation_store(provider: Arc<RedisCacheProvider>) -> CacheCorrelationStore<RedisCacheProvider> {
    CacheCorrelationStore::new(provider)
}
