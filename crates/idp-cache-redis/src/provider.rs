//! `fred`-backed [`AtomicCacheProvider`].

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use idp_cache::{AtomicCacheProvider, CacheError, CacheResult};

use crate::config::RedisConfig;
use crate::error::from_redis_error;

/// Shared backend on a Redis server.
///
/// `insert_if_absent` maps to `SET key value EX ttl NX` and `take` to
/// `GETDEL`, both single commands and therefore atomic on the server.
pub struct RedisCacheProvider {
    client: Client,
    config: RedisConfig,
}

impl std::fmt::Debug for RedisCacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed credentials.
        f.debug_struct("RedisCacheProvider")
            .field("tls", &self.config.uses_tls())
            .field("key_prefix", &self.config.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCacheProvider {
    /// Connects to the server named by `config`.
    ///
    /// ## Errors
    ///
    /// Returns [`CacheError::Configuration`] for an unusable URL and
    /// [`CacheError::Connection`] if the server cannot be reached.
    pub async fn connect(config: RedisConfig) -> CacheResult<Self> {
        let server = Config::from_url(&config.url)
            .map_err(|e| CacheError::Configuration(e.to_string()))?;
        let reconnect =
            ReconnectPolicy::new_exponential(0, 100, config.max_reconnect_delay_ms, 2);
        let client = Client::new(server, None, None, Some(reconnect));

        client.init().await.map_err(from_redis_error)?;
        tracing::info!(
            tls = config.uses_tls(),
            key_prefix = %config.key_prefix,
            "Shared IdP state connected to Redis"
        );
        Ok(Self { client, config })
    }
}

/// Redis expirations are whole seconds; sub-second TTLs round up to one.
#[allow(clippy::cast_possible_wrap)]
fn expiration(ttl: Duration) -> Expiration {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    Expiration::EX(secs.max(1) as i64)
}

#[async_trait]
impl AtomicCacheProvider for RedisCacheProvider {
    async fn insert_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        // SET NX answers OK when it wrote the key and nil otherwise.
        let written: Option<String> = self
            .client
            .set(
                self.config.namespaced(key),
                value,
                Some(expiration(ttl)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(from_redis_error)?;
        Ok(written.is_some())
    }

    async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        self.client
            .getdel(self.config.namespaced(key))
            .await
            .map_err(from_redis_error)
    }
}
