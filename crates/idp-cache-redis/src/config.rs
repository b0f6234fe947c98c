//! Redis connection settings.

use serde::{Deserialize, Serialize};

/// Where the shared IdP state lives and how keys are namespaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, `redis://` or `rediss://` for TLS.
    pub url: String,
    /// Namespace of this IdP deployment's keys.
    pub key_prefix: String,
    /// Upper bound of the exponential reconnect delay.
    pub max_reconnect_delay_ms: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            key_prefix: "idp".to_string(),
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl RedisConfig {
    /// Settings for the server at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reads `IDP_REDIS_URL` and `IDP_REDIS_PREFIX`; absent variables keep
    /// their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("IDP_REDIS_URL").unwrap_or(defaults.url),
            key_prefix: std::env::var("IDP_REDIS_PREFIX").unwrap_or(defaults.key_prefix),
            ..defaults
        }
    }

    /// Sets the key namespace. An empty prefix disables namespacing.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Returns true if the URL asks for TLS.
    #[must_use]
    pub fn uses_tls(&self) -> bool {
        self.url.starts_with("rediss://")
    }

    /// Places `key` in this deployment's namespace.
    #[must_use]
    pub fn namespaced(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.key_prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_deployment() {
        let config = RedisConfig::default();
        assert_eq!(config.namespaced("replay:abc"), "idp:replay:abc");
        assert_eq!(
            config.with_key_prefix("").namespaced("replay:abc"),
            "replay:abc"
        );
    }

    #[test]
    fn tls_follows_url_scheme() {
        assert!(!RedisConfig::default().uses_tls());
        assert!(RedisConfig::new("rediss://cache.internal:6380/2").uses_tls());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: RedisConfig =
            serde_json::from_str(r#"{"url":"redis://cache:6379/1"}"#).unwrap();
        assert_eq!(config.url, "redis://cache:6379/1");
        assert_eq!(config.key_prefix, "idp");
        assert_eq!(config.max_reconnect_delay_ms, 30_000);
    }
}
