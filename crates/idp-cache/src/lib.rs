//! # idp-cache
//!
//! Cache abstractions for the SAML2 identity provider.
//!
//! The protocol core needs exactly two pieces of shared mutable state: the
//! replay cache, which must accept each (message id, issuer) pair at most
//! once within its window, and the store of suspended requests waiting for
//! the external authenticator. Both come in a local flavour and a flavour
//! layered over any [`AtomicCacheProvider`] (see `idp-cache-redis`).
//!
//! ## Backends
//!
//! - [`AtomicCacheProvider`] - Atomic insert-if-absent and take
//! - [`MemoryCacheProvider`] - In-process implementation
//!
//! ## Specialized Caches
//!
//! - [`ReplayCache`] - Anti-replay tracking of inbound message identifiers
//! - [`CorrelationTokenStore`] - Single-use tokens for suspended requests
//!
//! ## Example
//!
//! ```ignore
//! use idp_cache::{LocalReplayCache, ReplayCache, ReplayOutcome};
//!
//! let cache = LocalReplayCache::new(chrono::Duration::minutes(5));
//! let outcome = cache.accept("_a1b2", "https://sp.example.com", chrono::Utc::now()).await?;
//! assert_eq!(outcome, ReplayOutcome::Accepted);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod correlation;
pub mod error;
pub mod memory;
pub mod provider;
pub mod replay;

pub use correlation::{CacheCorrelationStore, CorrelationTokenStore, MemoryCorrelationStore};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryCacheProvider;
pub use provider::AtomicCacheProvider;
pub use replay::{LocalReplayCache, ReplayCache, ReplayOutcome, ReplayRecord, SharedReplayCache};
