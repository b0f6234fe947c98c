//! Service provider metadata lookup.
//!
//! Trust in an SP is established solely through its metadata entry. The
//! engine asks a [`MetadataProvider`] for the entry of a request's issuer;
//! federation feeds, databases or static files are implementations of that
//! trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::SamlResult;
use crate::types::ServiceProviderMetadata;

/// Source of SP metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync + 'static {
    /// Returns the metadata of `entity_id`, or `None` if the SP is unknown.
    async fn service_provider(
        &self,
        entity_id: &str,
    ) -> SamlResult<Option<Arc<ServiceProviderMetadata>>>;
}

/// In-process metadata registry.
#[derive(Debug, Default)]
pub struct InMemoryMetadataProvider {
    entries: RwLock<HashMap<String, Arc<ServiceProviderMetadata>>>,
}

impl InMemoryMetadataProvider {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an SP, replacing any previous entry with the same entity id.
    pub fn register(&self, metadata: ServiceProviderMetadata) {
        tracing::debug!(entity_id = %metadata.entity_id, "Registered service provider metadata");
        self.entries
            .write()
            .insert(metadata.entity_id.clone(), Arc::new(metadata));
    }

    /// Adds an SP, builder style.
    #[must_use]
    pub fn with(self, metadata: ServiceProviderMetadata) -> Self {
        self.register(metadata);
        self
    }

    /// Removes an SP. Returns true if it was registered.
    pub fn remove(&self, entity_id: &str) -> bool {
        self.entries.write().remove(entity_id).is_some()
    }

    /// Returns the number of registered SPs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no SP is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl MetadataProvider for InMemoryMetadataProvider {
    async fn service_provider(
        &self,
        entity_id: &str,
    ) -> SamlResult<Option<Arc<ServiceProviderMetadata>>> {
        Ok(self.entries.read().get(entity_id).cloned())
    }
}
