//! DashMap Backend Store
//!
//! Implements BackendStore in memory using DashMap for concurrent access.
//! Used for ephemeral deployments and as the test double for the registry.

use crate::domain::entities::BackendConfig;
use crate::domain::ports::{BackendStore, StoreError};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory backend store.
pub struct DashMapBackendStore {
    backends: DashMap<String, BackendConfig>,
}

impl DashMapBackendStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            backends: DashMap::new(),
        }
    }

    /// Number of stored backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    fn sorted(&self, filter: impl Fn(&BackendConfig) -> bool) -> Vec<BackendConfig> {
        let mut backends: Vec<BackendConfig> = self
            .backends
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        backends.sort_by(|a, b| a.name.cmp(&b.name));
        backends
    }
}

impl Default for DashMapBackendStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendStore for DashMapBackendStore {
    async fn list_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
        Ok(self.sorted(|_| true))
    }

    async fn list_active_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
        Ok(self.sorted(|b| b.active))
    }

    async fn list_active_backends_by_group(
        &self,
        routing_group: &str,
    ) -> Result<Vec<BackendConfig>, StoreError> {
        Ok(self.sorted(|b| b.active && b.routing_group == routing_group))
    }

    async fn get_backend(&self, name: &str) -> Result<Option<BackendConfig>, StoreError> {
        Ok(self.backends.get(name).map(|b| b.value().clone()))
    }

    async fn create_backend(&self, backend: &BackendConfig) -> Result<BackendConfig, StoreError> {
        let normalized = backend.normalized();
        match self.backends.entry(normalized.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(normalized.name)),
            Entry::Vacant(slot) => {
                slot.insert(normalized.clone());
                Ok(normalized)
            }
        }
    }

    async fn update_backend(
        &self,
        backend: &BackendConfig,
    ) -> Result<(BackendConfig, bool), StoreError> {
        let normalized = backend.normalized();
        let created = self
            .backends
            .insert(normalized.name.clone(), normalized.clone())
            .is_none();
        Ok((normalized, created))
    }

    async fn delete_backend(&self, name: &str) -> Result<(), StoreError> {
        self.backends.remove(name);
        Ok(())
    }

    async fn set_active(&self, name: &str, active: bool) -> Result<bool, StoreError> {
        match self.backends.get_mut(name) {
            Some(mut backend) => {
                let previous = backend.active;
                backend.active = active;
                Ok(previous)
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }
}
