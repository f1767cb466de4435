//! Gateway Backend Service - administrative use cases
//!
//! Orchestrates backend administration: the store mutation decides the
//! outcome, then the relay keeps the metrics registry in step. A metrics
//! failure never fails the administrative call.

use crate::application::admin_relay::AdminMutationRelay;
use crate::domain::entities::{BackendConfig, ADHOC_ROUTING_GROUP};
use crate::domain::ports::{BackendStore, StoreError};
use std::sync::Arc;

/// Administrative backend operations.
///
/// The relay is injected at construction so every mutation path is wired
/// to the registry from the first request on.
pub struct GatewayBackendService {
    store: Arc<dyn BackendStore>,
    relay: Arc<AdminMutationRelay>,
}

impl GatewayBackendService {
    pub fn new(store: Arc<dyn BackendStore>, relay: Arc<AdminMutationRelay>) -> Self {
        Self { store, relay }
    }

    pub fn relay(&self) -> &Arc<AdminMutationRelay> {
        &self.relay
    }

    /// Create a backend and register its metrics.
    pub async fn add_backend(&self, backend: &BackendConfig) -> Result<BackendConfig, StoreError> {
        let created = self.store.create_backend(backend).await?;
        self.relay.on_backend_added(&created).await;
        Ok(created)
    }

    /// Update a backend, creating it if it does not exist.
    pub async fn update_backend(
        &self,
        backend: &BackendConfig,
    ) -> Result<BackendConfig, StoreError> {
        let (updated, created) = self.store.update_backend(backend).await?;
        self.relay.on_backend_updated(&updated, !created).await;
        Ok(updated)
    }

    /// Delete a backend. Its metrics are unregistered before the row goes.
    pub async fn delete_backend(&self, name: &str) -> Result<(), StoreError> {
        self.relay
            .on_backend_deleted(name, self.store.delete_backend(name))
            .await
    }

    pub async fn activate_backend(&self, name: &str) -> Result<(), StoreError> {
        self.set_active(name, true).await
    }

    pub async fn deactivate_backend(&self, name: &str) -> Result<(), StoreError> {
        self.set_active(name, false).await
    }

    async fn set_active(&self, name: &str, active: bool) -> Result<(), StoreError> {
        let previous = self.store.set_active(name, active).await?;
        tracing::info!(
            "backend cluster {} has been {} (previous status: active={})",
            name,
            if active { "activated" } else { "deactivated" },
            previous
        );
        self.relay.on_backend_activation_changed(name, active);
        Ok(())
    }

    pub async fn get_all_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
        self.store.list_backends().await
    }

    pub async fn get_all_active_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
        self.store.list_active_backends().await
    }

    pub async fn get_active_backends(
        &self,
        routing_group: &str,
    ) -> Result<Vec<BackendConfig>, StoreError> {
        self.store.list_active_backends_by_group(routing_group).await
    }

    /// Active backends of the ad-hoc group; empty if the store is down.
    pub async fn get_active_adhoc_backends(&self) -> Vec<BackendConfig> {
        match self.store.list_active_backends_by_group(ADHOC_ROUTING_GROUP).await {
            Ok(backends) => backends,
            Err(e) => {
                tracing::info!("error fetching adhoc backends: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_backend_by_name(
        &self,
        name: &str,
    ) -> Result<Option<BackendConfig>, StoreError> {
        self.store.get_backend(name).await
    }
}
