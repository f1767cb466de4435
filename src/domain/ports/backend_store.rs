//! Backend Store Port
//!
//! Defines the interface for the authoritative backend configuration.
//! Implementations may use SQLite or in-memory storage.

use crate::domain::entities::BackendConfig;
use async_trait::async_trait;

/// Errors returned by a [`BackendStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or failed mid-operation.
    #[error("backend store unavailable: {0}")]
    Unavailable(String),
    /// The store did not answer within the configured bound.
    #[error("backend store timed out after {0}ms")]
    Timeout(u64),
    /// A backend with this name already exists.
    #[error("backend {0} already exists")]
    AlreadyExists(String),
    /// No backend with this name exists.
    #[error("backend {0} not found")]
    NotFound(String),
}

impl StoreError {
    /// Whether retrying later can succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Authoritative source of the current backend set.
///
/// This is an outbound port. URLs are normalized (no trailing slash)
/// by every implementation before they are persisted.
#[async_trait]
pub trait BackendStore: Send + Sync {
    /// Get every configured backend, active or not.
    async fn list_backends(&self) -> Result<Vec<BackendConfig>, StoreError>;

    /// Get every active backend.
    async fn list_active_backends(&self) -> Result<Vec<BackendConfig>, StoreError>;

    /// Get the active backends of one routing group.
    async fn list_active_backends_by_group(
        &self,
        routing_group: &str,
    ) -> Result<Vec<BackendConfig>, StoreError>;

    /// Get a backend by name.
    async fn get_backend(&self, name: &str) -> Result<Option<BackendConfig>, StoreError>;

    /// Insert a new backend. Fails with `AlreadyExists` on a name clash.
    async fn create_backend(&self, backend: &BackendConfig) -> Result<BackendConfig, StoreError>;

    /// Update a backend, creating it when absent.
    ///
    /// Returns the stored config and whether a new row was created.
    async fn update_backend(
        &self,
        backend: &BackendConfig,
    ) -> Result<(BackendConfig, bool), StoreError>;

    /// Delete a backend. Deleting an absent name is not an error.
    async fn delete_backend(&self, name: &str) -> Result<(), StoreError>;

    /// Flip the active flag, returning the previous value.
    async fn set_active(&self, name: &str, active: bool) -> Result<bool, StoreError>;
}
