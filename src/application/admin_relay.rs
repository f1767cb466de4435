//! Admin Mutation Relay
//!
//! Turns committed administrative mutations into targeted registry calls.
//! This is the low-latency path; periodic reconciliation stays the source
//! of truth and repairs anything the relay misses.

use crate::application::metrics_registry::{MetricsRegistry, RegisterOutcome, UnregisterOutcome};
use crate::application::reconciliation_scheduler::ReconciliationScheduler;
use crate::domain::entities::BackendConfig;
use crate::domain::ports::StoreError;
use std::future::Future;
use std::sync::Arc;

/// Incremental registry updates for administrative mutations.
pub struct AdminMutationRelay {
    registry: Arc<MetricsRegistry>,
    scheduler: Option<Arc<ReconciliationScheduler>>,
}

impl AdminMutationRelay {
    /// Relay that only performs incremental updates.
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            scheduler: None,
        }
    }

    /// Also request a background reconciliation after every mutation.
    pub fn with_scheduler(mut self, scheduler: Arc<ReconciliationScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// A backend was created.
    pub async fn on_backend_added(&self, backend: &BackendConfig) -> RegisterOutcome {
        let outcome = self.registry.register(&backend.name).await;
        tracing::info!(cluster = %backend.name, ?outcome, "added backend");
        self.follow_up();
        outcome
    }

    /// A backend was updated; `existed` is whether it was present before.
    ///
    /// Status is derived when the gauge is read, so an update of an
    /// existing backend needs no registry change.
    pub async fn on_backend_updated(
        &self,
        backend: &BackendConfig,
        existed: bool,
    ) -> Option<RegisterOutcome> {
        let outcome = if existed {
            None
        } else {
            let outcome = self.registry.register(&backend.name).await;
            tracing::info!(cluster = %backend.name, ?outcome, "registered metrics for backend created via update");
            Some(outcome)
        };
        self.follow_up();
        outcome
    }

    /// Delete a backend: unregister first, then run `commit`.
    ///
    /// Both steps happen inside one registry critical section, so no
    /// reconciliation pass can observe the backend between them. `commit`
    /// is bounded by the registry's store timeout. If it fails the gauge is
    /// restored before the section ends.
    pub async fn on_backend_deleted<F>(&self, name: &str, commit: F) -> Result<(), StoreError>
    where
        F: Future<Output = Result<(), StoreError>> + Send,
    {
        let timeout = self.registry.store_timeout();
        let mut guard = self.registry.lock().await;
        let unregistered = guard.unregister(name);

        let committed = match tokio::time::timeout(timeout, commit).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
        };

        match committed {
            Ok(()) => {
                drop(guard);
                tracing::info!(cluster = %name, outcome = ?unregistered, "removed backend and unregistered its metrics");
                self.follow_up();
                Ok(())
            }
            Err(e) => {
                if unregistered == UnregisterOutcome::Unregistered {
                    guard.register(name);
                }
                drop(guard);
                tracing::warn!(cluster = %name, error = %e, "backend delete failed, metrics restored");
                Err(e)
            }
        }
    }

    /// Activation changed; the gauge picks this up on its next read.
    pub fn on_backend_activation_changed(&self, name: &str, active: bool) {
        tracing::debug!(cluster = %name, active, "backend activation changed");
        self.follow_up();
    }

    fn follow_up(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.request();
        }
    }
}
