//! Backend Metrics Registry
//!
//! Keeps exactly one exported activation gauge per live backend cluster.
//! The registry is the only owner of the cluster -> handle map; every
//! mutation happens behind one async lock, and a whole reconciliation
//! pass runs inside a single critical section.

use crate::domain::ports::{BackendStore, ClusterMetric, GaugeReading, MetricSink, SinkError, StoreError};
use crate::domain::value_objects::ActivationStatus;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Default bound for store calls made while the registry lock is held.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures of the metrics plumbing.
///
/// None of these are fatal: they leave a cluster unreconciled until the
/// next pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("backend store unavailable: {0}")]
    StoreUnavailable(StoreError),
    #[error("failed to export metrics for cluster {cluster}: {source}")]
    SinkExportFailure { cluster: String, source: SinkError },
    #[error("failed to unexport metrics for cluster {cluster}: {source}")]
    SinkUnexportFailure { cluster: String, source: SinkError },
}

impl MetricsError {
    /// Cluster the failure refers to, if any.
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Self::StoreUnavailable(_) => None,
            Self::SinkExportFailure { cluster, .. } | Self::SinkUnexportFailure { cluster, .. } => {
                Some(cluster)
            }
        }
    }
}

impl From<StoreError> for MetricsError {
    fn from(e: StoreError) -> Self {
        Self::StoreUnavailable(e)
    }
}

/// Result of a `register` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new gauge was exported.
    Registered,
    /// A handle already existed; nothing changed.
    AlreadyRegistered,
    /// The sink refused the export; no handle was kept.
    Failed(MetricsError),
}

/// Result of an `unregister` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnregisterOutcome {
    /// The gauge was unexported and its handle dropped.
    Unregistered,
    /// No handle existed; nothing changed.
    NotRegistered,
    /// The sink refused; the handle is kept for retry.
    Failed(MetricsError),
}

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Clusters newly registered, sorted
    pub added: Vec<String>,
    /// Clusters unregistered, sorted
    pub removed: Vec<String>,
    /// Clusters left unreconciled
    pub failures: Vec<MetricsError>,
}

impl ReconcileReport {
    /// True when the pass issued no sink calls.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failures.is_empty()
    }

    /// True when every planned change was applied.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Activation gauge for one cluster.
///
/// The value is looked up in the backend store each time the gauge is
/// read, so activation flips show up without re-registration.
pub struct ClusterActivationGauge {
    cluster_name: String,
    store: Arc<dyn BackendStore>,
}

impl ClusterActivationGauge {
    pub fn new(cluster_name: impl Into<String>, store: Arc<dyn BackendStore>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            store,
        }
    }

    /// Current activation status; `Unknown` if the backend is gone or
    /// the store cannot answer.
    pub async fn activation_status(&self) -> ActivationStatus {
        match self.store.get_backend(&self.cluster_name).await {
            Ok(backend) => ActivationStatus::from_active(backend.map(|b| b.active)),
            Err(e) => {
                tracing::debug!(cluster = %self.cluster_name, error = %e, "activation status unavailable");
                ActivationStatus::Unknown
            }
        }
    }
}

#[async_trait]
impl ClusterMetric for ClusterActivationGauge {
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    async fn read(&self) -> Vec<GaugeReading> {
        vec![GaugeReading {
            name: "activation_status",
            help: "Backend cluster activation status (1 active, 0 inactive, -1 unknown)",
            value: self.activation_status().await.as_gauge(),
        }]
    }
}

/// The registry's record that a gauge is installed in the sink.
struct MetricHandle {
    metric: Arc<ClusterActivationGauge>,
}

/// Registry of exported per-cluster metrics.
pub struct MetricsRegistry {
    handles: Mutex<HashMap<String, MetricHandle>>,
    store: Arc<dyn BackendStore>,
    sink: Arc<dyn MetricSink>,
    store_timeout: Duration,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new(store: Arc<dyn BackendStore>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            store,
            sink,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Set the bound for store calls made while the lock is held.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Enter the registry's critical section.
    ///
    /// Everything done through the returned guard is serialized against
    /// every other registry mutation until the guard is dropped.
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            handles: self.handles.lock().await,
            registry: self,
        }
    }

    /// Export a gauge for `cluster_name` unless one is already tracked.
    pub async fn register(&self, cluster_name: &str) -> RegisterOutcome {
        self.lock().await.register(cluster_name)
    }

    /// Unexport and forget the gauge for `cluster_name`, if any.
    pub async fn unregister(&self, cluster_name: &str) -> UnregisterOutcome {
        self.lock().await.unregister(cluster_name)
    }

    /// Converge the tracked set onto `current_backends`.
    pub async fn reconcile(&self, current_backends: &HashSet<String>) -> ReconcileReport {
        self.lock().await.reconcile(current_backends)
    }

    /// List the store and reconcile against it in one critical section.
    pub async fn refresh(&self) -> Result<ReconcileReport, MetricsError> {
        let mut guard = self.lock().await;
        let current = guard.current_backend_names().await?;
        Ok(guard.reconcile(&current))
    }

    /// Status of every tracked cluster.
    ///
    /// The key set is captured atomically; statuses are derived from one
    /// store listing taken right after.
    pub async fn snapshot(&self) -> BTreeMap<String, ActivationStatus> {
        let names = self.registered_names().await;
        if names.is_empty() {
            return BTreeMap::new();
        }

        let active: HashMap<String, bool> = match self.bounded(self.store.list_backends()).await {
            Ok(backends) => backends.into_iter().map(|b| (b.name, b.active)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot could not read backend store");
                HashMap::new()
            }
        };

        names
            .into_iter()
            .map(|name| {
                let status = ActivationStatus::from_active(active.get(&name).copied());
                (name, status)
            })
            .collect()
    }

    /// Status of one cluster; `Unknown` when it has no handle.
    pub async fn status(&self, cluster_name: &str) -> ActivationStatus {
        let metric = self
            .handles
            .lock()
            .await
            .get(cluster_name)
            .map(|h| h.metric.clone());
        match metric {
            Some(metric) => metric.activation_status().await,
            None => ActivationStatus::Unknown,
        }
    }

    /// Names of tracked clusters, sorted.
    pub async fn registered_names(&self) -> BTreeSet<String> {
        self.handles.lock().await.keys().cloned().collect()
    }

    pub async fn is_registered(&self, cluster_name: &str) -> bool {
        self.handles.lock().await.contains_key(cluster_name)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout.as_millis() as u64)),
        }
    }
}

/// Exclusive access to the registry map.
pub struct RegistryGuard<'a> {
    handles: MutexGuard<'a, HashMap<String, MetricHandle>>,
    registry: &'a MetricsRegistry,
}

impl RegistryGuard<'_> {
    /// See [`MetricsRegistry::register`].
    pub fn register(&mut self, cluster_name: &str) -> RegisterOutcome {
        if self.handles.contains_key(cluster_name) {
            tracing::debug!(cluster = %cluster_name, "metrics already registered");
            return RegisterOutcome::AlreadyRegistered;
        }

        let metric = Arc::new(ClusterActivationGauge::new(
            cluster_name,
            self.registry.store.clone(),
        ));
        match self
            .registry
            .sink
            .export(cluster_name, metric.clone() as Arc<dyn ClusterMetric>)
        {
            Ok(()) => {
                self.handles
                    .insert(cluster_name.to_string(), MetricHandle { metric });
                tracing::info!(cluster = %cluster_name, "registered metrics for cluster");
                RegisterOutcome::Registered
            }
            Err(SinkError::DuplicateKey(_)) => {
                // The sink already exposes this key; track it so a later
                // unregister removes it.
                self.handles
                    .insert(cluster_name.to_string(), MetricHandle { metric });
                tracing::warn!(
                    cluster = %cluster_name,
                    "metrics key already exported, adopting existing export"
                );
                RegisterOutcome::AlreadyRegistered
            }
            Err(source) => {
                let err = MetricsError::SinkExportFailure {
                    cluster: cluster_name.to_string(),
                    source,
                };
                tracing::error!(cluster = %cluster_name, error = %err, "failed to register metrics for cluster");
                RegisterOutcome::Failed(err)
            }
        }
    }

    /// See [`MetricsRegistry::unregister`].
    pub fn unregister(&mut self, cluster_name: &str) -> UnregisterOutcome {
        if !self.handles.contains_key(cluster_name) {
            return UnregisterOutcome::NotRegistered;
        }

        match self.registry.sink.unexport(cluster_name) {
            Ok(()) | Err(SinkError::UnknownKey(_)) => {
                self.handles.remove(cluster_name);
                tracing::info!(cluster = %cluster_name, "unregistered metrics for cluster");
                UnregisterOutcome::Unregistered
            }
            Err(source) => {
                let err = MetricsError::SinkUnexportFailure {
                    cluster: cluster_name.to_string(),
                    source,
                };
                tracing::error!(cluster = %cluster_name, error = %err, "failed to unregister metrics for cluster");
                UnregisterOutcome::Failed(err)
            }
        }
    }

    /// See [`MetricsRegistry::reconcile`].
    pub fn reconcile(&mut self, current_backends: &HashSet<String>) -> ReconcileReport {
        let mut to_remove: Vec<String> = self
            .handles
            .keys()
            .filter(|name| !current_backends.contains(*name))
            .cloned()
            .collect();
        let mut to_add: Vec<String> = current_backends
            .iter()
            .filter(|name| !self.handles.contains_key(*name))
            .cloned()
            .collect();
        to_remove.sort();
        to_add.sort();

        let mut report = ReconcileReport::default();
        for name in to_remove {
            match self.unregister(&name) {
                UnregisterOutcome::Unregistered => report.removed.push(name),
                UnregisterOutcome::NotRegistered => {}
                UnregisterOutcome::Failed(err) => report.failures.push(err),
            }
        }
        for name in to_add {
            match self.register(&name) {
                RegisterOutcome::Registered => report.added.push(name),
                RegisterOutcome::AlreadyRegistered => {}
                RegisterOutcome::Failed(err) => report.failures.push(err),
            }
        }

        if !report.is_noop() {
            tracing::info!(
                added = report.added.len(),
                removed = report.removed.len(),
                failed = report.failures.len(),
                tracked = self.handles.len(),
                "reconciled backend metrics"
            );
        }
        report
    }

    /// Names of every backend in the store, bounded by the store timeout.
    pub async fn current_backend_names(&self) -> Result<HashSet<String>, MetricsError> {
        let backends = self
            .registry
            .bounded(self.registry.store.list_backends())
            .await?;
        Ok(backends.into_iter().map(|b| b.name).collect())
    }

    pub fn is_registered(&self, cluster_name: &str) -> bool {
        self.handles.contains_key(cluster_name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DashMapBackendStore, PrometheusMetricSink};
    use crate::domain::entities::BackendConfig;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Sink wrapper that counts calls and can be told to fail.
    struct ScriptedSink {
        inner: PrometheusMetricSink,
        fail_export: AtomicBool,
        fail_unexport: AtomicBool,
        export_calls: AtomicUsize,
        unexport_calls: AtomicUsize,
        exported: parking_lot::Mutex<Vec<String>>,
        unexported: parking_lot::Mutex<Vec<String>>,
    }

    impl ScriptedSink {
        fn new() -> Self {
            Self {
                inner: PrometheusMetricSink::default(),
                fail_export: AtomicBool::new(false),
                fail_unexport: AtomicBool::new(false),
                export_calls: AtomicUsize::new(0),
                unexport_calls: AtomicUsize::new(0),
                exported: parking_lot::Mutex::new(Vec::new()),
                unexported: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    impl MetricSink for ScriptedSink {
        fn export(&self, key: &str, metric: Arc<dyn ClusterMetric>) -> Result<(), SinkError> {
            self.export_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_export.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("scripted".to_string()));
            }
            self.inner.export(key, metric)?;
            self.exported.lock().push(key.to_string());
            Ok(())
        }

        fn unexport(&self, key: &str) -> Result<(), SinkError> {
            self.unexport_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_unexport.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("scripted".to_string()));
            }
            self.inner.unexport(key)?;
            self.unexported.lock().push(key.to_string());
            Ok(())
        }
    }

    /// Store that is always down.
    struct DownStore;

    #[async_trait]
    impl BackendStore for DownStore {
        async fn list_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn list_active_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn list_active_backends_by_group(
            &self,
            _routing_group: &str,
        ) -> Result<Vec<BackendConfig>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get_backend(&self, _name: &str) -> Result<Option<BackendConfig>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn create_backend(&self, _b: &BackendConfig) -> Result<BackendConfig, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn update_backend(
            &self,
            _b: &BackendConfig,
        ) -> Result<(BackendConfig, bool), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn delete_backend(&self, _name: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn set_active(&self, _name: &str, _active: bool) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// Store whose listing never finishes in time.
    struct StalledStore;

    #[async_trait]
    impl BackendStore for StalledStore {
        async fn list_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
        async fn list_active_backends(&self) -> Result<Vec<BackendConfig>, StoreError> {
            Ok(Vec::new())
        }
        async fn list_active_backends_by_group(
            &self,
            _routing_group: &str,
        ) -> Result<Vec<BackendConfig>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_backend(&self, _name: &str) -> Result<Option<BackendConfig>, StoreError> {
            Ok(None)
        }
        async fn create_backend(&self, b: &BackendConfig) -> Result<BackendConfig, StoreError> {
            Ok(b.clone())
        }
        async fn update_backend(
            &self,
            b: &BackendConfig,
        ) -> Result<(BackendConfig, bool), StoreError> {
            Ok((b.clone(), false))
        }
        async fn delete_backend(&self, _name: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn set_active(&self, _name: &str, _active: bool) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn setup() -> (Arc<DashMapBackendStore>, Arc<ScriptedSink>, MetricsRegistry) {
        let store = Arc::new(DashMapBackendStore::new());
        let sink = Arc::new(ScriptedSink::new());
        let registry = MetricsRegistry::new(store.clone(), sink.clone());
        (store, sink, registry)
    }

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn add_backend(store: &DashMapBackendStore, name: &str, active: bool) {
        store
            .create_backend(&BackendConfig::new(
                name,
                "adhoc",
                format!("http://{}:8080", name),
                format!("http://{}:8080", name),
                active,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (_, sink, registry) = setup();

        assert_eq!(registry.register("x").await, RegisterOutcome::Registered);
        assert_eq!(registry.register("x").await, RegisterOutcome::AlreadyRegistered);

        assert_eq!(sink.export_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let (_, sink, registry) = setup();

        assert_eq!(registry.unregister("ghost").await, UnregisterOutcome::NotRegistered);
        assert_eq!(sink.unexport_calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_then_unregister() {
        let (_, sink, registry) = setup();

        registry.register("x").await;
        assert_eq!(registry.unregister("x").await, UnregisterOutcome::Unregistered);
        assert!(!registry.is_registered("x").await);
        assert!(sink.inner.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_diff() {
        let (_, sink, registry) = setup();
        for name in ["a", "b", "c"] {
            registry.register(name).await;
        }
        sink.exported.lock().clear();

        let report = registry.reconcile(&names(&["b", "c", "d"])).await;

        assert_eq!(report.added, vec!["d"]);
        assert_eq!(report.removed, vec!["a"]);
        assert!(report.is_clean());
        assert_eq!(*sink.exported.lock(), vec!["d"]);
        assert_eq!(*sink.unexported.lock(), vec!["a"]);
        let tracked: Vec<String> = registry.registered_names().await.into_iter().collect();
        assert_eq!(tracked, vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_reconcile_same_set_is_noop() {
        let (_, sink, registry) = setup();
        registry.reconcile(&names(&["a", "b"])).await;
        let calls = sink.export_calls.load(Ordering::SeqCst);

        let report = registry.reconcile(&names(&["a", "b"])).await;

        assert!(report.is_noop());
        assert_eq!(sink.export_calls.load(Ordering::SeqCst), calls);
        assert_eq!(sink.unexport_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconcile_to_empty() {
        let (_, _, registry) = setup();
        registry.reconcile(&names(&["a", "b"])).await;

        let report = registry.reconcile(&HashSet::new()).await;
        assert_eq!(report.removed, vec!["a", "b"]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_export_leaves_no_handle_and_retries() {
        let (_, sink, registry) = setup();
        sink.fail_export.store(true, Ordering::SeqCst);

        let outcome = registry.register("x").await;
        assert!(matches!(
            outcome,
            RegisterOutcome::Failed(MetricsError::SinkExportFailure { ref cluster, .. }) if cluster == "x"
        ));
        assert!(!registry.is_registered("x").await);

        let report = registry.reconcile(&names(&["x"])).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].cluster(), Some("x"));

        sink.fail_export.store(false, Ordering::SeqCst);
        let report = registry.reconcile(&names(&["x"])).await;
        assert_eq!(report.added, vec!["x"]);
        assert!(registry.is_registered("x").await);
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_unexport_keeps_handle_and_retries() {
        let (_, sink, registry) = setup();
        registry.register("x").await;
        sink.fail_unexport.store(true, Ordering::SeqCst);

        let outcome = registry.unregister("x").await;
        assert!(matches!(
            outcome,
            UnregisterOutcome::Failed(MetricsError::SinkUnexportFailure { .. })
        ));
        assert!(registry.is_registered("x").await);
        assert!(sink.inner.contains("x"));

        let report = registry.reconcile(&HashSet::new()).await;
        assert_eq!(report.failures.len(), 1);
        assert!(registry.is_registered("x").await);

        sink.fail_unexport.store(false, Ordering::SeqCst);
        let report = registry.reconcile(&HashSet::new()).await;
        assert_eq!(report.removed, vec!["x"]);
        assert!(sink.inner.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_key_counts_as_registered() {
        let (store, sink, registry) = setup();
        // An export left behind outside the registry's knowledge
        let orphan = Arc::new(ClusterActivationGauge::new("x", store.clone()));
        sink.inner.export("x", orphan).unwrap();

        assert_eq!(registry.register("x").await, RegisterOutcome::AlreadyRegistered);
        assert!(registry.is_registered("x").await);

        assert_eq!(registry.unregister("x").await, UnregisterOutcome::Unregistered);
        assert!(sink.inner.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_key_on_unexport_drops_handle() {
        let (_, sink, registry) = setup();
        registry.register("x").await;
        // Removed behind the registry's back
        sink.inner.unexport("x").unwrap();

        assert_eq!(registry.unregister("x").await, UnregisterOutcome::Unregistered);
        assert!(!registry.is_registered("x").await);
    }

    #[tokio::test]
    async fn test_concurrent_register_single_handle() {
        let (_, sink, registry) = setup();
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.register("x").await })
            })
            .collect();
        let outcomes = futures::future::join_all(tasks).await;

        let registered = outcomes
            .into_iter()
            .map(|o| o.unwrap())
            .filter(|o| *o == RegisterOutcome::Registered)
            .count();
        assert_eq!(registered, 1);
        assert_eq!(sink.export_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_status_derived_on_read() {
        let (store, _, registry) = setup();
        add_backend(&store, "adhoc1", true).await;
        registry.register("adhoc1").await;

        assert_eq!(registry.status("adhoc1").await, ActivationStatus::Active);

        store.set_active("adhoc1", false).await.unwrap();
        assert_eq!(registry.status("adhoc1").await, ActivationStatus::Inactive);
        assert_eq!(
            registry.snapshot().await.get("adhoc1"),
            Some(&ActivationStatus::Inactive)
        );
    }

    #[tokio::test]
    async fn test_status_untracked_is_unknown() {
        let (store, _, registry) = setup();
        add_backend(&store, "adhoc1", true).await;

        assert_eq!(registry.status("adhoc1").await, ActivationStatus::Unknown);
        assert_eq!(registry.status("adhoc1").await.as_gauge(), -1);
    }

    #[tokio::test]
    async fn test_status_after_backend_vanished() {
        let (store, _, registry) = setup();
        add_backend(&store, "adhoc1", true).await;
        registry.register("adhoc1").await;
        store.delete_backend("adhoc1").await.unwrap();

        assert_eq!(registry.status("adhoc1").await, ActivationStatus::Unknown);
    }

    #[tokio::test]
    async fn test_refresh_converges_to_store() {
        let (store, _, registry) = setup();
        add_backend(&store, "a", true).await;
        add_backend(&store, "b", false).await;
        registry.register("stale").await;

        let report = registry.refresh().await.unwrap();

        assert_eq!(report.added, vec!["a", "b"]);
        assert_eq!(report.removed, vec!["stale"]);
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], ActivationStatus::Active);
        assert_eq!(snapshot["b"], ActivationStatus::Inactive);
    }

    #[tokio::test]
    async fn test_refresh_store_unavailable_keeps_state() {
        let sink = Arc::new(ScriptedSink::new());
        let registry = MetricsRegistry::new(Arc::new(DownStore), sink.clone());
        registry.register("x").await;

        let err = registry.refresh().await.unwrap_err();
        assert!(matches!(err, MetricsError::StoreUnavailable(StoreError::Unavailable(_))));
        assert!(registry.is_registered("x").await);
        assert_eq!(sink.unexport_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_store_timeout() {
        let sink = Arc::new(ScriptedSink::new());
        let registry = MetricsRegistry::new(Arc::new(StalledStore), sink)
            .with_store_timeout(Duration::from_millis(20));

        let err = registry.refresh().await.unwrap_err();
        assert_eq!(err, MetricsError::StoreUnavailable(StoreError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_snapshot_with_store_down_reports_unknown() {
        let sink = Arc::new(ScriptedSink::new());
        let registry = MetricsRegistry::new(Arc::new(DownStore), sink);
        registry.register("x").await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.get("x"), Some(&ActivationStatus::Unknown));
    }

    #[tokio::test]
    async fn test_gauge_reading() {
        let (store, _, _) = setup();
        add_backend(&store, "etl1", false).await;
        let gauge = ClusterActivationGauge::new("etl1", store.clone());

        let readings = gauge.read().await;
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].name, "activation_status");
        assert_eq!(readings[0].value, 0);
        assert_eq!(gauge.cluster_name(), "etl1");
    }

    #[tokio::test]
    async fn test_guard_serializes_batch() {
        let (_, _, registry) = setup();
        let registry = Arc::new(registry);

        let mut guard = registry.lock().await;
        guard.register("a");

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.reconcile(&HashSet::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The contender cannot have run yet
        assert!(guard.is_registered("a"));
        guard.register("b");
        assert_eq!(guard.len(), 2);
        drop(guard);

        let report = contender.await.unwrap();
        assert_eq!(report.removed, vec!["a", "b"]);
    }
}
