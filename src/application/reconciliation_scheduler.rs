//! Reconciliation Scheduler
//!
//! Drives full registry refreshes on a fixed period and on demand.
//! At most one pass runs at a time; concurrent triggers are coalesced
//! into a single follow-up pass.

use crate::application::metrics_registry::{MetricsError, MetricsRegistry, ReconcileReport};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Default period between scheduled passes.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(30);

/// Default debounce window for access-triggered passes.
pub const DEFAULT_ACCESS_DEBOUNCE: Duration = Duration::from_secs(1);

/// Pass counters for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
}

struct PeriodicTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Periodic and on-demand driver for [`MetricsRegistry::refresh`].
pub struct ReconciliationScheduler {
    registry: Arc<MetricsRegistry>,
    /// Held for the whole duration of a pass
    pass_lock: Mutex<()>,
    /// Incremented when a pass starts, under `pass_lock`
    passes_started: AtomicU64,
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
    /// A background request is queued and has not started its pass
    request_pending: AtomicBool,
    /// Last access-triggered pass
    last_access_trigger: SyncMutex<Option<Instant>>,
    access_debounce: Duration,
    periodic: SyncMutex<Option<PeriodicTask>>,
}

impl ReconciliationScheduler {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            pass_lock: Mutex::new(()),
            passes_started: AtomicU64::new(0),
            passes_completed: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            request_pending: AtomicBool::new(false),
            last_access_trigger: SyncMutex::new(None),
            access_debounce: DEFAULT_ACCESS_DEBOUNCE,
            periodic: SyncMutex::new(None),
        }
    }

    /// Set the debounce window used by [`trigger_on_access`](Self::trigger_on_access).
    pub fn with_access_debounce(mut self, debounce: Duration) -> Self {
        self.access_debounce = debounce;
        self
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            passes_started: self.passes_started.load(Ordering::SeqCst),
            passes_completed: self.passes_completed.load(Ordering::SeqCst),
            passes_failed: self.passes_failed.load(Ordering::SeqCst),
        }
    }

    /// Whether the periodic loop is running.
    pub fn is_running(&self) -> bool {
        self.periodic
            .lock()
            .as_ref()
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Start periodic passes. The first pass runs immediately.
    pub fn start(self: &Arc<Self>, period: Duration) {
        let mut periodic = self.periodic.lock();
        if periodic.is_some() {
            tracing::warn!("metrics reconciliation already running");
            return;
        }

        tracing::info!(?period, "running periodic metric refresh");
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            // The first tick of a tokio interval completes immediately
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }
                let _ = scheduler.run_pass().await;
            }
            tracing::debug!("periodic metric refresh stopped");
        });

        *periodic = Some(PeriodicTask {
            handle,
            shutdown_tx,
        });
    }

    /// Stop periodic passes, letting an in-flight pass finish.
    pub async fn stop(&self) {
        let task = self.periodic.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            if let Err(e) = task.handle.await {
                tracing::error!(error = %e, "periodic metric refresh task failed");
            }
            tracing::info!("stopped periodic metric refresh");
        }
    }

    /// Run a pass that starts after this call, or wait for one.
    ///
    /// If another caller runs a pass that started after this trigger was
    /// requested, that pass satisfies this trigger and no extra pass runs.
    pub async fn trigger_now(&self) -> Result<ReconcileReport, MetricsError> {
        let ticket = self.passes_started.load(Ordering::SeqCst);
        let _pass = self.pass_lock.lock().await;
        if self.passes_started.load(Ordering::SeqCst) > ticket {
            // Someone else started and finished a pass after we asked.
            return Ok(ReconcileReport::default());
        }
        self.run_pass_locked().await
    }

    /// Queue a background pass without waiting for it.
    ///
    /// At most one request is pending at any time; further requests are
    /// folded into it.
    pub fn request(self: &Arc<Self>) {
        if self.request_pending.swap(true, Ordering::SeqCst) {
            tracing::trace!("reconciliation request coalesced");
            return;
        }
        let scheduler = self.clone();
        tokio::spawn(async move {
            let _pass = scheduler.pass_lock.lock().await;
            scheduler.request_pending.store(false, Ordering::SeqCst);
            let _ = scheduler.run_pass_locked().await;
        });
    }

    /// Debounced trigger for read access to the inspection endpoint.
    ///
    /// Returns `true` when this call ran (or waited for) a pass, `false`
    /// when it fell inside the debounce window of an earlier access.
    pub async fn trigger_on_access(&self) -> bool {
        {
            let mut last = self.last_access_trigger.lock();
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.access_debounce {
                    return false;
                }
            }
            *last = Some(now);
        }
        tracing::debug!("inspection access triggered metrics refresh");
        let _ = self.trigger_now().await;
        true
    }

    async fn run_pass(&self) -> Result<ReconcileReport, MetricsError> {
        let _pass = self.pass_lock.lock().await;
        self.run_pass_locked().await
    }

    /// Must be called with `pass_lock` held.
    async fn run_pass_locked(&self) -> Result<ReconcileReport, MetricsError> {
        self.passes_started.fetch_add(1, Ordering::SeqCst);
        match self.registry.refresh().await {
            Ok(report) => {
                self.passes_completed.fetch_add(1, Ordering::SeqCst);
                if !report.is_clean() {
                    tracing::warn!(
                        failed = report.failures.len(),
                        "metric refresh left clusters unreconciled"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                self.passes_failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(error = %e, "error refreshing backend metrics");
                Err(e)
            }
        }
    }
}
