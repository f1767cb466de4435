//! Application Layer
//!
//! Use cases that coordinate the backend store and the metrics sink.

pub mod admin_relay;
pub mod backend_service;
pub mod metrics_registry;
pub mod reconciliation_scheduler;

pub use admin_relay::AdminMutationRelay;
pub use backend_service::GatewayBackendService;
pub use metrics_registry::{
    ClusterActivationGauge, MetricsError, MetricsRegistry, ReconcileReport, RegisterOutcome,
    RegistryGuard, UnregisterOutcome, DEFAULT_STORE_TIMEOUT,
};
pub use reconciliation_scheduler::{
    ReconciliationScheduler, SchedulerStats, DEFAULT_ACCESS_DEBOUNCE, DEFAULT_REFRESH_PERIOD,
};
