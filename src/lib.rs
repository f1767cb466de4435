//! gateway-ha Library
//!
//! Backend administration for a query gateway with a self-healing
//! per-cluster metrics registry. Exposed as a library for integration
//! tests and embedding.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{
    AdminMutationRelay, GatewayBackendService, MetricsError, MetricsRegistry, ReconcileReport,
    ReconciliationScheduler,
};
pub use config::{load_config, Config, StoreBackend};
pub use domain::entities::BackendConfig;
pub use domain::ports::{BackendStore, MetricSink, SinkError, StoreError};
pub use domain::value_objects::ActivationStatus;
