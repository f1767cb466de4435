mod dashmap_backend_store;
mod prometheus_metric_sink;
mod sqlite_backend_store;

pub use dashmap_backend_store::DashMapBackendStore;
pub use prometheus_metric_sink::PrometheusMetricSink;
pub use sqlite_backend_store::SqliteBackendStore;
