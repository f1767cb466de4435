mod backend_store;
mod metric_sink;

pub use backend_store::{BackendStore, StoreError};
pub use metric_sink::{ClusterMetric, GaugeReading, MetricSink, SinkError};
