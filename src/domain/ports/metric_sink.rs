//! Metric Sink Port
//!
//! Defines where per-cluster metric objects become externally observable.

use async_trait::async_trait;
use std::sync::Arc;

/// Errors returned by a [`MetricSink`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink refused the call.
    #[error("metric sink unavailable: {0}")]
    Unavailable(String),
    /// An object is already exported under this key.
    #[error("metric key {0} already exported")]
    DuplicateKey(String),
    /// Nothing is exported under this key.
    #[error("metric key {0} not exported")]
    UnknownKey(String),
}

/// One gauge sample read from a metric object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeReading {
    /// Metric family name, without the exporter prefix
    pub name: &'static str,
    /// One-line description for exposition
    pub help: &'static str,
    /// Current value
    pub value: i64,
}

/// A live metric object for one cluster.
///
/// Values are computed when the object is read, never at export time.
#[async_trait]
pub trait ClusterMetric: Send + Sync {
    /// Cluster this object reports on.
    fn cluster_name(&self) -> &str;

    /// Read every gauge this object exposes.
    async fn read(&self) -> Vec<GaugeReading>;
}

/// Process-wide exporter for metric objects.
///
/// Calls are synchronous and bounded; implementations must not call
/// back into the registry.
pub trait MetricSink: Send + Sync {
    /// Make `metric` observable under `key`.
    fn export(&self, key: &str, metric: Arc<dyn ClusterMetric>) -> Result<(), SinkError>;

    /// Stop exposing the object under `key`.
    fn unexport(&self, key: &str) -> Result<(), SinkError>;
}
