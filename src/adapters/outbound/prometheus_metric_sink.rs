//! Prometheus Metric Sink
//!
//! Implements MetricSink by holding exported cluster metric objects and
//! rendering them in Prometheus text format on scrape.

use crate::domain::ports::{ClusterMetric, GaugeReading, MetricSink, SinkError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Exporter that renders cluster gauges for Prometheus scraping.
pub struct PrometheusMetricSink {
    /// Exported objects by key
    exported: DashMap<String, Arc<dyn ClusterMetric>>,
    /// Metric name prefix
    namespace: String,
    /// Successful export calls
    exports: AtomicU64,
    /// Successful unexport calls
    unexports: AtomicU64,
}

impl PrometheusMetricSink {
    /// Create a sink that prefixes every family with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            exported: DashMap::new(),
            namespace: namespace.into(),
            exports: AtomicU64::new(0),
            unexports: AtomicU64::new(0),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.exported.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.exported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exported.is_empty()
    }

    /// Total successful export calls since creation.
    pub fn export_count(&self) -> u64 {
        self.exports.load(Ordering::Relaxed)
    }

    /// Total successful unexport calls since creation.
    pub fn unexport_count(&self) -> u64 {
        self.unexports.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format.
    ///
    /// Objects are read after being cloned out of the map so no shard
    /// lock is held while a gauge queries its backend.
    pub async fn export_prometheus(&self) -> String {
        let mut metrics: Vec<(String, Arc<dyn ClusterMetric>)> = self
            .exported
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));

        // family name -> (help, samples)
        let mut families: BTreeMap<&'static str, (&'static str, Vec<(String, i64)>)> =
            BTreeMap::new();
        for (_, metric) in &metrics {
            for GaugeReading { name, help, value } in metric.read().await {
                families
                    .entry(name)
                    .or_insert_with(|| (help, Vec::new()))
                    .1
                    .push((metric.cluster_name().to_string(), value));
            }
        }

        let mut output = String::new();
        for (name, (help, samples)) in families {
            let family = format!("{}_cluster_{}", self.namespace, name);
            output.push_str(&format!("# HELP {} {}\n", family, help));
            output.push_str(&format!("# TYPE {} gauge\n", family));
            for (cluster, value) in samples {
                output.push_str(&format!(
                    "{}{{cluster=\"{}\"}} {}\n",
                    family,
                    escape_label(&cluster),
                    value
                ));
            }
        }
        output
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl Default for PrometheusMetricSink {
    fn default() -> Self {
        Self::new("gateway")
    }
}

impl MetricSink for PrometheusMetricSink {
    fn export(&self, key: &str, metric: Arc<dyn ClusterMetric>) -> Result<(), SinkError> {
        match self.exported.entry(key.to_string()) {
            Entry::Occupied(_) => Err(SinkError::DuplicateKey(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(metric);
                self.exports.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    fn unexport(&self, key: &str) -> Result<(), SinkError> {
        match self.exported.remove(key) {
            Some(_) => {
                self.unexports.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(SinkError::UnknownKey(key.to_string())),
        }
    }
}
