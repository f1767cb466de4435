//! gateway-ha - Query gateway backend administration with a metrics registry
//!
//! This is the composition root that wires together all the components.

use gateway_ha::adapters::inbound::{ApiServer, ApiState};
use gateway_ha::adapters::outbound::{DashMapBackendStore, PrometheusMetricSink, SqliteBackendStore};
use gateway_ha::application::{
    AdminMutationRelay, GatewayBackendService, MetricsRegistry, ReconciliationScheduler,
};
use gateway_ha::config::{load_config, StoreBackend};
use gateway_ha::domain::ports::BackendStore;
use gateway_ha::infrastructure::{shutdown_signal, ShutdownController};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting gateway-ha listen={} store={:?}",
        cfg.listen_addr,
        cfg.store_backend
    );

    // ===== COMPOSITION ROOT =====
    // Wire up all adapters and services

    // 1. Create outbound adapters

    // Backend store (SQLite or in-memory)
    let store: Arc<dyn BackendStore> = match cfg.store_backend {
        StoreBackend::Sqlite => {
            tracing::info!("backend store at {}", cfg.db_path);
            Arc::new(SqliteBackendStore::open(&cfg.db_path)?)
        }
        StoreBackend::Memory => Arc::new(DashMapBackendStore::new()),
    };

    // Metric sink (Prometheus text exposition)
    let sink = Arc::new(PrometheusMetricSink::default());

    // 2. Create application services
    let registry = Arc::new(
        MetricsRegistry::new(store.clone(), sink.clone()).with_store_timeout(cfg.store_timeout()),
    );
    let scheduler = Arc::new(
        ReconciliationScheduler::new(registry.clone()).with_access_debounce(cfg.inspect_debounce()),
    );

    let mut relay = AdminMutationRelay::new(registry);
    if cfg.reconcile_on_mutation {
        relay = relay.with_scheduler(scheduler.clone());
    }
    let service = Arc::new(GatewayBackendService::new(store, Arc::new(relay)));

    // 3. Start background reconciliation
    scheduler.start(cfg.metrics_refresh_period());

    // 4. Create inbound adapter and run until a shutdown signal
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let server = ApiServer::new(
        cfg.listen_addr,
        ApiState::new(service, scheduler.clone(), sink),
    );
    let result = server.run(shutdown.wait()).await;

    scheduler.stop().await;
    tracing::info!("gateway-ha stopped");
    result
}
