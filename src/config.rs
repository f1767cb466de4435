use serde::Deserialize;
use std::time::Duration;

/// Which [`BackendStore`](crate::domain::ports::BackendStore) implementation to run.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Admin and inspection API
    pub listen_addr: String,

    // Backend store
    pub store_backend: StoreBackend,
    pub db_path: String,
    pub store_timeout_ms: u64,

    // Metrics reconciliation
    pub metrics_refresh_secs: u64,
    pub inspect_debounce_ms: u64,
    pub reconcile_on_mutation: bool,

    pub debug: bool,
}

impl Config {
    pub fn metrics_refresh_period(&self) -> Duration {
        Duration::from_secs(self.metrics_refresh_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn inspect_debounce(&self) -> Duration {
        Duration::from_millis(self.inspect_debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            store_backend: StoreBackend::Sqlite,
            db_path: "gateway.db".to_string(),
            store_timeout_ms: 5000,
            metrics_refresh_secs: 30,
            inspect_debounce_ms: 1000,
            reconcile_on_mutation: true,
            debug: false,
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build a [`Config`] from any variable lookup. Unparsable values fall
/// back to their defaults.
pub fn load_config_from<F>(var: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let listen_addr = var("GATEWAY_LISTEN_ADDR").unwrap_or(defaults.listen_addr);

    let store_backend = match var("GATEWAY_STORE_BACKEND") {
        Some(value) => StoreBackend::parse(&value).unwrap_or_else(|| {
            tracing::warn!("unknown GATEWAY_STORE_BACKEND {:?}, using sqlite", value);
            defaults.store_backend
        }),
        None => defaults.store_backend,
    };

    let db_path = var("GATEWAY_DB_PATH").unwrap_or(defaults.db_path);

    let store_timeout_ms = var("GATEWAY_STORE_TIMEOUT_MS")
        .and_then(|v| v.parse().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(defaults.store_timeout_ms);

    let metrics_refresh_secs = var("GATEWAY_METRICS_REFRESH_SECS")
        .and_then(|v| v.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(defaults.metrics_refresh_secs);

    let inspect_debounce_ms = var("GATEWAY_INSPECT_DEBOUNCE_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.inspect_debounce_ms);

    let reconcile_on_mutation = var("GATEWAY_RECONCILE_ON_MUTATION")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(defaults.reconcile_on_mutation);

    let debug = var("DEBUG").is_some();

    Ok(Config {
        listen_addr,
        store_backend,
        db_path,
        store_timeout_ms,
        metrics_refresh_secs,
        inspect_debounce_ms,
        reconcile_on_mutation,
        debug,
    })
}
