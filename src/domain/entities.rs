//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the gateway domain.
//! They have no external dependencies and contain only business logic.

use serde::{Deserialize, Serialize};

/// Routing group served by ad-hoc backends.
pub const ADHOC_ROUTING_GROUP: &str = "adhoc";

/// A backend cluster that the gateway can route queries to.
///
/// The name is the identity of a backend and never changes once the
/// backend is created; a rename is a delete followed by a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Unique cluster name
    pub name: String,
    /// Routing group this cluster belongs to (e.g. "adhoc", "etl")
    pub routing_group: String,
    /// URL the gateway proxies requests to
    pub proxy_to: String,
    /// URL advertised to clients
    pub external_url: String,
    /// Whether the cluster currently accepts traffic; new backends are
    /// active unless the request says otherwise
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl BackendConfig {
    pub fn new(
        name: impl Into<String>,
        routing_group: impl Into<String>,
        proxy_to: impl Into<String>,
        external_url: impl Into<String>,
        active: bool,
    ) -> Self {
        Self {
            name: name.into(),
            routing_group: routing_group.into(),
            proxy_to: proxy_to.into(),
            external_url: external_url.into(),
            active,
        }
    }

    /// Return a copy with both URLs stripped of a trailing slash.
    pub fn normalized(&self) -> Self {
        Self {
            proxy_to: remove_trailing_slash(&self.proxy_to).to_string(),
            external_url: remove_trailing_slash(&self.external_url).to_string(),
            ..self.clone()
        }
    }
}

/// Strip a single trailing `/` from a URL.
pub fn remove_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}
