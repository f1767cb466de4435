//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Activation status of a backend cluster as exposed by its gauge.
///
/// The numeric encoding is the exported gauge value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum ActivationStatus {
    /// Backend exists and is active (1)
    Active,
    /// Backend exists and is inactive (0)
    Inactive,
    /// Backend is not tracked or no longer present (-1)
    Unknown,
}

impl ActivationStatus {
    /// Derive the status from the store's view of a backend.
    pub fn from_active(active: Option<bool>) -> Self {
        match active {
            Some(true) => Self::Active,
            Some(false) => Self::Inactive,
            None => Self::Unknown,
        }
    }

    /// Gauge value for this status.
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Active => 1,
            Self::Inactive => 0,
            Self::Unknown => -1,
        }
    }
}

impl Default for ActivationStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<ActivationStatus> for i64 {
    fn from(status: ActivationStatus) -> Self {
        status.as_gauge()
    }
}

impl From<i64> for ActivationStatus {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::Active,
            0 => Self::Inactive,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_gauge())
    }
}
