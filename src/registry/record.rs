//! Registry record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free-form metadata attached to a registration.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Liveness status of a registered backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

impl ServiceStatus {
    pub fn from_probe(healthy: bool) -> Self {
        if healthy {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        }
    }

    pub fn is_healthy(self) -> bool {
        self == ServiceStatus::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Unhealthy => "unhealthy",
        }
    }
}

/// One registered backend. Serialized in the shape `GET /registry` exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    /// Base address, e.g. `http://localhost:3002`.
    pub url: String,
    pub status: ServiceStatus,
    /// Refreshed on registration and on every completed probe attempt.
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Set on first registration and never changed afterwards.
    pub registered_at: DateTime<Utc>,
}

/// Lookup failures. The gateway treats both as an immediate backend failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Service {0} not found in registry")]
    NotFound(String),

    #[error("Service {0} is unhealthy")]
    Unhealthy(String),
}

impl RegistryError {
    pub fn service(&self) -> &str {
        match self {
            RegistryError::NotFound(name) | RegistryError::Unhealthy(name) => name,
        }
    }
}
