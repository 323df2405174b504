//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the service gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deployment environment. Production turns lenient defaults into errors.
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backends registered at startup.
    pub services: Vec<ServiceSeed>,

    /// Route definitions mapping inbound paths to backends.
    pub routes: Vec<RouteConfig>,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-backend circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Token verification settings.
    pub auth: AuthConfig,

    /// Event broker connection.
    pub broker: BrokerConfig,

    /// Which in-process consumers to run.
    pub consumers: ConsumersConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            listener: ListenerConfig::default(),
            services: default_services(),
            routes: default_routes(),
            health_check: HealthCheckConfig::default(),
            timeouts: TimeoutConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            auth: AuthConfig::default(),
            broker: BrokerConfig::default(),
            consumers: ConsumersConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// A backend registered when the gateway starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSeed {
    /// Unique service name (registry key).
    pub name: String,

    /// Base address, e.g. "http://localhost:3001".
    pub address: String,

    /// Free-form metadata stored with the record.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Route configuration mapping an inbound path prefix to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Inbound path prefix to match (segment-aligned).
    pub path_prefix: String,

    /// Logical backend name resolved through the registry.
    pub service: String,

    /// Replacement for `path_prefix` on the outbound request.
    pub upstream_prefix: String,

    /// Route priority (higher = checked first on equal prefix length).
    #[serde(default)]
    pub priority: u32,
}

impl RouteConfig {
    fn new(name: &str, path_prefix: &str, service: &str, upstream_prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            service: service.to_string(),
            upstream_prefix: upstream_prefix.to_string(),
            priority: 0,
        }
    }
}

pub const USER_SERVICE: &str = "user-service";
pub const ITEM_SERVICE: &str = "item-service";
pub const LIST_SERVICE: &str = "list-service";

fn default_services() -> Vec<ServiceSeed> {
    [
        (USER_SERVICE, "http://localhost:3001", "User management service"),
        (ITEM_SERVICE, "http://localhost:3002", "Item catalog service"),
        (LIST_SERVICE, "http://localhost:3003", "Shopping list management service"),
    ]
    .into_iter()
    .map(|(name, address, description)| ServiceSeed {
        name: name.to_string(),
        address: address.to_string(),
        metadata: HashMap::from([
            ("version".to_string(), "1.0.0".to_string()),
            ("description".to_string(), description.to_string()),
        ]),
    })
    .collect()
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("auth", "/api/auth", USER_SERVICE, "/auth"),
        RouteConfig::new("users", "/api/users", USER_SERVICE, "/users"),
        RouteConfig::new("item-search", "/api/items/search", ITEM_SERVICE, "/search"),
        RouteConfig::new("items", "/api/items", ITEM_SERVICE, "/items"),
        RouteConfig::new("categories", "/api/categories", ITEM_SERVICE, "/categories"),
        RouteConfig::new("lists", "/api/lists", LIST_SERVICE, "/lists"),
    ]
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background prober.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path every backend exposes for liveness.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on a single proxied backend call, in seconds.
    pub upstream_secs: u64,

    /// Bound on a whole inbound request (including aggregation), in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_secs: 10,
            request_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }
}

/// Circuit breaker configuration, shared by every backend's breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial call is allowed.
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_duration_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_duration_secs)
    }
}

pub const DEV_JWT_SECRET: &str = "your-secret-key-change-in-production";

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing key shared with the user service.
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: development placeholder, rejected in production.
            jwt_secret: DEV_JWT_SECRET.to_string(),
        }
    }
}

/// Event broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Connection URL. Required in production.
    pub url: Option<String>,

    /// Topic exchange every event is published to.
    pub exchange: String,

    /// Capacity of the publisher's dispatch buffer.
    pub publish_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: Some("memory://localhost".to_string()),
            exchange: "shopping_events".to_string(),
            publish_buffer: 1024,
        }
    }
}

/// In-process consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumersConfig {
    /// Run the notification consumer.
    pub notification: bool,

    /// Run the analytics consumer.
    pub analytics: bool,

    /// Routing-key pattern both consumers bind with.
    pub pattern: String,
}

impl Default for ConsumersConfig {
    fn default() -> Self {
        Self {
            notification: true,
            analytics: true,
            pattern: "list.checkout.#".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
