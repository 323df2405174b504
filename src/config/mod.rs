//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, or defaults)
//!     → environment overrides (PORT, JWT_SECRET, BROKER_URL, CB_*)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → cloned into each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Production mode turns missing connection settings into hard errors
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, BrokerConfig, CircuitBreakerConfig, ConsumersConfig, Environment, GatewayConfig,
    HealthCheckConfig, ListenerConfig, LogFormat, ObservabilityConfig, RouteConfig, ServiceSeed,
    TimeoutConfig, DEV_JWT_SECRET, ITEM_SERVICE, LIST_SERVICE, USER_SERVICE,
};
