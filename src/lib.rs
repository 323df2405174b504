//! Service gateway library.
//!
//! Registry with health probing, per-backend circuit breakers, an HTTP
//! gateway with aggregate endpoints, and a topic-based event pipeline.

pub mod admin;
pub mod config;
pub mod events;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{Gateway, Shutdown};
