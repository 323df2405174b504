//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → one of:
//!         aggregate.rs  /health, /api/dashboard, /api/search
//!         checkout.rs   /api/lists/{id}/checkout (proxy + event)
//!         server.rs     /api/* via the route table
//!     → proxy.rs (registry → breaker → bounded backend call)
//!     → error.rs (uniform error translation)
//!     → Send to client
//! ```

pub mod aggregate;
pub mod auth;
pub mod checkout;
pub mod error;
pub mod proxy;
pub mod request;
pub mod server;

pub use auth::{Authenticated, Claims, JwtVerifier, TokenVerifier};
pub use error::GatewayError;
pub use proxy::{UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
