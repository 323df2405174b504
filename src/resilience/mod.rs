//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → breakers.rs (pick this backend's breaker)
//!     → circuit_breaker.rs (admit, or reject with CircuitOpen)
//!     → timeouts.rs (enforce the upstream deadline)
//!     → outcome recorded on the breaker
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: callers see CircuitOpen or a timeout and decide themselves
//! - Circuit breaker prevents cascading failures

pub mod breakers;
pub mod circuit_breaker;
pub mod timeouts;

pub use breakers::BreakerSet;
pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use timeouts::{bounded, CallError};
