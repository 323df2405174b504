//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (prober.rs)
//!     → snapshot registry
//!     → GET {url}/health on every record, concurrently, bounded timeout
//!     → registry.record_probe(name, healthy)
//! ```
//!
//! # Design Decisions
//! - Runs on its own schedule, never on the request path
//! - One probe result flips the status (no hysteresis); the circuit
//!   breaker is the faster containment layer
//! - Every completed attempt refreshes the heartbeat, so staleness is
//!   visible even for failing backends
//! - Probe failures are logged, never propagated

pub mod prober;

pub use prober::HealthProber;
