//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (service, request_id, routing_key) on every event
//! - Request ID flows from the inbound request to the backend call
//! - Metrics are cheap and become no-ops when no exporter is installed
//! - Failures that never reach a caller (publish, consumer processing)
//!   are only observable here

pub mod logging;
pub mod metrics;
