//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Backend startup  → register(name, url, metadata)   ─┐
//! Backend shutdown → unregister(name)                 ├─▶ store.rs (single writer)
//! HealthProber     → record_probe(name, healthy)     ─┘        │
//!                                                              ▼
//!                                          immutable snapshot (Arc<HashMap>)
//!                                                              │
//! Gateway request  → lookup(name) ◀────────────────────────────┤
//! GET /health      → list_all()   ◀────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Purely in memory: no other process reads the registry directly
//! - Writers are serialized; readers never block and always see a
//!   consistent point-in-time snapshot
//! - Status is written only by registration and the prober
//! - No lease/TTL: a crashed backend stays registered until it is probed
//!   unhealthy or removed by an operator

pub mod record;
pub mod store;

pub use record::{Metadata, RegistryError, ServiceRecord, ServiceStatus};
pub use store::{RegistrySnapshot, ServiceRegistry};
