//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound path (/api/items/42)
//!     → router.rs (route lookup)
//!     → matcher.rs (segment-aligned prefix check)
//!     → Return: backend name + rewritten path (/items/42), or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by prefix length, then priority
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::PathPrefixMatcher;
pub use router::{Route, RouteMatch, RouteTable};
