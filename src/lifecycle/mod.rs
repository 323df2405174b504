//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Seed registry → Declare exchange → Publisher → Consumers → Prober → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Flush publisher
//!     → Stop consumers and prober → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: core first, then background tasks, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: background tasks are abandoned after a deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Gateway, StartupError, ANALYTICS_QUEUE, NOTIFICATION_QUEUE};
