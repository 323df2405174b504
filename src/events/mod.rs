//! Event pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Request handler (e.g. checkout succeeded)
//!     → publisher.rs  EventPublisher::publish()   (never blocks, never fails the caller)
//!     → bounded buffer → dispatcher task
//!     → broker.rs     topic exchange "shopping_events"
//!                     (amqp.rs: external AMQP broker, or in process)
//!     → pattern.rs    every binding whose pattern matches the routing key
//!     → one copy per bound queue (fan-out)
//!     → consumer.rs   receive → decode → handler → ack | reject (no requeue)
//!     → handlers.rs   notification / analytics state
//! ```
//!
//! # Design Decisions
//! - The broker connection is an explicit handle (`Arc<dyn Broker>`)
//!   created once at startup and passed to producers and consumers
//! - `amqp://` / `amqps://` URLs give durable queues that outlive the
//!   process; consumers may then run standalone (`event-consumer`)
//! - Publish is best-effort: failures are logged and counted only
//! - Consumers process one message at a time, in delivery order
//! - A failed message is dropped, not retried; there is no dead-letter path

pub mod amqp;
pub mod broker;
pub mod consumer;
pub mod envelope;
pub mod handlers;
pub mod pattern;
pub mod publisher;

pub use amqp::AmqpBroker;
pub use broker::{connect, Broker, BrokerError, Delivery, InMemoryBroker};
pub use consumer::{Consumer, EventHandler, ProcessingError};
pub use envelope::{DeliveryMode, EventEnvelope, MessageProperties, CONTENT_TYPE_JSON};
pub use handlers::{
    AnalyticsHandler, AnalyticsStats, CheckoutEvent, CheckoutRecord, ListSummary, NotificationHandler,
};
pub use pattern::TopicPattern;
pub use publisher::EventPublisher;

/// Routing key published when a list checkout completes.
pub const CHECKOUT_COMPLETED: &str = "list.checkout.completed";
