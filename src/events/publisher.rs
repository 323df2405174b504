//! Fire-and-forget event publishing.
//!
//! # Responsibilities
//! - Turn a typed payload into an envelope on the configured exchange
//! - Hand it to a background dispatcher without blocking the caller
//! - Log and count every failure; never surface one to the caller

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::events::broker::Broker;
use crate::events::envelope::EventEnvelope;
use crate::observability::metrics;

/// Cheap-to-clone handle used by request handlers.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<EventEnvelope>,
    exchange: String,
}

impl EventPublisher {
    /// Start the dispatcher task. It drains whatever is buffered once
    /// shutdown is signalled, then exits.
    pub fn spawn(
        broker: Arc<dyn Broker>,
        exchange: impl Into<String>,
        buffer: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(dispatch(broker, rx, shutdown));
        (
            Self {
                tx,
                exchange: exchange.into(),
            },
            handle,
        )
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Queue an event for publishing. Returns whether it was accepted
    /// into the buffer; that is not a delivery guarantee.
    pub fn publish<T: Serialize>(&self, routing_key: &str, payload: &T) -> bool {
        let envelope = match EventEnvelope::new(self.exchange.as_str(), routing_key, payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(routing_key = %routing_key, error = %e, "Failed to encode event");
                metrics::record_publish_failure(routing_key);
                return false;
            }
        };

        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                tracing::error!(
                    routing_key = %envelope.routing_key,
                    message_id = %envelope.properties.message_id,
                    "Publish buffer full, event dropped"
                );
                metrics::record_publish_failure(routing_key);
                false
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                tracing::error!(
                    routing_key = %envelope.routing_key,
                    message_id = %envelope.properties.message_id,
                    "Publisher stopped, event dropped"
                );
                metrics::record_publish_failure(routing_key);
                false
            }
        }
    }
}

async fn dispatch(
    broker: Arc<dyn Broker>,
    mut rx: mpsc::Receiver<EventEnvelope>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(envelope) => send(broker.as_ref(), envelope).await,
                None => break,
            },
            _ = shutdown.recv() => {
                rx.close();
                while let Some(envelope) = rx.recv().await {
                    send(broker.as_ref(), envelope).await;
                }
                break;
            }
        }
    }
    tracing::info!("Event publisher stopped");
}

async fn send(broker: &dyn Broker, envelope: EventEnvelope) {
    match broker.publish(&envelope).await {
        Ok(()) => {
            tracing::info!(
                exchange = %envelope.exchange,
                routing_key = %envelope.routing_key,
                message_id = %envelope.properties.message_id,
                "Event published"
            );
            metrics::record_event_published(&envelope.routing_key);
        }
        Err(e) => {
            tracing::error!(
                exchange = %envelope.exchange,
                routing_key = %envelope.routing_key,
                message_id = %envelope.properties.message_id,
                error = %e,
                "Failed to publish event"
            );
            metrics::record_publish_failure(&envelope.routing_key);
        }
    }
}
