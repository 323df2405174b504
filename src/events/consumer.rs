//! Queue consumers.
//!
//! # Responsibilities
//! - Declare a durable queue and bind it to the exchange by pattern
//! - Feed each delivery, in order, to one handler
//! - Ack on success; reject without requeue on any failure
//!
//! A handler that errors or panics costs exactly one message. The loop
//! keeps going until shutdown or until the broker connection closes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::broker::{Broker, BrokerError, Delivery};
use crate::events::envelope::EventEnvelope;
use crate::observability::metrics;

/// Why a message could not be processed.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("handler panicked")]
    Panicked,

    #[error("{0}")]
    Failed(String),
}

/// Per-queue message handler.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<(), ProcessingError>;
}

/// One queue, one handler, one message at a time.
pub struct Consumer {
    broker: Arc<dyn Broker>,
    queue: String,
    handler: Arc<dyn EventHandler>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue)
            .field("handler", &self.handler.name())
            .finish()
    }
}

impl Consumer {
    /// Declare `queue`, bind it to `exchange` with `pattern` and return a
    /// consumer ready to run.
    pub async fn bind(
        broker: Arc<dyn Broker>,
        exchange: &str,
        queue: &str,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, BrokerError> {
        broker.declare_exchange(exchange).await?;
        broker.declare_queue(queue).await?;
        broker.bind_queue(queue, exchange, pattern).await?;

        tracing::info!(
            queue = %queue,
            exchange = %exchange,
            pattern = %pattern,
            handler = handler.name(),
            "Consumer bound"
        );

        Ok(Self {
            broker,
            queue: queue.to_string(),
            handler,
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Consume until shutdown is signalled or the connection closes.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(queue = %self.queue, "Consumer waiting for messages");

        loop {
            tokio::select! {
                received = self.broker.receive(&self.queue) => match received {
                    Ok(delivery) => {
                        self.process_one(&delivery).await;
                    }
                    Err(BrokerError::ConnectionClosed) => {
                        tracing::warn!(queue = %self.queue, "Broker connection closed, consumer stopping");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(queue = %self.queue, error = %e, "Failed to receive message, consumer stopping");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(queue = %self.queue, "Consumer received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Decode, handle and settle a single delivery. Returns whether it was acked.
    pub async fn process_one(&self, delivery: &Delivery) -> bool {
        let outcome = match delivery.decode() {
            Ok(envelope) => AssertUnwindSafe(self.handler.handle(&envelope))
                .catch_unwind()
                .await
                .unwrap_or(Err(ProcessingError::Panicked)),
            Err(e) => Err(ProcessingError::Malformed(e)),
        };

        let acked = match outcome {
            Ok(()) => {
                if let Err(e) = self.broker.ack(delivery).await {
                    tracing::error!(queue = %self.queue, tag = delivery.tag, error = %e, "Failed to ack message");
                }
                true
            }
            Err(e) => {
                tracing::error!(
                    queue = %self.queue,
                    handler = self.handler.name(),
                    routing_key = %delivery.routing_key,
                    message_id = %delivery.properties.message_id,
                    error = %e,
                    "Message processing failed, dropping"
                );
                if let Err(e) = self.broker.reject(delivery, false).await {
                    tracing::error!(queue = %self.queue, tag = delivery.tag, error = %e, "Failed to reject message");
                }
                false
            }
        };

        metrics::record_consumed(&self.queue, acked);
        acked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::broker::InMemoryBroker;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the `n` of every payload; fails on `fail`, panics on `panic`.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<(), ProcessingError> {
            if event.payload.get("panic").is_some() {
                panic!("boom");
            }
            if event.payload.get("fail").is_some() {
                return Err(ProcessingError::Failed("asked to fail".into()));
            }
            let n = event.payload["n"].as_i64().ok_or(ProcessingError::MissingField("n"))?;
            self.seen.lock().unwrap().push(n);
            Ok(())
        }
    }

    async fn setup() -> (Arc<InMemoryBroker>, Arc<Recorder>, Consumer) {
        let broker = Arc::new(InMemoryBroker::new());
        let recorder = Arc::new(Recorder::default());
        let consumer = Consumer::bind(broker.clone(), "ex", "q", "list.#", recorder.clone())
            .await
            .unwrap();
        (broker, recorder, consumer)
    }

    async fn publish(broker: &InMemoryBroker, payload: serde_json::Value) {
        broker
            .publish(&EventEnvelope::new("ex", "list.checkout.completed", &payload).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_dropped_and_processing_continues() {
        let (broker, recorder, consumer) = setup().await;
        publish(&broker, json!({"n": 1})).await;
        publish(&broker, json!({"fail": true})).await;
        publish(&broker, json!({"panic": true})).await;
        publish(&broker, json!({"n": 2})).await;

        for expected in [true, false, false, true] {
            let delivery = broker.receive("q").await.unwrap();
            assert_eq!(consumer.process_one(&delivery).await, expected);
        }

        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2]);
        // Nothing left ready or pending.
        assert_eq!(broker.queue_depth("q"), Some((0, 0)));
    }

    #[tokio::test]
    async fn test_run_processes_in_order_and_stops_on_close() {
        let (broker, recorder, consumer) = setup().await;
        let (_tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(consumer.run(rx));

        for n in 0..5 {
            publish(&broker, json!({ "n": n })).await;
        }
        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.seen.lock().unwrap().len() < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);

        broker.close();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_broker, _recorder, consumer) = setup().await;
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(consumer.run(rx));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
