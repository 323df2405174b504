//! Broker connection handle and the in-process topic exchange.
//!
//! # Responsibilities
//! - Declare exchanges and durable queues, bind queues by pattern
//! - Route each published message to every matching queue, once per queue
//! - Hand out deliveries and settle them (ack / reject)
//!
//! # Design Decisions
//! - `Broker` is the seam: producers and consumers only see the trait
//! - Queues outlive their consumers; messages wait until someone receives
//! - A delivered message is held as unacked until it is settled
//! - Publishing to an exchange with no matching binding is not an error

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use url::Url;

use crate::events::amqp::AmqpBroker;
use crate::events::envelope::{EventEnvelope, MessageProperties};
use crate::events::pattern::TopicPattern;

/// Broker-level failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection is closed")]
    ConnectionClosed,

    #[error("exchange '{0}' has not been declared")]
    UnknownExchange(String),

    #[error("queue '{0}' has not been declared")]
    UnknownQueue(String),

    #[error("delivery {tag} is not pending on queue '{queue}'")]
    UnknownDelivery { queue: String, tag: u64 },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid broker URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("AMQP error: {0}")]
    Amqp(#[source] lapin::Error),
}

/// A message handed to a consumer. Must be settled with `ack` or `reject`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn decode(&self) -> Result<EventEnvelope, serde_json::Error> {
        EventEnvelope::decode(&self.exchange, &self.routing_key, self.properties.clone(), &self.body)
    }
}

/// Connection to a topic-exchange message broker.
#[async_trait]
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Declare a topic exchange (idempotent).
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError>;

    /// Declare a durable queue (idempotent).
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Bind `queue` to `exchange` with a routing-key pattern.
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), BrokerError>;

    /// Route an envelope to every queue bound with a matching pattern.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), BrokerError>;

    /// Wait for the next message on `queue`.
    async fn receive(&self, queue: &str) -> Result<Delivery, BrokerError>;

    /// Settle a delivery as processed; it leaves the queue for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Settle a delivery as failed. With `requeue = false` it is dropped.
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError>;
}

/// Open a broker connection from a URL.
///
/// `amqp://` and `amqps://` reach an external broker; `memory://` keeps
/// every queue inside this process.
pub async fn connect(url: &str) -> Result<Arc<dyn Broker>, BrokerError> {
    let parsed = Url::parse(url).map_err(|e| BrokerError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "amqp" | "amqps" => Ok(Arc::new(AmqpBroker::connect(url).await?)),
        "memory" => {
            tracing::info!(url = %url, "Connected to in-process broker");
            Ok(Arc::new(InMemoryBroker::new()))
        }
        other => Err(BrokerError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    properties: MessageProperties,
    body: Vec<u8>,
}

#[derive(Debug)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Debug)]
struct Binding {
    queue: String,
    pattern: TopicPattern,
}

#[derive(Debug, Default)]
struct Topology {
    exchanges: HashMap<String, Vec<Binding>>,
    queues: HashMap<String, QueueState>,
}

/// Topic exchange living inside this process.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    topology: Mutex<Topology>,
    next_tag: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the connection: every later call fails with `ConnectionClosed`
    /// and blocked receivers wake up.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let topology = self.lock();
        for queue in topology.queues.values() {
            queue.notify.notify_waiters();
        }
        tracing::info!("In-process broker connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// `(ready, unacked)` message counts for a queue.
    pub fn queue_depth(&self, queue: &str) -> Option<(usize, usize)> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| (q.ready.len(), q.unacked.len()))
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            Err(BrokerError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Topology> {
        self.topology
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut topology = self.lock();
        let queue = topology
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| BrokerError::UnknownQueue(delivery.queue.clone()))?;
        let message = queue
            .unacked
            .remove(&delivery.tag)
            .ok_or_else(|| BrokerError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            })?;
        if requeue {
            queue.ready.push_front(message);
            queue.notify.notify_one();
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.lock().exchanges.entry(exchange.to_string()).or_default();
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut topology = self.lock();
        if !topology.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }
        let bindings = topology
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
        let exists = bindings
            .iter()
            .any(|b| b.queue == queue && b.pattern.as_str() == pattern);
        if !exists {
            bindings.push(Binding {
                queue: queue.to_string(),
                pattern: TopicPattern::new(pattern),
            });
        }
        Ok(())
    }

    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let body = envelope.body()?;
        let mut topology = self.lock();

        let targets: HashSet<String> = topology
            .exchanges
            .get(&envelope.exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(envelope.exchange.clone()))?
            .iter()
            .filter(|b| b.pattern.matches(&envelope.routing_key))
            .map(|b| b.queue.clone())
            .collect();

        for name in targets {
            if let Some(queue) = topology.queues.get_mut(&name) {
                queue.ready.push_back(StoredMessage {
                    exchange: envelope.exchange.clone(),
                    routing_key: envelope.routing_key.clone(),
                    properties: envelope.properties.clone(),
                    body: body.clone(),
                });
                queue.notify.notify_one();
            }
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery, BrokerError> {
        loop {
            let notify = {
                self.ensure_open()?;
                let mut topology = self.lock();
                let state = topology
                    .queues
                    .get_mut(queue)
                    .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;

                if let Some(message) = state.ready.pop_front() {
                    let tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
                    let delivery = Delivery {
                        tag,
                        queue: queue.to_string(),
                        exchange: message.exchange.clone(),
                        routing_key: message.routing_key.clone(),
                        properties: message.properties.clone(),
                        body: message.body.clone(),
                    };
                    state.unacked.insert(tag, message);
                    return Ok(delivery);
                }
                state.notify.clone()
            };

            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before re-checking so a close() in between is not missed.
            notified.as_mut().enable();
            if self.is_closed() {
                return Err(BrokerError::ConnectionClosed);
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.settle(delivery, false)
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        self.settle(delivery, requeue)
    }
}
