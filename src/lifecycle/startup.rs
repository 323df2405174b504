//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (health prober, event publisher, consumers)
//! - Serve HTTP until shutdown, then stop background tasks
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - The broker handle is injected so tests can hold on to it

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::events::{
    AnalyticsHandler, Broker, BrokerError, Consumer, EventHandler, EventPublisher,
    NotificationHandler,
};
use crate::health::HealthProber;
use crate::http::{AppState, GatewayServer};
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::registry::{Metadata, ServiceRegistry};

pub const NOTIFICATION_QUEUE: &str = "notification_queue";
pub const ANALYTICS_QUEUE: &str = "analytics_queue";

/// How long background tasks get to finish after the server stops.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("broker setup failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started gateway: background tasks running, HTTP not yet serving.
pub struct Gateway {
    config: GatewayConfig,
    shutdown: Shutdown,
    state: AppState,
    notification: Option<Arc<NotificationHandler>>,
    analytics: Option<Arc<AnalyticsHandler>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Seed the registry, then start the prober, publisher and consumers.
    pub async fn start(config: GatewayConfig, broker: Arc<dyn Broker>) -> Result<Self, StartupError> {
        let shutdown = Shutdown::new();
        let mut tasks = Vec::new();

        let registry = Arc::new(ServiceRegistry::new());
        for seed in &config.services {
            let metadata: Metadata = seed
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            registry.register(&seed.name, &seed.address, metadata);
        }

        let exchange = config.broker.exchange.as_str();
        broker.declare_exchange(exchange).await?;

        let (publisher, handle) = EventPublisher::spawn(
            broker.clone(),
            exchange,
            config.broker.publish_buffer,
            shutdown.subscribe(),
        );
        tasks.push(handle);

        let notification = if config.consumers.notification {
            let handler = Arc::new(NotificationHandler::new());
            tasks.push(
                spawn_consumer(&broker, &config, NOTIFICATION_QUEUE, handler.clone(), &shutdown).await?,
            );
            Some(handler)
        } else {
            None
        };

        let analytics = if config.consumers.analytics {
            let handler = Arc::new(AnalyticsHandler::new());
            tasks.push(
                spawn_consumer(&broker, &config, ANALYTICS_QUEUE, handler.clone(), &shutdown).await?,
            );
            Some(handler)
        } else {
            None
        };

        if config.health_check.enabled {
            let prober = HealthProber::new(registry.clone(), config.health_check.clone());
            tasks.push(tokio::spawn(prober.run(shutdown.subscribe())));
        }

        let state = AppState::new(&config, registry, publisher);

        tracing::info!(
            services = config.services.len(),
            routes = config.routes.len(),
            exchange = %exchange,
            background_tasks = tasks.len(),
            "Gateway started"
        );

        Ok(Self {
            config,
            shutdown,
            state,
            notification,
            analytics,
            tasks,
        })
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.state.registry
    }

    pub fn notification(&self) -> Option<Arc<NotificationHandler>> {
        self.notification.clone()
    }

    pub fn analytics(&self) -> Option<Arc<AnalyticsHandler>> {
        self.analytics.clone()
    }

    /// Handle that stops [`Gateway::serve`] when triggered.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve HTTP on `listener` until shutdown, then wait for background tasks.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        let server = GatewayServer::new(&self.config, self.state);
        let result = server.run(listener, self.shutdown.subscribe()).await;

        // The server also stops on its own errors; make sure the rest follows.
        self.shutdown.trigger();
        drain(self.tasks, DRAIN_DEADLINE).await;

        tracing::info!("Gateway stopped");
        result.map_err(StartupError::from)
    }
}

async fn spawn_consumer(
    broker: &Arc<dyn Broker>,
    config: &GatewayConfig,
    queue: &str,
    handler: Arc<dyn EventHandler>,
    shutdown: &Shutdown,
) -> Result<JoinHandle<()>, BrokerError> {
    let consumer = Consumer::bind(
        broker.clone(),
        &config.broker.exchange,
        queue,
        &config.consumers.pattern,
        handler,
    )
    .await?;
    Ok(tokio::spawn(consumer.run(shutdown.subscribe())))
}
