//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every registered backend
//! - Write the outcome back to the registry

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::observability::metrics;
use crate::registry::ServiceRegistry;
use crate::resilience::{bounded, CallError};

pub struct HealthProber {
    registry: Arc<ServiceRegistry>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthProber {
    pub fn new(registry: Arc<ServiceRegistry>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            registry,
            config,
            client,
        }
    }

    /// Probe on a fixed interval until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Health probing disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health prober starting"
        );

        let interval = self.config.interval();
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered backend once, concurrently.
    pub async fn check_all(&self) {
        let snapshot = self.registry.list_all();

        let probes = snapshot.iter().map(|(name, record)| async move {
            let healthy = self.probe(name, &record.url).await;
            (name.as_str(), healthy)
        });

        for (name, healthy) in join_all(probes).await {
            if self.registry.record_probe(name, healthy).is_some() {
                metrics::record_backend_health(name, healthy);
                if !healthy {
                    tracing::warn!(service = %name, "Service is unhealthy");
                }
            }
        }
    }

    async fn probe(&self, name: &str, base_url: &str) -> bool {
        let uri = format!("{}{}", base_url.trim_end_matches('/'), self.config.path);

        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "service-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(service = %name, uri = %uri, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match bounded(self.config.timeout(), self.client.request(request)).await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::warn!(service = %name, status = %response.status(), "Health check failed: non-success status");
                false
            }
            Err(CallError::Failed(e)) => {
                tracing::warn!(service = %name, error = %e, "Health check failed: connection error");
                false
            }
            Err(CallError::Timeout(limit)) => {
                tracing::warn!(service = %name, timeout = ?limit, "Health check failed: timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Metadata, ServiceStatus};

    fn prober(registry: Arc<ServiceRegistry>) -> HealthProber {
        let mut config = HealthCheckConfig::default();
        config.timeout_secs = 1;
        HealthProber::new(registry, config)
    }

    #[tokio::test]
    async fn test_unreachable_backend_marked_unhealthy() {
        let registry = Arc::new(ServiceRegistry::new());
        // Nothing listens on port 1.
        registry.register("dead", "http://127.0.0.1:1", Metadata::new());
        let before = registry.list_all()["dead"].last_heartbeat;

        prober(registry.clone()).check_all().await;

        let record = registry.list_all()["dead"].clone();
        assert_eq!(record.status, ServiceStatus::Unhealthy);
        assert!(record.last_heartbeat >= before);
    }

    #[tokio::test]
    async fn test_malformed_url_does_not_panic() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register("weird", "not a url", Metadata::new());

        prober(registry.clone()).check_all().await;
        assert_eq!(registry.list_all()["weird"].status, ServiceStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let registry = Arc::new(ServiceRegistry::new());
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(prober(registry).run(rx));
        tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
