//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use service_gateway::config::GatewayConfig;
use service_gateway::events::{AnalyticsHandler, InMemoryBroker, NotificationHandler};
use service_gateway::http::auth::{Claims, JwtVerifier};
use service_gateway::lifecycle::{Gateway, Shutdown, StartupError};
use service_gateway::registry::{Metadata, ServiceRegistry};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn start_backend(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Shared request counter for mock backends.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A running gateway plus handles for assertions.
pub struct TestGateway {
    pub base: String,
    pub registry: Arc<ServiceRegistry>,
    pub broker: Arc<InMemoryBroker>,
    pub notification: Option<Arc<NotificationHandler>>,
    pub analytics: Option<Arc<AnalyticsHandler>>,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
    handle: JoinHandle<Result<(), StartupError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn register(&self, name: &str, url: &str) {
        self.registry.register(name, url, Metadata::new());
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(15), self.handle)
            .await
            .expect("gateway did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Config with no seeded backends and no background probing.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.services.clear();
    config.health_check.enabled = false;
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let broker = Arc::new(InMemoryBroker::new());
    let gateway = Gateway::start(config, broker.clone()).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let registry = gateway.registry().clone();
    let notification = gateway.notification();
    let analytics = gateway.analytics();
    let shutdown = gateway.shutdown();
    let handle = tokio::spawn(gateway.serve(listener));

    TestGateway {
        base: format!("http://{}", addr),
        registry,
        broker,
        notification,
        analytics,
        shutdown,
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap(),
        handle,
    }
}

/// A signed bearer token for `username`.
pub fn token(username: &str) -> String {
    let claims = Claims {
        id: format!("id-{}", username),
        email: format!("{}@example.com", username),
        username: username.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as u64,
    };
    JwtVerifier::new(TEST_SECRET).sign(&claims).unwrap()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
