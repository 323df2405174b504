//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every gateway endpoint
//! - Wire up middleware (tracing, request ID, outer timeout)
//! - Dispatch `/api/*` requests through the route table to backends
//! - Serve until the shutdown signal, then drain

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{FromRef, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::GatewayConfig;
use crate::events::EventPublisher;
use crate::http::aggregate;
use crate::http::auth::{JwtVerifier, SharedVerifier};
use crate::http::checkout;
use crate::http::error::GatewayError;
use crate::http::proxy::{UpstreamClient, UpstreamRequest};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::registry::ServiceRegistry;
use crate::resilience::{BreakerSet, BreakerSettings};
use crate::routing::RouteTable;

/// Largest request body the gateway will buffer for forwarding.
const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub upstream: UpstreamClient,
    pub routes: Arc<RouteTable>,
    pub verifier: SharedVerifier,
    pub publisher: EventPublisher,
}

impl AppState {
    /// Build handler state around an existing registry and publisher.
    pub fn new(config: &GatewayConfig, registry: Arc<ServiceRegistry>, publisher: EventPublisher) -> Self {
        let breakers = Arc::new(BreakerSet::new(
            BreakerSettings::from(&config.circuit_breaker),
            config.services.iter().map(|s| s.name.clone()),
        ));
        let upstream = UpstreamClient::new(registry.clone(), breakers, config.timeouts.upstream());

        Self {
            registry,
            upstream,
            routes: Arc::new(RouteTable::from_config(&config.routes)),
            verifier: Arc::new(JwtVerifier::new(&config.auth.jwt_secret)),
            publisher,
        }
    }
}

impl FromRef<AppState> for SharedVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

/// HTTP front of the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(aggregate::health))
            .merge(admin::routes())
            .route("/api/dashboard", get(aggregate::dashboard))
            .route("/api/search", get(aggregate::search))
            .route("/api/lists/{id}/checkout", post(checkout::checkout))
            .route("/api/{*path}", any(proxy_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for in-process use.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until shutdown is signalled, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward an `/api/*` request to the backend its route names.
async fn proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let request_id = request.request_id().to_string();
    let path = request.uri().path();

    let Some(route) = state.routes.resolve(path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        return Ok(not_found().await.into_response());
    };

    let path_and_query = match request.uri().query() {
        Some(query) => format!("{}?{}", route.upstream_path, query),
        None => route.upstream_path.clone(),
    };
    let service = route.service.to_string();

    tracing::debug!(
        request_id = %request_id,
        route = %route.route,
        service = %service,
        upstream_path = %path_and_query,
        "Proxying request"
    );

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_REQUEST_BYTES)
        .await
        .map_err(|_| GatewayError::BadRequest("Request body too large".to_string()))?;

    let outbound = UpstreamRequest {
        service,
        method: parts.method,
        path_and_query,
        headers: HeaderMap::new(),
        body,
    }
    .forward_headers(&parts.headers);

    Ok(state.upstream.send(outbound).await?.into_response())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Route not found" })))
}
