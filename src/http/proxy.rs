//! Outbound calls to backends.
//!
//! # Data Flow
//! ```text
//! UpstreamRequest (service, method, path+query, headers, body)
//!     → registry lookup        (NotFound / Unhealthy: no network call)
//!     → breaker.execute        (CircuitOpen: no network call)
//!     → bounded hyper request  (Timeout / Transport)
//!     → buffered response      (non-2xx → Upstream, counted as a failure)
//! ```
//!
//! # Design Decisions
//! - Only an allow-list of headers crosses to the backend; the bearer
//!   token is forwarded opaquely
//! - Response bodies are buffered so the breaker sees the final outcome
//! - No retries here; the caller gets the first failure

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::http::error::GatewayError;
use crate::http::request::X_REQUEST_ID;
use crate::observability::metrics;
use crate::registry::ServiceRegistry;
use crate::resilience::{bounded, BreakerSet, CallError};

/// Largest backend response the gateway will buffer.
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Headers copied from the inbound request.
const FORWARDED_HEADERS: [HeaderName; 4] = [
    header::AUTHORIZATION,
    header::CONTENT_TYPE,
    header::ACCEPT,
    HeaderName::from_static(X_REQUEST_ID),
];

/// A call to make against a named backend.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub service: String,
    pub method: Method,
    /// Path plus optional query, e.g. `/search?q=rice`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn get(service: &str, path_and_query: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            method: Method::GET,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Copy the forwardable subset of `inbound` onto this request.
    pub fn forward_headers(mut self, inbound: &HeaderMap) -> Self {
        for name in FORWARDED_HEADERS.iter() {
            if let Some(value) = inbound.get(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        self
    }
}

/// A successful (2xx) backend answer, fully buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn json<T: DeserializeOwned>(&self, service: &str) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            tracing::warn!(service = %service, error = %e, "Backend returned malformed JSON");
            GatewayError::Internal(format!("Invalid response from {}", service))
        })
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Registry-resolved, breaker-guarded HTTP client.
#[derive(Clone)]
pub struct UpstreamClient {
    registry: Arc<ServiceRegistry>,
    breakers: Arc<BreakerSet>,
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(registry: Arc<ServiceRegistry>, breakers: Arc<BreakerSet>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            registry,
            breakers,
            client,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<BreakerSet> {
        &self.breakers
    }

    /// Send `request` to its backend.
    pub async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
        let start = Instant::now();
        let service = request.service.clone();

        let record = self.registry.lookup(&service).inspect_err(|e| {
            tracing::warn!(service = %service, error = %e, "Backend not routable");
        })?;

        let breaker = self.breakers.get(&service);
        let result = breaker
            .execute(|| self.dispatch(&record.url, request))
            .await
            .map_err(GatewayError::from);

        let status = match &result {
            Ok(response) => response.status.as_u16(),
            Err(e) => e.status().as_u16(),
        };
        metrics::record_request(&service, status, start);
        result
    }

    /// GET `path_and_query` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: &str,
        path_and_query: &str,
        inbound: &HeaderMap,
    ) -> Result<T, GatewayError> {
        let request = UpstreamRequest::get(service, path_and_query).forward_headers(inbound);
        self.send(request).await?.json(service)
    }

    async fn dispatch(
        &self,
        base_url: &str,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, GatewayError> {
        let service = request.service;
        let uri = format!("{}{}", base_url.trim_end_matches('/'), request.path_and_query);

        let mut builder = Request::builder().method(request.method.clone()).uri(&uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let outbound = builder.body(Body::from(request.body)).map_err(|e| {
            tracing::error!(service = %service, uri = %uri, error = %e, "Failed to build upstream request");
            GatewayError::Transport {
                service: service.clone(),
                reason: e.to_string(),
            }
        })?;

        tracing::debug!(service = %service, method = %request.method, uri = %uri, "Forwarding request");

        let call = async {
            let response = self.client.request(outbound).await.map_err(|e| e.to_string())?;
            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), MAX_RESPONSE_BYTES)
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>((parts, body))
        };

        let (parts, body) = match bounded(self.timeout, call).await {
            Ok(answer) => answer,
            Err(CallError::Timeout(limit)) => {
                tracing::warn!(service = %service, uri = %uri, timeout = ?limit, "Upstream timed out");
                return Err(GatewayError::Timeout { service, limit });
            }
            Err(CallError::Failed(reason)) => {
                tracing::warn!(service = %service, uri = %uri, error = %reason, "Upstream request failed");
                return Err(GatewayError::Transport { service, reason });
            }
        };

        let content_type = parts.headers.get(header::CONTENT_TYPE).cloned();
        if parts.status.is_success() {
            Ok(UpstreamResponse {
                status: parts.status,
                content_type,
                body,
            })
        } else {
            tracing::info!(service = %service, status = %parts.status, "Upstream returned error status");
            Err(GatewayError::Upstream {
                service,
                status: parts.status,
                content_type,
                body,
            })
        }
    }
}
