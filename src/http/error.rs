//! Error translation at the router boundary.
//!
//! Every handler returns `Result<_, GatewayError>`; this file holds the
//! only mapping from failures to HTTP responses.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::resilience::BreakerError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Service {service} not found in registry")]
    NotFound { service: String },

    #[error("Service {service} is unhealthy")]
    Unhealthy { service: String },

    #[error("Circuit breaker is OPEN for {service}")]
    CircuitOpen { service: String },

    #[error("Service {service} unavailable: no response within {limit:?}")]
    Timeout { service: String, limit: Duration },

    #[error("Service {service} unavailable: {reason}")]
    Transport { service: String, reason: String },

    /// The backend answered with a non-2xx status.
    #[error("Service {service} responded with {status}")]
    Upstream {
        service: String,
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Backend this error is attributed to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            GatewayError::NotFound { service }
            | GatewayError::Unhealthy { service }
            | GatewayError::CircuitOpen { service }
            | GatewayError::Timeout { service, .. }
            | GatewayError::Transport { service, .. }
            | GatewayError::Upstream { service, .. } => Some(service),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound { .. }
            | GatewayError::Unhealthy { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::Transport { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(service) => GatewayError::NotFound { service },
            RegistryError::Unhealthy(service) => GatewayError::Unhealthy { service },
        }
    }
}

impl From<BreakerError<GatewayError>> for GatewayError {
    fn from(e: BreakerError<GatewayError>) -> Self {
        match e {
            BreakerError::Open { service } => GatewayError::CircuitOpen { service },
            BreakerError::Inner(inner) => inner,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::Upstream {
                content_type, body, ..
            } => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                if let Some(content_type) = content_type {
                    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
                }
                response
            }
            ref e if status == StatusCode::SERVICE_UNAVAILABLE => {
                let body = json!({ "error": e.to_string(), "service": e.service() });
                (status, Json(body)).into_response()
            }
            e => (status, Json(json!({ "error": e.to_string() }))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_availability_errors_share_one_shape() {
        let errors = [
            GatewayError::from(RegistryError::NotFound("a".into())),
            GatewayError::from(RegistryError::Unhealthy("a".into())),
            GatewayError::from(BreakerError::<GatewayError>::Open { service: "a".into() }),
            GatewayError::Timeout { service: "a".into(), limit: Duration::from_secs(10) },
            GatewayError::Transport { service: "a".into(), reason: "connection refused".into() },
        ];
        for e in errors {
            let response = e.into_response();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            let body = body_json(response).await;
            assert_eq!(body["service"], "a");
            assert!(body["error"].as_str().unwrap().contains('a'));
        }
    }

    #[tokio::test]
    async fn test_upstream_is_forwarded_verbatim() {
        let e = GatewayError::Upstream {
            service: "list-service".into(),
            status: StatusCode::NOT_FOUND,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(br#"{"error":"list not found"}"#),
        };
        let response = e.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_json(response).await["error"], "list not found");
    }

    #[tokio::test]
    async fn test_client_errors() {
        let cases = [
            (GatewayError::BadRequest("q is required".into()), StatusCode::BAD_REQUEST),
            (GatewayError::Unauthorized("token missing".into()), StatusCode::UNAUTHORIZED),
            (GatewayError::Forbidden("token invalid".into()), StatusCode::FORBIDDEN),
            (GatewayError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (e, expected) in cases {
            let message = e.to_string();
            let response = e.into_response();
            assert_eq!(response.status(), expected);
            let body = body_json(response).await;
            assert_eq!(body["error"], message);
            assert!(body.get("service").is_none());
        }
    }
}
