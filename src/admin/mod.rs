//! Registry and breaker introspection over HTTP.
//!
//! Backends register themselves here on startup and unregister on
//! graceful shutdown; operators read the same endpoints.

pub mod handlers;

use axum::{
    routing::{delete, get},
    Router,
};

use self::handlers::*;
use crate::http::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/registry", get(list_services).post(register_service))
        .route("/registry/{name}", delete(unregister_service))
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
}
