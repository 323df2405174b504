use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::validation::check_http_url;
use crate::http::error::GatewayError;
use crate::http::server::AppState;
use crate::registry::{Metadata, ServiceRecord};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub service: String,
    pub state: &'static str,
    pub consecutive_failures: u32,
    /// Seconds until a trial call is allowed, while open.
    pub retry_in_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub metadata: Metadata,
}

pub async fn list_services(State(state): State<AppState>) -> Json<HashMap<String, ServiceRecord>> {
    Json(HashMap::clone(&state.registry.list_all()))
}

pub async fn register_service(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ServiceRecord>), GatewayError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(GatewayError::BadRequest("name must not be empty".to_string()));
    }
    let url = check_http_url(&request.url).map_err(GatewayError::BadRequest)?;

    let record = state
        .registry
        .register(name, url.as_str().trim_end_matches('/'), request.metadata);
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn unregister_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusCode {
    state.registry.unregister(&name);
    StatusCode::NO_CONTENT
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        services: state.registry.len(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerStatus>> {
    let now = tokio::time::Instant::now();
    let statuses = state
        .upstream
        .breakers()
        .snapshot()
        .into_iter()
        .map(|(service, snapshot)| BreakerStatus {
            service,
            state: snapshot.state.as_str(),
            consecutive_failures: snapshot.consecutive_failures,
            retry_in_secs: snapshot
                .earliest_retry
                .map(|at| at.saturating_duration_since(now).as_secs()),
        })
        .collect();
    Json(statuses)
}
