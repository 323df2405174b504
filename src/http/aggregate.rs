//! Composite endpoints that combine backend answers.
//!
//! # Responsibilities
//! - `/api/dashboard`: list statistics for the caller
//! - `/api/search`: catalog items plus the caller's matching lists
//! - `/health`: gateway status plus every registry entry
//!
//! Empty slices degrade to zeros; a failing sub-call fails the endpoint
//! through the usual error translation.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::{ITEM_SERVICE, LIST_SERVICE};
use crate::events::ListSummary;
use crate::http::auth::Authenticated;
use crate::http::error::GatewayError;
use crate::http::server::AppState;
use crate::registry::RegistrySnapshot;

/// Number of lists echoed back by the dashboard.
const RECENT_LISTS: usize = 5;

/// The fields of a list the gateway reads. Everything else passes through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListView {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub summary: ListSummary,
}

impl ListView {
    /// Lenient read, field by field: a missing or mistyped field is treated
    /// as absent without discarding the others.
    pub fn from_value(value: &Value) -> Self {
        let text = |field: &str| value.get(field).and_then(Value::as_str).map(str::to_string);

        Self {
            name: text("name"),
            description: text("description"),
            status: text("status"),
            summary: value
                .get("summary")
                .and_then(|s| ListSummary::deserialize(s).ok())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub total_lists: usize,
    pub active_lists: usize,
    pub completed_lists: usize,
    pub total_items: u64,
    pub total_purchased: u64,
    pub total_estimated: f64,
    pub completion_rate: u64,
}

/// Fold the caller's lists into dashboard numbers.
pub fn dashboard_statistics(lists: &[ListView]) -> DashboardStatistics {
    let mut stats = DashboardStatistics {
        total_lists: lists.len(),
        ..Default::default()
    };
    let mut estimated = 0.0;
    for list in lists {
        match list.status.as_deref() {
            Some("active") => stats.active_lists += 1,
            Some("completed") => stats.completed_lists += 1,
            _ => {}
        }
        stats.total_items += list.summary.total_items;
        stats.total_purchased += list.summary.purchased_items;
        estimated += list.summary.estimated_total;
    }
    stats.total_estimated = (estimated * 100.0).round() / 100.0;
    stats.completion_rate = if stats.total_items > 0 {
        (stats.total_purchased as f64 / stats.total_items as f64 * 100.0).round() as u64
    } else {
        0
    };
    stats
}

/// Lists whose name or description contains `query`, ignoring case.
pub fn filter_lists(lists: Vec<Value>, query: &str) -> Vec<Value> {
    let needle = query.to_lowercase();
    lists
        .into_iter()
        .filter(|value| {
            let list = ListView::from_value(value);
            list.name
                .is_some_and(|n| n.to_lowercase().contains(&needle))
                || list
                    .description
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .collect()
}

pub async fn dashboard(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    let lists: Vec<Value> = state
        .upstream
        .get_json(LIST_SERVICE, "/lists", &headers)
        .await?;

    let views: Vec<ListView> = lists.iter().map(ListView::from_value).collect();
    let statistics = dashboard_statistics(&views);

    tracing::debug!(user = %claims.id, lists = statistics.total_lists, "Dashboard built");

    Ok(Json(json!({
        "user": {
            "id": claims.id,
            "email": claims.email,
            "username": claims.username,
        },
        "statistics": statistics,
        "recentLists": lists.into_iter().take(RECENT_LISTS).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Authenticated(_claims): Authenticated,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    let query = params
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Query parameter q is required".to_string()))?;

    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    let items_path = format!("/search?q={}", encoded);

    // Independent calls; the item search does not carry the caller's token.
    let no_headers = HeaderMap::new();
    let (items, lists) = tokio::join!(
        state.upstream.get_json::<Value>(ITEM_SERVICE, &items_path, &no_headers),
        state.upstream.get_json::<Vec<Value>>(LIST_SERVICE, "/lists", &headers),
    );
    let lists = filter_lists(lists?, &query);

    Ok(Json(json!({
        "query": query,
        "results": {
            "items": items?,
            "lists": lists,
        },
    })))
}

/// Health report body and whether every backend is healthy.
pub fn health_report(snapshot: &RegistrySnapshot) -> (bool, Value) {
    let mut names: Vec<_> = snapshot.keys().collect();
    names.sort();

    let mut services = Map::new();
    for name in names {
        let record = &snapshot[name];
        services.insert(
            name.clone(),
            json!({
                "status": record.status,
                "lastHeartbeat": record.last_heartbeat,
            }),
        );
    }

    let all_healthy = snapshot.values().all(|r| r.status.is_healthy());
    (
        all_healthy,
        json!({ "gateway": "healthy", "services": services }),
    )
}

pub async fn health(State(state): State<AppState>) -> Response {
    let (all_healthy, body) = health_report(&state.registry.list_all());
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Metadata, ServiceRegistry};

    #[test]
    fn test_dashboard_statistics() {
        let lists = [
            json!({"status": "active", "summary": {"totalItems": 10, "purchasedItems": 5, "estimatedTotal": 20.555}}),
            json!({"status": "completed", "summary": {"totalItems": 0, "purchasedItems": 0, "estimatedTotal": 0}}),
        ];
        let views: Vec<_> = lists.iter().map(ListView::from_value).collect();
        let stats = dashboard_statistics(&views);

        assert_eq!(
            stats,
            DashboardStatistics {
                total_lists: 2,
                active_lists: 1,
                completed_lists: 1,
                total_items: 10,
                total_purchased: 5,
                total_estimated: 20.56,
                completion_rate: 50,
            }
        );
    }

    #[test]
    fn test_empty_dashboard_is_all_zeros() {
        assert_eq!(dashboard_statistics(&[]), DashboardStatistics::default());
    }

    #[test]
    fn test_list_without_summary_counts_as_empty() {
        let views = [ListView::from_value(&json!({"name": "x", "status": "active"}))];
        let stats = dashboard_statistics(&views);
        assert_eq!(stats.active_lists, 1);
        assert_eq!(stats.completion_rate, 0);
    }

    #[test]
    fn test_null_name_keeps_status_and_summary() {
        let list = json!({
            "name": null,
            "status": "completed",
            "summary": {"totalItems": 4, "purchasedItems": 4, "estimatedTotal": 12.0}
        });
        let view = ListView::from_value(&list);
        assert_eq!(view.name, None);

        let stats = dashboard_statistics(&[view]);
        assert_eq!(stats.completed_lists, 1);
        assert_eq!(stats.total_items, 4);
        assert_eq!(stats.completion_rate, 100);

        // Still searchable through its description.
        let filtered = filter_lists(vec![json!({"name": null, "description": "Rice"})], "rice");
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_filter_lists_matches_name_or_description() {
        let lists = vec![
            json!({"name": "Weekly groceries", "description": "rice, beans"}),
            json!({"name": "RICE and more"}),
            json!({"name": "Party", "description": null}),
        ];
        let filtered = filter_lists(lists, "Rice");
        assert_eq!(filtered.len(), 2);
        assert!(filter_lists(vec![], "rice").is_empty());
    }

    #[test]
    fn test_health_report() {
        let registry = ServiceRegistry::new();
        let (healthy, body) = health_report(&registry.list_all());
        assert!(healthy);
        assert_eq!(body["gateway"], "healthy");

        registry.register("a", "http://a:1", Metadata::new());
        registry.register("b", "http://b:1", Metadata::new());
        registry.record_probe("b", false);
        let (healthy, body) = health_report(&registry.list_all());
        assert!(!healthy);
        assert_eq!(body["services"]["a"]["status"], "healthy");
        assert_eq!(body["services"]["b"]["status"], "unhealthy");
        assert!(body["services"]["b"]["lastHeartbeat"].is_string());
    }
}
