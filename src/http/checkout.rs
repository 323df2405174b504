//! List checkout: proxy the state change, then emit the completion event.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LIST_SERVICE;
use crate::events::{CheckoutEvent, ListSummary, CHECKOUT_COMPLETED};
use crate::http::error::GatewayError;
use crate::http::proxy::UpstreamRequest;
use crate::http::server::AppState;

/// `POST /api/lists/{id}/checkout`.
///
/// The list service's answer is authoritative: once it succeeds the caller
/// gets `202` whether or not the event makes it to the broker.
pub async fn checkout(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), GatewayError> {
    let request = UpstreamRequest {
        service: LIST_SERVICE.to_string(),
        method: Method::POST,
        path_and_query: format!("/lists/{}/checkout", list_id),
        headers: HeaderMap::new(),
        body,
    }
    .forward_headers(&headers);

    let response = state.upstream.send(request).await?;
    let list: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);

    let event = checkout_event(&list_id, &list);
    if !state.publisher.publish(CHECKOUT_COMPLETED, &event) {
        tracing::warn!(list_id = %list_id, "Checkout event not queued");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Checkout completed, processing in background",
            "status": "processing",
            "listId": list_id,
        })),
    ))
}

/// Build the event payload from the list service's response body.
pub fn checkout_event(list_id: &str, list: &Value) -> CheckoutEvent {
    let text = |name: &str| list.get(name).and_then(Value::as_str).map(str::to_string);

    CheckoutEvent {
        list_id: Some(list_id.to_string()),
        user_id: text("userId"),
        list_name: text("name"),
        summary: list
            .get("summary")
            .and_then(|s| ListSummary::deserialize(s).ok()),
        items: list
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        completed_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_list_body() {
        let list = json!({
            "id": "l1",
            "userId": "u1",
            "name": "Weekly",
            "summary": {"totalItems": 3, "purchasedItems": 3, "estimatedTotal": 17.5},
            "items": [{"itemId": "i1"}],
        });
        let event = checkout_event("l1", &list);
        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert_eq!(event.list_name.as_deref(), Some("Weekly"));
        assert_eq!(event.summary.unwrap().estimated_total, 17.5);
        assert_eq!(event.items.len(), 1);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["listId"], "l1");
        assert!(value["completedAt"].is_string());
    }

    #[test]
    fn test_non_json_body_still_yields_event() {
        let event = checkout_event("l9", &Value::Null);
        assert_eq!(event.list_id.as_deref(), Some("l9"));
        assert!(event.summary.is_none());
        assert!(event.items.is_empty());
    }
}
