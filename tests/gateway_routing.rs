//! Proxying, error translation and circuit breaking through the gateway.

use axum::extract::{Path, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

mod common;
use common::{spawn_gateway, start_backend, test_config, Hits};

#[tokio::test]
async fn test_proxy_rewrites_path_and_forwards_query_and_token() {
    let backend = start_backend(Router::new().route(
        "/items/{id}",
        get(|Path(id): Path<String>, RawQuery(q): RawQuery, headers: HeaderMap| async move {
            Json(json!({
                "id": id,
                "query": q,
                "auth": headers.get("authorization").and_then(|v| v.to_str().ok()),
                "cookie": headers.get("cookie").and_then(|v| v.to_str().ok()),
                "requestId": headers.get("x-request-id").and_then(|v| v.to_str().ok()),
            }))
        }),
    ))
    .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register("item-service", &backend);

    let res = gw
        .client
        .get(gw.url("/api/items/i42?category=Alimentos"))
        .header("authorization", "Bearer opaque")
        .header("cookie", "session=1")
        .header("x-request-id", "req-77")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "req-77");

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["id"], "i42");
    assert_eq!(body["query"], "category=Alimentos");
    assert_eq!(body["auth"], "Bearer opaque");
    assert_eq!(body["cookie"], Value::Null);
    assert_eq!(body["requestId"], "req-77");

    gw.stop().await;
}

#[tokio::test]
async fn test_search_route_is_not_shadowed_by_items() {
    let backend = start_backend(
        Router::new()
            .route("/search", get(|| async { Json(json!({"route": "search"})) }))
            .route("/items/{id}", get(|| async { Json(json!({"route": "item"})) })),
    )
    .await;
    let gw = spawn_gateway(test_config()).await;
    gw.register("item-service", &backend);

    let body: Value = gw
        .client
        .get(gw.url("/api/items/search?q=rice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["route"], "search");

    gw.stop().await;
}

#[tokio::test]
async fn test_upstream_error_is_forwarded_verbatim() {
    let backend = start_backend(Router::new().route(
        "/lists/{id}",
        get(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "Lista não encontrada"}))) }),
    ))
    .await;
    let gw = spawn_gateway(test_config()).await;
    gw.register("list-service", &backend);

    let res = gw.client.get(gw.url("/api/lists/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"error": "Lista não encontrada"}));

    gw.stop().await;
}

#[tokio::test]
async fn test_unknown_and_unhealthy_backends_are_503() {
    let hits = Hits::default();
    let counter = hits.clone();
    let backend = start_backend(Router::new().route(
        "/users/{id}",
        get(move || {
            counter.hit();
            async { Json(json!({})) }
        }),
    ))
    .await;
    let gw = spawn_gateway(test_config()).await;

    // Not registered at all.
    let res = gw.client.get(gw.url("/api/users/u1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["service"], "user-service");
    assert!(body["error"].as_str().unwrap().contains("not found"));

    // Registered but failing probes: no network call is made.
    gw.register("user-service", &backend);
    gw.registry.record_probe("user-service", false);
    let res = gw.client.get(gw.url("/api/users/u1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unhealthy"));
    assert_eq!(hits.count(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn test_breaker_opens_after_threshold_and_isolates_backends() {
    let failing_hits = Hits::default();
    let counter = failing_hits.clone();
    let failing = start_backend(Router::new().route(
        "/lists",
        get(move || {
            counter.hit();
            async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "db down"}))) }
        }),
    ))
    .await;
    let healthy = start_backend(
        Router::new().route("/categories", get(|| async { Json(json!(["Alimentos", "Limpeza"])) })),
    )
    .await;

    let gw = spawn_gateway(test_config()).await;
    gw.register("list-service", &failing);
    gw.register("item-service", &healthy);

    // Threshold is 3: each failure is forwarded verbatim until the circuit opens.
    for _ in 0..3 {
        let res = gw.client.get(gw.url("/api/lists")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    for _ in 0..2 {
        let res = gw.client.get(gw.url("/api/lists")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["service"], "list-service");
        assert_eq!(body["error"], "Circuit breaker is OPEN for list-service");
    }
    assert_eq!(failing_hits.count(), 3);

    // Another backend keeps flowing.
    let res = gw.client.get(gw.url("/api/categories")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let breakers: Value = gw
        .client
        .get(gw.url("/admin/breakers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let list = breakers
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["service"] == "list-service")
        .unwrap();
    assert_eq!(list["state"], "OPEN");

    gw.stop().await;
}

#[tokio::test]
async fn test_slow_backend_times_out_as_503() {
    let backend = start_backend(Router::new().route(
        "/users",
        get(|| async {
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            Json(json!([]))
        }),
    ))
    .await;

    let mut config = test_config();
    config.timeouts.upstream_secs = 1;
    let gw = spawn_gateway(config).await;
    gw.register("user-service", &backend);

    let res = gw.client.get(gw.url("/api/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["service"], "user-service");

    gw.stop().await;
}
