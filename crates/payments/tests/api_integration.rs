//! Integration tests for the payments HTTP API.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::InMemoryPaymentStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = payments::create_state(InMemoryPaymentStore::new());
    payments::create_app(state, get_metrics_handle())
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = setup().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "payments");
}

#[tokio::test]
async fn test_create_account_deposit_and_balance() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(post_json("/api/accounts", serde_json::json!({ "userId": "u1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["balance"].as_f64(), Some(0.0));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/accounts/deposit",
            serde_json::json!({ "userId": "u1", "amount": 100 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["balance"].as_f64(), Some(100.0));

    let response = app
        .oneshot(get("/api/accounts/balance?userId=u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["balance"].as_f64(), Some(100.0));
}

#[tokio::test]
async fn test_duplicate_account_conflicts() {
    let app = setup();
    let create = || post_json("/api/accounts", serde_json::json!({ "userId": "u1" }));

    let first = app.clone().oneshot(create()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(create()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert!(body_json(second).await["error"].as_str().is_some());
}

#[tokio::test]
async fn test_empty_user_id_is_bad_request() {
    let response = setup()
        .oneshot(post_json("/api/accounts", serde_json::json!({ "userId": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deposit_to_unknown_account_is_not_found() {
    let response = setup()
        .oneshot(post_json(
            "/api/accounts/deposit",
            serde_json::json!({ "userId": "ghost", "amount": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_negative_deposit_is_bad_request() {
    let app = setup();
    app.clone()
        .oneshot(post_json("/api/accounts", serde_json::json!({ "userId": "u1" })))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/accounts/deposit",
            serde_json::json!({ "userId": "u1", "amount": -5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deposit_past_maximum_balance_is_bad_request() {
    let app = setup();
    app.clone()
        .oneshot(post_json("/api/accounts", serde_json::json!({ "userId": "u1" })))
        .await
        .unwrap();
    let deposit = || {
        post_json(
            "/api/accounts/deposit",
            serde_json::json!({ "userId": "u1", "amount": 7e28 }),
        )
    };

    let first = app.clone().oneshot(deposit()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let funded = body_json(first).await["balance"].as_f64().unwrap();

    let second = app.clone().oneshot(deposit()).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(second).await["error"].as_str().is_some());

    let response = app
        .oneshot(get("/api/accounts/balance?userId=u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["balance"].as_f64(), Some(funded));
}

#[tokio::test]
async fn test_balance_of_unknown_account_is_not_found() {
    let response = setup()
        .oneshot(get("/api/accounts/balance?userId=ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let response = setup().oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}
