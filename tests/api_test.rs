use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use blud_audit_ledger::api::{self, ApiState};

mod common;
use common::*;

async fn app(token: Option<&str>) -> Router {
    let ledger = setup_test_ledger().await;
    append_many(&ledger, 3).await;
    api::router(ApiState::new(ledger, token.map(str::to_string)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app(None).await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ledger"]["rows"], 3);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_health_check_degraded_when_ledger_unreadable() {
    let ledger = setup_test_ledger().await;
    let app = api::router(ApiState::new(ledger.clone(), None));
    ledger.database().close().await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["ledger"]["status"], "error");
}

#[tokio::test]
async fn test_append_over_http() {
    let app = app(None).await;

    let (status, body) = send(
        &app,
        post_json(
            "/audit",
            json!({
                "action": "SUBMIT",
                "status": "FAILURE",
                "error_message": "insufficient balance",
                "entity_type": "SPM",
                "entity_id": "spm-0012",
                "old_value": {"amount": 100},
                "new_value": {"amount": 150},
                "user_agent": "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["seq"], 4);
    assert_eq!(body["status"], "FAILURE");
    assert_eq!(body["changed_fields"], json!(["amount"]));
    assert_eq!(body["browser_name"], "Firefox 121");
    assert_eq!(body["os_name"], "Linux");

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = send(&app, get(&format!("/audit/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["hash"], body["hash"]);
}

#[tokio::test]
async fn test_unknown_action_is_unprocessable() {
    let app = app(None).await;

    let (status, body) = send(&app, post_json("/audit", json!({"action": "PUBLISH"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("PUBLISH"));

    let (_, listed) = send(&app, get("/audit")).await;
    assert_eq!(listed.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_list_and_missing_entry() {
    let app = app(None).await;

    let (status, body) = send(&app, get("/audit?entity_type=SPP&limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["seq"], 3);

    let (status, _) = send(&app, get("/audit/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_and_checkpoint_routes() {
    let app = app(None).await;

    let (status, body) = send(&app, get("/audit/verify")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "valid");
    assert_eq!(body["rows_checked"], 3);

    let (status, body) = send(&app, get("/audit/verify?from=2&to=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows_checked"], 2);

    let (status, _) = send(&app, get("/audit/verify?from=3&to=1")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, get("/audit/checkpoint")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row_count"], 3);
    assert!(body["merkle_root"].as_str().unwrap().starts_with("sha256:"));
}

#[tokio::test]
async fn test_bearer_token_required_when_configured() {
    let app = app(Some("rahasia")).await;

    let (status, _) = send(&app, get("/audit")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/audit")
        .header(header::AUTHORIZATION, "Bearer salah")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/audit/verify")
        .header(header::AUTHORIZATION, "Bearer rahasia")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, right).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "valid");

    // Health stays open for probes.
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}
