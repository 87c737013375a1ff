//! HTTP 接口测试

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use display_conditions::{
    PageFlag, PostCatalog, RuleSetStore, SerializedContext, StaticPage,
    api::{self, AppState},
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn create_test_app(state: AppState) -> Router {
    api::routes().with_state(state)
}

fn test_state() -> AppState {
    let store = RuleSetStore::new();
    store
        .load_from_json(
            r#"[
                {
                    "subject": {"kind": "ad", "id": 7},
                    "content": [{"target": "category", "condition": "is", "values": [5]}],
                    "visitor": [{"target": "logged_in", "condition": "is"}]
                }
            ]"#,
        )
        .unwrap();

    let catalog = PostCatalog::from_json(
        r#"[{"id": 42, "post_type": "post", "terms": {"category": [5]}}]"#,
    )
    .unwrap();

    AppState::new(store, catalog)
}

fn article_context() -> Value {
    let page = StaticPage::new("https://example.com/ducks/")
        .with_flag(PageFlag::Singular)
        .with_post(42);
    serde_json::to_value(SerializedContext::capture(&page)).unwrap()
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_raw(app: Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_evaluate_with_stored_rules() {
    let app = create_test_app(test_state());

    let (status, body) = post_json(
        app.clone(),
        "/v1/evaluate",
        json!({
            "subject": {"kind": "ad", "id": 7},
            "context": article_context(),
            "visitor": {"logged_in": true}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["display"], json!(true));

    let (_, body) = post_json(
        app,
        "/v1/evaluate",
        json!({
            "subject": {"kind": "ad", "id": 7},
            "context": article_context(),
            "visitor": {"logged_in": false}
        }),
    )
    .await;

    assert_eq!(body["data"]["content"], json!(true));
    assert_eq!(body["data"]["visitor"], json!(false));
    assert_eq!(body["data"]["display"], json!(false));
}

#[tokio::test]
async fn test_evaluate_unconfigured_unit_displays() {
    let app = create_test_app(test_state());

    let (status, body) = post_json(
        app,
        "/v1/evaluate",
        json!({"subject": {"kind": "placement", "id": 99}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display"], json!(true));
}

#[tokio::test]
async fn test_evaluate_inline_rules_with_trace() {
    let app = create_test_app(test_state());

    let (status, body) = post_json(
        app,
        "/v1/evaluate",
        json!({
            "subject": {"kind": "ad", "id": 1},
            "context": article_context(),
            "rules": {
                "content": [
                    {"target": "is_front_page", "condition": "is", "connector": "or"},
                    {"target": "url", "condition": "contains", "values": "ducks"}
                ]
            },
            "trace": true
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display"], json!(true));
    let trace = body["data"]["trace"].as_array().unwrap();
    assert!(trace.iter().any(|line| line.as_str().unwrap().starts_with("content: group[1]")));
}

#[tokio::test]
async fn test_evaluate_rejects_unknown_unit_kind() {
    let app = create_test_app(test_state());

    let (status, body) = post_json(
        app,
        "/v1/evaluate",
        json!({"subject": {"kind": "banner", "id": 1}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_evaluate_skips_malformed_inline_rows() {
    let app = create_test_app(test_state());

    let (status, body) = post_json(
        app,
        "/v1/evaluate",
        json!({
            "subject": {"kind": "ad", "id": 1},
            "context": article_context(),
            "rules": {
                "content": [
                    {"target": 5, "condition": "is", "connector": "or"},
                    {"target": "is_front_page", "condition": "is", "connector": 1},
                    {"target": "url", "condition": "contains", "values": "ducks"}
                ]
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], json!(false));
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = create_test_app(test_state());

    let (status, body) = post_raw(app.clone(), "/v1/evaluate", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));

    let (status, body) = post_raw(
        app,
        "/v1/evaluate",
        r#"{"subject": {"kind": "ad", "id": "seven"}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_list_targets() {
    let app = create_test_app(test_state());

    let (status, body) = get_json(app, "/v1/targets").await;

    assert_eq!(status, StatusCode::OK);
    let targets = body["data"].as_array().unwrap();
    let url = targets
        .iter()
        .find(|t| t["key"] == json!("url"))
        .unwrap();
    assert_eq!(url["domain"], json!("content"));
    assert_eq!(url["valueType"], json!("text"));
    assert_eq!(url["defaultComparator"], json!("contains"));

    assert!(targets.iter().any(|t| t["key"] == json!("geo_radius")));
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(test_state());

    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["units"], json!(1));
    assert_eq!(body["posts"], json!(1));
}
