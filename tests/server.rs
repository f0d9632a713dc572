mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::{config, MockBackend, AUTH_URL};
use std::sync::Arc;
use tg_oauth_webapp::server::{router, AppState};
use tower::ServiceExt;

fn app(backend: MockBackend, published: Option<&str>) -> Router {
    let state = AppState::new((*config()).clone(), Arc::new(backend), published);
    router(state)
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn fresh_page_offers_sign_in() {
    let resp = get(app(MockBackend::default(), None), "/?user_id=42").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = body_text(resp).await;
    assert!(html.contains(r#"action="/signin""#));
    assert!(html.contains(r#"name="user_id" value="42""#));
}

#[tokio::test]
async fn repeated_query_keys_use_first_value() {
    let resp = get(app(MockBackend::default(), None), "/?user_id=42&user_id=42").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains(r#"name="user_id" value="42""#));

    let resp = get(app(MockBackend::default(), None), "/?user_id=abc&user_id=42").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("User ID not found"));
}

#[tokio::test]
async fn page_without_user_shows_error() {
    let html = body_text(get(app(MockBackend::default(), None), "/").await).await;
    assert!(html.contains(r#"class="status error""#));
    assert!(html.contains("User ID not found"));
    assert!(!html.contains("<form"));
}

#[tokio::test]
async fn callback_page_redirects_after_delay() {
    let resp = get(
        app(MockBackend::default(), None),
        "/?code=4%2Fabc&state=42&scope=email",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = body_text(resp).await;
    assert!(html.contains("a@b.com"));
    assert!(html.contains(r#"content="3;url=https://t.me/YOUR_BOT_USERNAME""#));
}

#[tokio::test]
async fn sign_in_redirects_to_provider() {
    let resp = app(MockBackend::default(), None)
        .oneshot(
            Request::post("/signin")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("user_id=42"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], AUTH_URL);
}

#[tokio::test]
async fn sign_in_without_user_is_an_error_page() {
    let resp = app(MockBackend::default(), None)
        .oneshot(
            Request::post("/signin")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("user_id=oops"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("User ID not found"));
}

#[tokio::test]
async fn env_script_publishes_backend() {
    let resp = get(
        app(MockBackend::default(), Some("https://api.example.com")),
        "/api/env.js",
    )
    .await;
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/javascript");
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "GET");

    let script = body_text(resp).await;
    assert!(script.contains(r#"window.ENV_BACKEND_URL = "https://api.example.com";"#));

    let script = body_text(get(app(MockBackend::default(), None), "/api/env.js").await).await;
    assert!(script.contains(r#"window.ENV_BACKEND_URL = "http://localhost:8000";"#));
}

#[tokio::test]
async fn health() {
    let body = body_text(get(app(MockBackend::default(), None), "/health").await).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "tg-oauth-webapp");
}
