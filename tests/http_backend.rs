use oauth2::AuthorizationCode;
use serde_json::json;
use tg_oauth_webapp::{
    backend::{AuthBackend, BackendError, HttpBackend},
    config::{InitiateMethod, ResolvedBackend},
    params::UserId,
};
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const ID: UserId = UserId::new(42);

fn backend(server: &MockServer, method: InitiateMethod) -> HttpBackend {
    HttpBackend::new(ResolvedBackend::resolve(Some(&server.uri())), method)
}

#[tokio::test]
async fn initiate_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/initiate"))
        .and(body_json(json!({ "user_id": 42 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth_url": "https://accounts.google.com/o/oauth2/auth?state=42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = backend(&server, InitiateMethod::Post)
        .initiate(ID)
        .await
        .unwrap();
    assert_eq!(
        resp.auth_url.as_str(),
        "https://accounts.google.com/o/oauth2/auth?state=42"
    );
}

#[tokio::test]
async fn initiate_get_uses_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/initiate"))
        .and(query_param("user_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth_url": "https://accounts.google.com/o/oauth2/auth"
        })))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server, InitiateMethod::Get)
        .initiate(ID)
        .await
        .unwrap();
}

#[tokio::test]
async fn callback_sends_code_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/callback"))
        .and(body_json(json!({ "code": "4/abc", "user_id": 42 })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "success", "email": "a@b.com" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resp = backend(&server, InitiateMethod::Post)
        .complete_callback(&AuthorizationCode::new("4/abc".into()), ID)
        .await
        .unwrap();
    assert_eq!(resp.email, "a@b.com");
}

#[tokio::test]
async fn status_reads_path_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/status/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "authenticated": true, "email": "x@y.com" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/status/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authenticated": false })))
        .mount(&server)
        .await;

    let client = backend(&server, InitiateMethod::Post);
    let status = client.status(ID).await.unwrap();
    assert!(status.authenticated);
    assert_eq!(status.email.as_deref(), Some("x@y.com"));

    let status = client.status(UserId::new(7)).await.unwrap();
    assert!(!status.authenticated);
    assert_eq!(status.email, None);
}

#[tokio::test]
async fn notify_posts_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/notify"))
        .and(body_json(json!({ "user_id": 42 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server, InitiateMethod::Post).notify(ID).await.unwrap();
}

#[tokio::test]
async fn error_statuses_and_bad_bodies() {
    let server = MockServer::start().await;
    Mock::given(path("/api/auth/initiate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
        .mount(&server)
        .await;
    Mock::given(path("/api/auth/callback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .mount(&server)
        .await;

    let client = backend(&server, InitiateMethod::Post);

    let err = client.initiate(ID).await.unwrap_err();
    assert!(
        matches!(&err, BackendError::Http { status, body } if status.as_u16() == 500 && body == "nope")
    );
    assert!(!err.is_malformed());

    let err = client
        .complete_callback(&AuthorizationCode::new("c".into()), ID)
        .await
        .unwrap_err();
    assert!(err.is_malformed());
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    // nothing listens on port 1
    let client = HttpBackend::new(
        ResolvedBackend::resolve(Some("http://127.0.0.1:1")),
        InitiateMethod::Post,
    );
    let err = client.initiate(ID).await.unwrap_err();
    assert!(matches!(err, BackendError::Transport(_)));
}
