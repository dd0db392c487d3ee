use crate::helpers::{credential, post, spawn_app, standard_keys, MockApiKeys};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use kma_gateway::ApiKeyStoreError;
use tower::ServiceExt;

const TRIGGER: &str = "/api/kma/fetch?tm1=202501010200&tm2=202501010300";

#[tokio::test]
async fn missing_key_is_unauthorized_without_a_lookup() {
    let mut api_keys = MockApiKeys::new();
    api_keys.expect_find().times(0);
    let test_app = spawn_app(api_keys).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post(TRIGGER, None))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "missing api key");
}

#[tokio::test]
async fn blank_key_is_unauthorized() {
    let mut api_keys = MockApiKeys::new();
    api_keys.expect_find().times(0);
    let test_app = spawn_app(api_keys).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post(TRIGGER, Some("   ")))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_and_inactive_keys_are_unauthorized() {
    let test_app = spawn_app(standard_keys()).await;

    for key in ["who-knows", "retired-key"] {
        let response = test_app
            .app
            .clone()
            .oneshot(post(TRIGGER, Some(key)))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", key);
    }

    assert_eq!(test_app.measurements.count().await.unwrap(), 0);
}

#[tokio::test]
async fn requests_over_the_limit_are_rejected() {
    let test_app = spawn_app(standard_keys()).await;

    for _ in 0..2 {
        let response = test_app
            .app
            .clone()
            .oneshot(post(TRIGGER, Some("tight-key")))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = test_app
        .app
        .clone()
        .oneshot(post(TRIGGER, Some("tight-key")))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // another key has its own budget
    let response = test_app
        .app
        .clone()
        .oneshot(post(TRIGGER, Some("valid-key")))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn key_lookup_failure_is_a_server_error() {
    let mut api_keys = MockApiKeys::new();
    api_keys
        .expect_find()
        .times(1)
        .returning(|_| Err(ApiKeyStoreError::Query(sqlx::Error::PoolTimedOut)));
    let test_app = spawn_app(api_keys).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post(TRIGGER, Some("valid-key")))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn key_is_looked_up_as_sent() {
    let mut api_keys = MockApiKeys::new();
    api_keys
        .expect_find()
        .withf(|api_key: &str| api_key == " valid-key ")
        .times(1)
        .returning(|_| Ok(None));
    let test_app = spawn_app(api_keys).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post(TRIGGER, Some(" valid-key ")))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_not_gated() {
    let mut api_keys = MockApiKeys::new();
    api_keys.expect_find().times(0);
    let test_app = spawn_app(api_keys).await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = test_app
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
}
