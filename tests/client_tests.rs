use std::{sync::Arc, time::Duration};

use delivery_worker::{
    clients::{auth::BearerTokenCache, http::ResilientClient},
    errors::ClientError,
    models::retry::RetryConfig,
    utils::backoff_delay,
};
use futures_util::future::join_all;
use reqwest::{Client, StatusCode};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

fn fast_retries() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 10,
        max_delay_ms: 40,
        rate_limit_margin_ms: 5,
    }
}

fn client(retry_config: RetryConfig) -> ResilientClient {
    ResilientClient::new(Client::new(), None, retry_config)
}

/// Test: The computed delay stays within [0, maxDelay] at every attempt
#[test]
fn test_backoff_is_bounded() {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 1000,
        max_delay_ms: 5000,
        rate_limit_margin_ms: 100,
    };

    for _ in 0..100 {
        let delay = backoff_delay(&config, 3);
        assert!(delay <= Duration::from_secs(5));
    }

    for _ in 0..100 {
        let delay = backoff_delay(&config, 0);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(1000));
    }
}

/// Test: A large attempt count saturates instead of overflowing
#[test]
fn test_backoff_saturates_on_large_attempts() {
    let delay = backoff_delay(&RetryConfig::default(), 80);
    assert!(delay <= Duration::from_secs(5));
}

/// Test: A 5xx response is retried until the service recovers
#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications/n1/status"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notifications/n1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "QUEUED" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(fast_retries());
    let response = client
        .send(
            client
                .http_client()
                .get(format!("{}/notifications/n1/status", server.uri())),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Test: A 429 response is retried after the server's millisecond hint
#[tokio::test]
async fn test_rate_limited_response_honors_hint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recipients/a"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After-Ms", "20"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/recipients/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "a" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(fast_retries());
    let started = tokio::time::Instant::now();
    let response = client
        .send(client.http_client().get(format!("{}/recipients/a", server.uri())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(25));
}

/// Test: A 4xx response other than 429 is returned immediately
#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications/templates/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("template not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(fast_retries());
    let result = client
        .send(
            client
                .http_client()
                .get(format!("{}/notifications/templates/missing", server.uri())),
        )
        .await;

    match result {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "template not found");
        }
        other => panic!("expected a status error, got {:?}", other.map(|r| r.status())),
    }
}

/// Test: Retries stop after the configured number of attempts
#[tokio::test]
async fn test_retries_are_exhausted() {
    let server = MockServer::start().await;

    // The first request plus max_attempts retries.
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(fast_retries());
    let result = client
        .send(client.http_client().get(format!("{}/health", server.uri())))
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Status { status, .. }) if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
}

/// Test: Concurrent callers share a single token fetch
#[tokio::test]
async fn test_bearer_token_is_fetched_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=worker"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "t1", "expires_in": 3600 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notifications/n1/status"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "QUEUED" })))
        .expect(5)
        .mount(&server)
        .await;

    let http_client = Client::new();
    let auth = Arc::new(BearerTokenCache::new(
        http_client.clone(),
        format!("{}/oauth/token", server.uri()),
        "worker".to_string(),
        "secret".to_string(),
    ));
    let client = ResilientClient::new(http_client, Some(auth), fast_retries());
    let url = format!("{}/notifications/n1/status", server.uri());

    let responses = join_all((0..5).map(|_| client.send(client.http_client().get(&url)))).await;

    assert!(responses.iter().all(|r| r.is_ok()));
}

/// Test: A token shorter-lived than the refresh margin is still reused
#[tokio::test]
async fn test_short_lived_token_is_reused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t1", "expires_in": 10 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = BearerTokenCache::new(
        Client::new(),
        format!("{}/oauth/token", server.uri()),
        "worker".to_string(),
        "secret".to_string(),
    )
    .with_refresh_margin(chrono::Duration::seconds(30));

    assert_eq!(cache.bearer_token().await.unwrap(), "t1");
    assert_eq!(cache.bearer_token().await.unwrap(), "t1");
}

/// Test: An expired token is fetched again before use
#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t1", "expires_in": 0 })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let cache = BearerTokenCache::new(
        Client::new(),
        format!("{}/oauth/token", server.uri()),
        "worker".to_string(),
        "secret".to_string(),
    );

    assert_eq!(cache.bearer_token().await.unwrap(), "t1");
    assert_eq!(cache.bearer_token().await.unwrap(), "t1");
}

/// Test: Rejected client credentials surface as an auth error
#[tokio::test]
async fn test_rejected_credentials_fail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let cache = BearerTokenCache::new(
        Client::new(),
        format!("{}/oauth/token", server.uri()),
        "worker".to_string(),
        "wrong".to_string(),
    );

    let result = cache.bearer_token().await;

    assert!(matches!(result, Err(ClientError::Auth(message)) if message.contains("invalid_client")));
}
