//! Gateway integration tests: start a real gateway and interact over HTTP.
//!
//! The upstream token service is mocked with wiremock.
//! Run with: `cargo test -p klein-gateway --test integration`

use std::sync::Arc;

use klein_core::config::{Config, GatewayConfig, RateLimitConfig};
use klein_realtime::{HttpTokenProvider, TokenError, TokenProvider};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGO_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-logo";

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct TestGateway {
    port: u16,
    _dir: tempfile::TempDir,
}

impl TestGateway {
    fn url(&self, route: &str) -> String {
        format!("http://127.0.0.1:{}{route}", self.port)
    }

    async fn request_token(&self, body: serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url("/api/fal/realtime-token"))
            .json(&body)
            .send()
            .await
            .expect("Token request failed")
    }
}

fn gateway_config(dir: &std::path::Path, token_api_url: String) -> GatewayConfig {
    GatewayConfig {
        bind: Some("127.0.0.1".into()),
        public_dir: dir.join("public").to_string_lossy().into_owned(),
        logo_path: dir.join("falailogo.png").to_string_lossy().into_owned(),
        token_api_url,
        fal_key: Some("test-key".into()),
        fal_key_env: None,
        ..Default::default()
    }
}

/// Build a gateway with its own public dir and return once `/health` answers.
async fn start_test_gateway(configure: impl FnOnce(&mut GatewayConfig), upstream: &str) -> TestGateway {
    let port = find_free_port();

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("public")).unwrap();
    std::fs::write(dir.path().join("public/index.html"), "<h1>Klein Realtime</h1>").unwrap();
    std::fs::write(dir.path().join("falailogo.png"), LOGO_BYTES).unwrap();

    let mut gateway = gateway_config(dir.path(), format!("{upstream}/tokens/"));
    configure(&mut gateway);
    let config = Config {
        gateway: Some(gateway),
        ..Default::default()
    };

    let state = Arc::new(klein_gateway::GatewayState::new(&config));
    tokio::spawn(async move {
        let _ = klein_gateway::start_gateway(state, port).await;
    });

    // Wait for gateway to be ready
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .is_ok()
        {
            break;
        }
    }

    TestGateway { port, _dir: dir }
}

#[tokio::test]
async fn test_health_endpoint() {
    let upstream = MockServer::start().await;
    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;

    let resp = reqwest::get(gateway.url("/health"))
        .await
        .expect("Health request failed");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_token_issued_for_default_app_alias() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tokens/"))
        .and(header("Authorization", "Key test-key"))
        .and(body_json(json!({"allowed_apps": ["flux-2"], "token_expiration": 120})))
        .respond_with(ResponseTemplate::new(201).set_body_string("\"jwt-xyz\""))
        .expect(1)
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;
    let resp = gateway.request_token(json!({})).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "jwt-xyz");
}

#[tokio::test]
async fn test_token_alias_from_requested_app() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(json!({"allowed_apps": ["other-app"], "token_expiration": 120})))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"jwt-other\""))
        .expect(1)
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;
    let resp = gateway.request_token(json!({"app": "fal-ai/other-app/v2"})).await;

    assert_eq!(resp.text().await.unwrap(), "jwt-other");
}

#[tokio::test]
async fn test_legacy_detail_response_is_unwrapped() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"detail": "jwt-legacy"}"#))
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;
    let resp = gateway.request_token(json!({"app": "fal-ai/flux-2/klein"})).await;

    assert_eq!(resp.text().await.unwrap(), "jwt-legacy");
}

#[tokio::test]
async fn test_upstream_error_is_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid key"))
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;
    let resp = gateway.request_token(json!({})).await;

    assert_eq!(resp.status(), 401);
    assert_eq!(resp.text().await.unwrap(), "Invalid key");
}

#[tokio::test]
async fn test_upstream_unreachable_is_500() {
    let dead = format!("http://127.0.0.1:{}", find_free_port());
    let gateway = start_test_gateway(|_| {}, &dead).await;
    let resp = gateway.request_token(json!({})).await;

    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.unwrap(), "Token generation failed");
}

#[tokio::test]
async fn test_missing_key_does_not_contact_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"never\""))
        .expect(0)
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|g| g.fal_key = None, &upstream.uri()).await;
    let resp = gateway.request_token(json!({})).await;

    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn test_token_requests_are_rate_limited() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"jwt\""))
        .expect(2)
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(
        |g| {
            g.rate_limit = Some(RateLimitConfig {
                max_tokens_per_minute: 2,
            })
        },
        &upstream.uri(),
    )
    .await;

    assert_eq!(gateway.request_token(json!({})).await.status(), 200);
    assert_eq!(gateway.request_token(json!({})).await.status(), 200);
    assert_eq!(gateway.request_token(json!({})).await.status(), 429);
}

#[tokio::test]
async fn test_client_token_provider_against_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"jwt-client\""))
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;
    let provider = HttpTokenProvider::new(gateway.url("/api/fal/realtime-token"));

    let token = provider.fetch_token("fal-ai/flux-2/klein").await.unwrap();
    assert_eq!(token, "jwt-client");
}

#[tokio::test]
async fn test_client_sees_forwarded_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&upstream)
        .await;

    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;
    let provider = HttpTokenProvider::new(gateway.url("/api/fal/realtime-token"));

    let err = provider.fetch_token("fal-ai/flux-2/klein").await.unwrap_err();
    assert!(matches!(err, TokenError::Status { status: 403, .. }));
    assert_eq!(err.to_string(), "Token request failed (403)");
}

#[tokio::test]
async fn test_logo_and_static_assets() {
    let upstream = MockServer::start().await;
    let gateway = start_test_gateway(|_| {}, &upstream.uri()).await;

    let logo = reqwest::get(gateway.url("/falailogo.png")).await.unwrap();
    assert_eq!(logo.status(), 200);
    assert_eq!(logo.bytes().await.unwrap().as_ref(), LOGO_BYTES);

    let index = reqwest::get(gateway.url("/")).await.unwrap();
    assert_eq!(index.status(), 200);
    assert!(index.text().await.unwrap().contains("Klein Realtime"));

    let missing = reqwest::get(gateway.url("/nope.js")).await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_port_in_use_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let config = Config {
        gateway: Some(GatewayConfig {
            bind: Some("127.0.0.1".into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let state = Arc::new(klein_gateway::GatewayState::new(&config));

    let err = klein_gateway::start_gateway(state, port).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Port {port} is already in use. Kill the existing process and retry.")
    );
}
