mod auth_support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use custom_oauth::auth::{AuthError, CredentialSource, DeviceFlowClient, StaticKeySource};
use custom_oauth::config::CustomOAuthSettings;
use custom_oauth::error::CustomOAuthError;
use custom_oauth::provider::AuthorizedClient;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{clock, credential, manager, HOUR_MS, NOW};

/// Hands out `token-<n>`, bumping `n` on every forced refresh.
#[derive(Debug, Default)]
struct RotatingSource {
    forced: AtomicU32,
    fail_force: bool,
}

#[async_trait]
impl CredentialSource for RotatingSource {
    async fn access_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        if force_refresh {
            if self.fail_force {
                return Err(AuthError::NoRefreshToken);
            }
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
        Ok(format!("token-{}", self.forced.load(Ordering::SeqCst)))
    }
}

#[tokio::test]
async fn bearer_token_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer token-0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = AuthorizedClient::new(
        format!("{}/v1/", server.uri()),
        Arc::new(RotatingSource::default()),
    );
    let url = client.url("/models");
    let resp = client.send(|http| http.get(&url)).await.unwrap();

    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn unauthorized_forces_refresh_and_retries_once() {
    let server = MockServer::start().await;
    Mock::given(header("authorization", "Bearer token-0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(RotatingSource::default());
    let client = AuthorizedClient::new(server.uri(), source.clone());
    let url = client.url("chat");
    client.send(|http| http.post(&url)).await.unwrap();

    assert_eq!(source.forced.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_unauthorized_is_returned_as_api_error() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": { "message": "bad token" } })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = AuthorizedClient::new(server.uri(), Arc::new(RotatingSource::default()));
    let url = client.url("chat");
    let err = client.send(|http| http.post(&url)).await.unwrap_err();

    match err {
        CustomOAuthError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad token");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_forced_refresh_skips_the_retry() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(RotatingSource {
        fail_force: true,
        ..RotatingSource::default()
    });
    let client = AuthorizedClient::new(server.uri(), source);
    let url = client.url("chat");
    let err = client.send(|http| http.post(&url)).await.unwrap_err();

    assert!(matches!(err, CustomOAuthError::Api { status: 401, .. }));
}

#[tokio::test]
async fn other_errors_do_not_trigger_refresh() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(RotatingSource::default());
    let client = AuthorizedClient::new(server.uri(), source.clone());
    let url = client.url("chat");
    let err = client.send(|http| http.post(&url)).await.unwrap_err();

    assert!(matches!(err, CustomOAuthError::Api { status: 429, .. }));
    assert_eq!(source.forced.load(Ordering::SeqCst), 0);
    assert!(!client.handle_auth_error(reqwest::StatusCode::FORBIDDEN).await);
}

#[tokio::test]
async fn device_flow_source_recovers_from_rejected_token() {
    let auth_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "renewed",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&auth_server)
        .await;

    let api = MockServer::start().await;
    Mock::given(header("authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    let device = DeviceFlowClient::new(auth_server.uri(), "test-cli", manager(&dir))
        .unwrap()
        .with_clock(clock());
    device
        .manager()
        .save_credentials(&credential("revoked", Some("r"), Some(NOW + HOUR_MS)))
        .await
        .unwrap();

    let client = AuthorizedClient::new(api.uri(), Arc::new(device));
    let url = client.url("chat");
    client.send(|http| http.post(&url)).await.unwrap();
}

#[tokio::test]
async fn static_key_mode_never_contacts_the_auth_server() {
    let auth_server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&auth_server)
        .await;

    let dir = TempDir::new().unwrap();
    // An expired stored credential must not matter in static-key mode.
    manager(&dir)
        .save_credentials(&credential("expired", Some("r"), Some(NOW - HOUR_MS)))
        .await
        .unwrap();

    let settings = CustomOAuthSettings::builder()
        .api_url("https://api.example".to_string())
        .auth_server_url(auth_server.uri())
        .client_id("test-cli".to_string())
        .static_api_key("sk-static".to_string())
        .credential_path(dir.path().join("custom_oauth_credentials.json"))
        .build();
    let client = AuthorizedClient::from_settings(&settings).unwrap();

    assert_eq!(client.source().access_token(false).await.unwrap(), "sk-static");
    assert_eq!(client.source().access_token(true).await.unwrap(), "sk-static");
}

#[tokio::test]
async fn static_key_source_ignores_force_refresh() {
    let source = StaticKeySource::new("sk").unwrap();
    assert_eq!(source.access_token(true).await.unwrap(), "sk");
}
