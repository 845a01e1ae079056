// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP-level tests for the secret store backends.

use lkp_core::CancelToken;
use lkp_vault::{
    PemDirProvider, RestSecretClient, RestSecretConfig, SecretStore, VaultError, VaultKv2Client,
    VaultKv2Config,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn kv2_config(base_url: String) -> VaultKv2Config {
    VaultKv2Config {
        base_url,
        token: Some("tok-123".into()),
        mtls_thumbprint: None,
        mtls_subject: None,
        cert_store_name: "My".into(),
        cert_store_location: "CurrentUser".into(),
    }
}

fn kv2_client(server: &MockServer) -> VaultKv2Client {
    VaultKv2Client::new(kv2_config(server.uri()), &PemDirProvider::new("/tmp")).unwrap()
}

#[tokio::test]
async fn vault_client_reads_nested_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/oracle/hr"))
        .and(header("Authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "data": { "value": "p@ss" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = kv2_client(&server);
    let secret = client
        .get_secret("oracle/hr", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(secret, "p@ss");
    assert_eq!(client.provider_name(), "vault");
}

#[tokio::test]
async fn vault_client_maps_forbidden_to_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/oracle/hr"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = kv2_client(&server)
        .get_secret("oracle/hr", &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Auth { .. }), "{err:?}");
}

#[tokio::test]
async fn vault_client_maps_missing_and_empty_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/blank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "data": { "value": "" } }
        })))
        .mount(&server)
        .await;

    let client = kv2_client(&server);
    let cancel = CancelToken::new();
    assert!(matches!(
        client.get_secret("gone", &cancel).await.unwrap_err(),
        VaultError::NotFound { .. }
    ));
    assert!(matches!(
        client.get_secret("blank", &cancel).await.unwrap_err(),
        VaultError::NotFound { .. }
    ));
}

#[tokio::test]
async fn vault_client_preserves_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/x"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = kv2_client(&server)
        .get_secret("x", &CancelToken::new())
        .await
        .unwrap_err();
    match err {
        VaultError::Transport { status, .. } => assert_eq!(status, Some(503)),
        other => panic!("expected Transport, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_token_short_circuits_the_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": {"data": {"value": "v"}}}))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = kv2_client(&server)
        .get_secret("slow", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, VaultError::Cancelled);
}

#[tokio::test]
async fn rest_client_reads_flat_value_with_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/secrets/db/pwd"))
        .and(header("X-API-Key", "k-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "secret": { "value": "hunter2" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestSecretClient::new(RestSecretConfig {
        base_url: server.uri(),
        api_key: "k-9".into(),
    })
    .unwrap();
    let secret = client
        .get_secret("db/pwd", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(secret, "hunter2");
    assert_eq!(client.provider_name(), "rest");
}

#[tokio::test]
async fn rest_client_maps_unauthorized_to_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/secrets/db/pwd"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = RestSecretClient::new(RestSecretConfig {
        base_url: server.uri(),
        api_key: "wrong".into(),
    })
    .unwrap();
    let err = client
        .get_secret("db/pwd", &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Auth { .. }));
}
