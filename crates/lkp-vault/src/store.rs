// SPDX-License-Identifier: MIT OR Apache-2.0
//! Secret store backends.
//!
//! Both clients build their `reqwest::Client` once at construction and
//! reuse it for every fetch; per-call clients would churn connection pools.
//! The HTTP timeout is 30 seconds.

use crate::cert::CertificateProvider;
use crate::error::VaultError;
use async_trait::async_trait;
use lkp_core::CancelToken;
use serde::Deserialize;
use std::time::Duration;
use tracing::error;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches secret values from a remote store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Backend tag (e.g. `"vault"`, `"rest"`).
    fn provider_name(&self) -> &str;

    /// Fetch the secret at `path`.
    async fn get_secret(&self, path: &str, cancel: &CancelToken) -> Result<String, VaultError>;
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

fn transport_error(provider: &str, err: &reqwest::Error) -> VaultError {
    let wrapped = VaultError::Transport {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    };
    if wrapped.looks_like_tls_failure() {
        error!(
            target: "lakeport.vault",
            provider,
            message = %err,
            "TLS problem talking to the secret store; check the client certificate"
        );
    }
    wrapped
}

async fn execute(
    provider: &str,
    request: reqwest::RequestBuilder,
    path: &str,
    cancel: &CancelToken,
) -> Result<reqwest::Response, VaultError> {
    let response = tokio::select! {
        () = cancel.cancelled() => return Err(VaultError::Cancelled),
        result = request.send() => result.map_err(|e| transport_error(provider, &e))?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 | 403 => Err(VaultError::Auth {
            provider: provider.to_string(),
        }),
        404 => Err(VaultError::NotFound {
            path: path.to_string(),
        }),
        code => Err(VaultError::Transport {
            status: Some(code),
            message: format!("unexpected status from secret store: {status}"),
        }),
    }
}

fn non_empty(value: String, path: &str) -> Result<String, VaultError> {
    if value.is_empty() {
        Err(VaultError::NotFound {
            path: path.to_string(),
        })
    } else {
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Vault KV-v2 backend
// ---------------------------------------------------------------------------

/// Configuration for [`VaultKv2Client`].
#[derive(Debug, Clone)]
pub struct VaultKv2Config {
    /// Base URL, e.g. `https://vault.internal:8200`.
    pub base_url: String,
    /// Bearer token; optional when mTLS alone authenticates us.
    pub token: Option<String>,
    /// Thumbprint of the client certificate for mutual TLS.
    pub mtls_thumbprint: Option<String>,
    /// Subject name of the client certificate for mutual TLS.
    pub mtls_subject: Option<String>,
    /// Certificate store name handed to the provider.
    pub cert_store_name: String,
    /// Certificate store location handed to the provider.
    pub cert_store_location: String,
}

/// Client for a Vault KV version-2 secrets engine.
///
/// `GET {base}/v1/secret/data/{path}` with `Authorization: Bearer {token}`;
/// the value lives at `data.data.value` in the response body.
pub struct VaultKv2Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Kv2Response {
    data: Kv2Data,
}

#[derive(Deserialize)]
struct Kv2Data {
    data: Kv2Payload,
}

#[derive(Deserialize)]
struct Kv2Payload {
    #[serde(default)]
    value: String,
}

impl VaultKv2Client {
    /// Build the client, resolving the mTLS identity up front when one is
    /// configured. Thumbprint lookup wins over subject-name lookup.
    pub fn new(
        config: VaultKv2Config,
        certs: &dyn CertificateProvider,
    ) -> Result<Self, VaultError> {
        let mut builder = reqwest::Client::builder().timeout(HTTP_TIMEOUT);

        let identity = if let Some(thumbprint) = &config.mtls_thumbprint {
            Some(certs.required_by_thumbprint(
                thumbprint,
                &config.cert_store_name,
                &config.cert_store_location,
            )?)
        } else if let Some(subject) = &config.mtls_subject {
            Some(certs.required_by_subject_name(
                subject,
                &config.cert_store_name,
                &config.cert_store_location,
            )?)
        } else {
            None
        };

        if let Some(identity) = identity {
            let identity = reqwest::Identity::from_pem(&identity.pem)
                .map_err(|e| VaultError::Config(format!("unusable client certificate: {e}")))?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }
}

#[async_trait]
impl SecretStore for VaultKv2Client {
    fn provider_name(&self) -> &str {
        "vault"
    }

    async fn get_secret(&self, path: &str, cancel: &CancelToken) -> Result<String, VaultError> {
        let url = format!("{}/v1/secret/data/{path}", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = execute(self.provider_name(), request, path, cancel).await?;
        let body: Kv2Response = response.json().await.map_err(|e| VaultError::Transport {
            status: None,
            message: format!("malformed secret response: {e}"),
        })?;
        non_empty(body.data.data.value, path)
    }
}

// ---------------------------------------------------------------------------
// REST API-key backend
// ---------------------------------------------------------------------------

/// Configuration for [`RestSecretClient`].
#[derive(Debug, Clone)]
pub struct RestSecretConfig {
    /// Base URL of the store.
    pub base_url: String,
    /// API key sent as `X-API-Key`.
    pub api_key: String,
}

/// Client for the REST secret store.
///
/// `GET {base}/api/secrets/{path}` with `X-API-Key: {key}`; the value lives
/// at `secret.value` in the response body.
pub struct RestSecretClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct RestResponse {
    secret: RestPayload,
}

#[derive(Deserialize)]
struct RestPayload {
    #[serde(default)]
    value: String,
}

impl RestSecretClient {
    /// Build the client.
    pub fn new(config: RestSecretConfig) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl SecretStore for RestSecretClient {
    fn provider_name(&self) -> &str {
        "rest"
    }

    async fn get_secret(&self, path: &str, cancel: &CancelToken) -> Result<String, VaultError> {
        let url = format!("{}/api/secrets/{path}", self.base_url);
        let request = self.http.get(&url).header("X-API-Key", &self.api_key);
        let response = execute(self.provider_name(), request, path, cancel).await?;
        let body: RestResponse = response.json().await.map_err(|e| VaultError::Transport {
            status: None,
            message: format!("malformed secret response: {e}"),
        })?;
        non_empty(body.secret.value, path)
    }
}
