// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host TOML configuration.
//!
//! Secret-bearing fields (tokens, API keys, object-store credentials, and
//! connection templates) honor `${NAME}` environment interpolation so real
//! credentials never sit in the file.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Service-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Environment tag gating transformations (e.g. `Production`).
    pub environment: String,
    /// Directory scanned for `dataset-*.json`.
    pub datasets_dir: String,
    /// Hot-reload poll interval in seconds; 0 disables reloading.
    pub hot_reload_secs: u64,
    /// Shutdown grace period in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            environment: "Production".to_string(),
            datasets_dir: "datasets".to_string(),
            hot_reload_secs: 0,
            shutdown_grace_secs: 30,
        }
    }
}

/// Which secret-store backend serves `{vault:…}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretProviderKind {
    /// Vault KV-v2 over bearer token / mTLS.
    Vault,
    /// REST store authenticated by API key.
    Rest,
}

impl FromStr for SecretProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vault" => Ok(Self::Vault),
            "rest" => Ok(Self::Rest),
            other => Err(format!("unknown secret provider: {other}")),
        }
    }
}

impl fmt::Display for SecretProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vault => "vault",
            Self::Rest => "rest",
        })
    }
}

impl Serialize for SecretProviderKind {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretProviderKind {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Secret-store backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultSection {
    /// Backend selection.
    pub provider: SecretProviderKind,
    /// Base URL of the store.
    pub base_url: String,
    /// Bearer token for the Vault backend.
    #[serde(default)]
    pub token: Option<String>,
    /// API key for the REST backend.
    #[serde(default)]
    pub api_key: Option<String>,
    /// mTLS client certificate thumbprint.
    #[serde(default)]
    pub mtls_thumbprint: Option<String>,
    /// mTLS client certificate subject name.
    #[serde(default)]
    pub mtls_subject: Option<String>,
    /// Certificate store name handed to the provider.
    #[serde(default = "default_store_name")]
    pub cert_store_name: String,
    /// Certificate store location handed to the provider.
    #[serde(default = "default_store_location")]
    pub cert_store_location: String,
    /// Directory the PEM certificate provider reads from.
    #[serde(default)]
    pub cert_dir: Option<String>,
}

fn default_store_name() -> String {
    "My".to_string()
}

fn default_store_location() -> String {
    "CurrentUser".to_string()
}

/// Object-store provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlobSection {
    /// Service endpoint.
    pub endpoint: String,
    /// Region label.
    #[serde(default = "default_region")]
    pub region: String,
    /// Target bucket.
    pub bucket: String,
    /// Access key (supports `${NAME}`).
    #[serde(default)]
    pub access_key: Option<String>,
    /// Secret key (supports `${NAME}`).
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Path-style addressing for self-hosted stores.
    #[serde(default)]
    pub path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Upload provider settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadSection {
    /// Base path of the filesystem provider.
    pub fs_base_path: String,
    /// Blob store, when configured.
    pub blob: Option<BlobSection>,
}

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Service-wide settings.
    pub service: ServiceSection,
    /// Connection templates keyed by name; values may embed `{vault:…}`.
    pub connections: BTreeMap<String, String>,
    /// Secret-store backend, when configured.
    pub vault: Option<VaultSection>,
    /// Upload provider settings.
    pub upload: UploadSection,
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve
/// attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Field path.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A timeout or interval is unusually aggressive or lax.
    SuspiciousDuration {
        /// Field path.
        field: String,
        /// Configured value in seconds.
        secs: u64,
        /// Why it looks wrong.
        hint: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::SuspiciousDuration { field, secs, hint } => {
                write!(f, "'{field}' = {secs}s: {hint}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Replace every `${NAME}` token with the named environment variable.
pub fn interpolate_env(value: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let resolved = std::env::var(name).map_err(|_| ConfigError::MissingEnv {
            name: name.to_string(),
        })?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn interpolate_opt(value: &mut Option<String>) -> Result<(), ConfigError> {
    if let Some(inner) = value.as_mut() {
        *inner = interpolate_env(inner)?;
    }
    Ok(())
}

/// Load, interpolate, and validate the host configuration.
///
/// Returns the config together with advisory warnings the caller should
/// log; hard validation problems are an error.
pub fn load_host_config(path: &Path) -> Result<(HostConfig, Vec<ConfigWarning>), ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut config: HostConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })?;

    for template in config.connections.values_mut() {
        *template = interpolate_env(template)?;
    }
    if let Some(vault) = config.vault.as_mut() {
        interpolate_opt(&mut vault.token)?;
        interpolate_opt(&mut vault.api_key)?;
    }
    if let Some(blob) = config.upload.blob.as_mut() {
        interpolate_opt(&mut blob.access_key)?;
        interpolate_opt(&mut blob.secret_key)?;
    }

    let warnings = validate(&config)?;
    Ok((config, warnings))
}

/// Semantic validation: hard problems error, soft ones become warnings.
pub fn validate(config: &HostConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if config.service.environment.trim().is_empty() {
        reasons.push("service.environment must not be empty".to_string());
    }
    if config.service.datasets_dir.trim().is_empty() {
        reasons.push("service.datasets_dir must not be empty".to_string());
    }

    match &config.vault {
        Some(vault) => {
            if vault.base_url.trim().is_empty() {
                reasons.push("vault.base_url must not be empty".to_string());
            }
            match vault.provider {
                SecretProviderKind::Rest => {
                    if vault.api_key.as_deref().unwrap_or("").is_empty() {
                        reasons.push("vault.api_key is required for the rest provider".to_string());
                    }
                }
                SecretProviderKind::Vault => {
                    let has_token = vault.token.as_deref().is_some_and(|t| !t.is_empty());
                    let has_mtls =
                        vault.mtls_thumbprint.is_some() || vault.mtls_subject.is_some();
                    if !has_token && !has_mtls {
                        reasons.push(
                            "vault provider needs a token, an mTLS certificate, or both"
                                .to_string(),
                        );
                    }
                    if has_mtls && vault.cert_dir.is_none() {
                        warnings.push(ConfigWarning::MissingOptionalField {
                            field: "vault.cert_dir".to_string(),
                            hint: "mTLS is enabled but no certificate directory is configured"
                                .to_string(),
                        });
                    }
                }
            }
        }
        None => {
            let uses_vault = config
                .connections
                .values()
                .any(|template| template.contains("{vault:"));
            if uses_vault {
                warnings.push(ConfigWarning::MissingOptionalField {
                    field: "vault".to_string(),
                    hint: "connection templates reference the secret store but none is configured; those datasets will fail at build time"
                        .to_string(),
                });
            }
        }
    }

    if config.upload.fs_base_path.trim().is_empty() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "upload.fs_base_path".to_string(),
            hint: "fs destinations will fail until a base path is configured".to_string(),
        });
    }
    if config.service.hot_reload_secs > 0 && config.service.hot_reload_secs < 5 {
        warnings.push(ConfigWarning::SuspiciousDuration {
            field: "service.hot_reload_secs".to_string(),
            secs: config.service.hot_reload_secs,
            hint: "sub-5-second reload polling hammers the datasets directory".to_string(),
        });
    }
    if config.service.shutdown_grace_secs > 600 {
        warnings.push(ConfigWarning::SuspiciousDuration {
            field: "service.shutdown_grace_secs".to_string(),
            secs: config.service.shutdown_grace_secs,
            hint: "shutdown will hang for a long time on stuck executions".to_string(),
        });
    }

    if reasons.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::Validation { reasons })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("lakeport.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                [service]
                environment = "Staging"
            "#,
        );
        let (config, _warnings) = load_host_config(&path).unwrap();
        assert_eq!(config.service.environment, "Staging");
        assert_eq!(config.service.datasets_dir, "datasets");
        assert_eq!(config.service.shutdown_grace_secs, 30);
        assert!(config.vault.is_none());
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_tokens_interpolate_in_secret_fields() {
        // SAFETY: the variable name is unique to this test and nothing else
        // reads the environment concurrently.
        unsafe { std::env::set_var("LKP_TEST_TOKEN", "tok-9") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                [connections]
                hr = "User Id=svc;Password=${LKP_TEST_TOKEN};Data Source=//db/X"

                [vault]
                provider = "vault"
                base_url = "https://vault.internal:8200"
                token = "${LKP_TEST_TOKEN}"
            "#,
        );
        let (config, _) = load_host_config(&path).unwrap();
        assert_eq!(config.vault.unwrap().token.as_deref(), Some("tok-9"));
        assert!(config.connections["hr"].contains("Password=tok-9"));
    }

    #[test]
    fn missing_env_variable_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                [connections]
                hr = "Password=${LKP_TEST_DEFINITELY_UNSET}"
            "#,
        );
        let err = load_host_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv { name } if name == "LKP_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn vault_without_credentials_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                [vault]
                provider = "vault"
                base_url = "https://vault.internal:8200"
            "#,
        );
        let err = load_host_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("Vault".parse::<SecretProviderKind>().unwrap(), SecretProviderKind::Vault);
        assert_eq!("REST".parse::<SecretProviderKind>().unwrap(), SecretProviderKind::Rest);
        assert!("consul".parse::<SecretProviderKind>().is_err());
    }

    #[test]
    fn vault_placeholders_without_vault_section_warn() {
        let config = HostConfig {
            connections: [("hr".to_string(), "pw={vault:oracle/hr}".to_string())]
                .into_iter()
                .collect(),
            ..HostConfig::default()
        };
        let warnings = validate(&config).unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, ConfigWarning::MissingOptionalField { field, .. } if field == "vault"))
        );
    }

    #[test]
    fn interpolation_leaves_unterminated_tokens_alone() {
        assert_eq!(interpolate_env("plain").unwrap(), "plain");
        assert_eq!(interpolate_env("x=${unclosed").unwrap(), "x=${unclosed");
    }
}
