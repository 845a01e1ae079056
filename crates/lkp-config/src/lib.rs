// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading for Lakeport.
//!
//! Two inputs exist: the host TOML file — service-wide settings, connection
//! templates, secret-store backend, upload providers — and the per-dataset
//! `dataset-*.json` files. Host config problems fail startup; a broken
//! dataset file is logged and skipped so the rest of the schedule survives.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// `dataset-*.json` loading.
pub mod datasets;
/// Host TOML configuration.
pub mod host;

pub use datasets::load_datasets;
pub use host::{
    BlobSection, ConfigWarning, HostConfig, SecretProviderKind, ServiceSection, UploadSection,
    VaultSection, load_host_config,
};

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested file or directory was not found / not readable.
    #[error("config path not readable: {path}: {reason}")]
    Unreadable {
        /// Offending path.
        path: String,
        /// I/O detail.
        reason: String,
    },

    /// The file could not be parsed.
    #[error("failed to parse config: {reason}")]
    Parse {
        /// Parse failure detail.
        reason: String,
    },

    /// A `${NAME}` token references an environment variable that is unset.
    #[error("environment variable '{name}' referenced by configuration is not set")]
    MissingEnv {
        /// Variable name.
        name: String,
    },

    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    Validation {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}
