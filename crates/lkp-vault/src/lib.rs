// SPDX-License-Identifier: MIT OR Apache-2.0
//! Secret materialization for Lakeport.
//!
//! Connection templates may embed `{vault:<path>}` placeholders. At job
//! build time the [`TemplateResolver`] rewrites them using a [`SecretStore`]
//! backend behind a process-wide [`SecretCache`] (5-minute absolute TTL,
//! per-key single flight). Two backends are provided: a Vault KV-v2 client
//! with optional mutual TLS, and a simpler REST store authenticated by API
//! key.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Process-wide secret cache.
pub mod cache;
/// Abstract certificate lookup for mutual TLS.
pub mod cert;
/// Error type shared by the secret-store clients.
pub mod error;
/// Connection-template rewriting.
pub mod resolver;
/// Secret store backends.
pub mod store;

pub use cache::SecretCache;
pub use cert::{CertificateProvider, ClientIdentity, PemDirProvider};
pub use error::VaultError;
pub use resolver::TemplateResolver;
pub use store::{RestSecretClient, RestSecretConfig, SecretStore, VaultKv2Client, VaultKv2Config};
