// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection-template rewriting.
//!
//! Templates may embed `{vault:<path>}` placeholders, where `<path>` is any
//! non-empty run of characters other than `}`. A template with no
//! placeholders is returned untouched without contacting the store, which
//! also makes resolution idempotent: a resolved string contains no
//! placeholders to resolve.

use crate::cache::SecretCache;
use crate::error::VaultError;
use crate::store::SecretStore;
use lkp_core::CancelToken;
use std::sync::Arc;
use tracing::debug;

const TOKEN_PREFIX: &str = "{vault:";

/// Rewrites connection templates using the secret store behind the cache.
pub struct TemplateResolver {
    store: Arc<dyn SecretStore>,
    cache: Arc<SecretCache>,
}

impl TemplateResolver {
    /// A resolver over `store`, caching through `cache`.
    pub fn new(store: Arc<dyn SecretStore>, cache: Arc<SecretCache>) -> Self {
        Self { store, cache }
    }

    /// Replace every `{vault:<path>}` occurrence in `template`.
    ///
    /// Each unique path is fetched once; the first unrecoverable secret
    /// error fails the whole resolution.
    pub async fn resolve(
        &self,
        template: &str,
        cancel: &CancelToken,
    ) -> Result<String, VaultError> {
        let paths = placeholder_paths(template);
        if paths.is_empty() {
            return Ok(template.to_string());
        }

        debug!(
            target: "lakeport.vault",
            placeholders = paths.len(),
            provider = self.store.provider_name(),
            "resolving connection template"
        );

        let mut resolved = template.to_string();
        for path in paths {
            let secret = self
                .cache
                .get_or_fetch(&path, self.store.as_ref(), cancel)
                .await?;
            resolved = resolved.replace(&format!("{TOKEN_PREFIX}{path}}}"), &secret);
        }
        Ok(resolved)
    }
}

/// Unique placeholder paths in first-occurrence order.
fn placeholder_paths(template: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(TOKEN_PREFIX) {
        let after = &rest[start + TOKEN_PREFIX.len()..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let path = &after[..end];
                if !paths.iter().any(|p| p == path) {
                    paths.push(path.to_string());
                }
                rest = &after[end + 1..];
            }
            // Unterminated or empty placeholder: leave it alone.
            _ => rest = after,
        }
    }
    paths
}
