// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory test doubles for Lakeport integration tests.
//!
//! These live in a crate of their own (rather than `#[cfg(test)]` modules)
//! so the end-to-end tests in the workspace root can share them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use lkp_core::{CancelToken, SourceKind, TabularData};
use lkp_scheduler::SourceResolver;
use lkp_source::{DataSource, ExtractRequest, SourceError};
use lkp_vault::{SecretStore, VaultError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// A programmable data source: canned result, optional stall, request log.
pub struct MockSource {
    kind: SourceKind,
    result: Mutex<Result<TabularData, SourceError>>,
    delay: Duration,
    requests: Mutex<Vec<ExtractRequest>>,
    extractions: AtomicUsize,
}

impl MockSource {
    /// A source returning `table` immediately.
    #[must_use]
    pub fn returning(table: TabularData) -> Self {
        Self {
            kind: SourceKind::SqlServer,
            result: Mutex::new(Ok(table)),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    /// A source failing every extraction with `error`.
    #[must_use]
    pub fn failing(error: SourceError) -> Self {
        Self {
            kind: SourceKind::SqlServer,
            result: Mutex::new(Err(error)),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    /// Stall each extraction for `delay` (cancellable) before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report `kind` from the driver.
    #[must_use]
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of extractions attempted.
    #[must_use]
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Snapshot of every request seen.
    #[must_use]
    pub fn requests(&self) -> Vec<ExtractRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for MockSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn extract(
        &self,
        request: &ExtractRequest,
        cancel: &CancelToken,
    ) -> Result<TabularData, SourceError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(SourceError::Cancelled),
                () = tokio::time::sleep(self.delay) => {}
            }
        }
        self.result.lock().unwrap().clone()
    }
}

/// A [`SourceResolver`] handing out one shared mock for every kind.
pub struct MockSourceResolver {
    source: Arc<MockSource>,
}

impl MockSourceResolver {
    /// Resolve every kind to `source`.
    #[must_use]
    pub fn new(source: Arc<MockSource>) -> Self {
        Self { source }
    }
}

impl SourceResolver for MockSourceResolver {
    fn resolve(&self, _kind: SourceKind) -> Arc<dyn DataSource> {
        Arc::clone(&self.source) as Arc<dyn DataSource>
    }
}

// ---------------------------------------------------------------------------
// MockSecretStore
// ---------------------------------------------------------------------------

/// A map-backed secret store counting upstream fetches.
pub struct MockSecretStore {
    secrets: BTreeMap<String, String>,
    fetches: AtomicUsize,
}

impl MockSecretStore {
    /// A store serving `secrets`.
    #[must_use]
    pub fn new(secrets: BTreeMap<String, String>) -> Self {
        Self {
            secrets,
            fetches: AtomicUsize::new(0),
        }
    }

    /// A store serving a single path/value pair.
    #[must_use]
    pub fn single(path: &str, value: &str) -> Self {
        Self::new([(path.to_string(), value.to_string())].into_iter().collect())
    }

    /// Number of upstream fetches (cache misses).
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn get_secret(&self, path: &str, _cancel: &CancelToken) -> Result<String, VaultError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .get(path)
            .cloned()
            .ok_or_else(|| VaultError::NotFound {
                path: path.to_string(),
            })
    }
}
