// SPDX-License-Identifier: MIT OR Apache-2.0
//! Artifact delivery providers.
//!
//! One provider instance serves one job execution; the publish stage uploads
//! the packed artifact first and the control record second through the same
//! instance. Both providers wrap failures in [`UploadError`] and honor
//! cancellation promptly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// S3-compatible blob provider.
pub mod blob;
/// Atomic filesystem provider.
pub mod fs;

use async_trait::async_trait;
use lkp_core::{CancelToken, ProviderKind};
use std::path::PathBuf;
use std::sync::Arc;

pub use blob::{BlobConfig, BlobProvider};
pub use fs::FsProvider;

/// Failures surfaced by delivery providers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// The underlying write or transfer failed.
    #[error("upload failed: {0}")]
    Io(String),

    /// The upload was cancelled.
    #[error("upload cancelled")]
    Cancelled,

    /// The provider is not configured for this destination.
    #[error("upload provider misconfigured: {0}")]
    Config(String),
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Canonical location of the delivered artifact: an absolute path for
    /// the filesystem provider, an `s3://` URI for the blob provider.
    pub path: String,
    /// Bytes delivered.
    pub bytes_written: u64,
}

/// Delivers bytes to a destination.
#[async_trait]
pub trait UploadProvider: Send + Sync {
    /// Provider tag (`fs` or `blob`).
    fn kind(&self) -> ProviderKind;

    /// Deliver `data` as `file_name` under `destination_path`.
    async fn upload(
        &self,
        destination_path: &str,
        file_name: &str,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<UploadReceipt, UploadError>;
}

/// Builds providers by tag from the host configuration.
pub struct ProviderFactory {
    fs_base_path: PathBuf,
    blob: Option<BlobConfig>,
}

impl ProviderFactory {
    /// A factory serving `fs` from `fs_base_path` and `blob` from `blob`
    /// (when configured).
    #[must_use]
    pub fn new(fs_base_path: impl Into<PathBuf>, blob: Option<BlobConfig>) -> Self {
        Self {
            fs_base_path: fs_base_path.into(),
            blob,
        }
    }

    /// A fresh provider instance for `kind`.
    ///
    /// Instances are created per execution so provider-local state (such as
    /// the blob bucket probe) has execution scope.
    pub fn create(&self, kind: ProviderKind) -> Result<Arc<dyn UploadProvider>, UploadError> {
        match kind {
            ProviderKind::Fs => Ok(Arc::new(FsProvider::new(self.fs_base_path.clone()))),
            ProviderKind::Blob => {
                let config = self.blob.clone().ok_or_else(|| {
                    UploadError::Config("blob destination requested but no blob store configured".into())
                })?;
                Ok(Arc::new(BlobProvider::new(config)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_serves_fs_and_rejects_unconfigured_blob() {
        let factory = ProviderFactory::new("/tmp/out", None);
        assert_eq!(factory.create(ProviderKind::Fs).unwrap().kind(), ProviderKind::Fs);
        assert!(matches!(
            factory.create(ProviderKind::Blob),
            Err(UploadError::Config(_))
        ));
    }
}
