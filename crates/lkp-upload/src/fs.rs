// SPDX-License-Identifier: MIT OR Apache-2.0
//! Atomic filesystem provider.
//!
//! Writes land in `{file}.tmp.{uuid}` next to the final name and are
//! move-renamed into place, so a concurrent reader of the destination sees
//! either the full prior content or the full new content, never a partial
//! write. The temp file is removed on any failure.

use crate::{UploadError, UploadProvider, UploadReceipt};
use async_trait::async_trait;
use lkp_core::{CancelToken, ProviderKind};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Local or mounted filesystem destination.
#[derive(Debug, Clone)]
pub struct FsProvider {
    base_path: PathBuf,
}

impl FsProvider {
    /// A provider rooted at `base_path`.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Normalize a destination path for the local platform: foreign
    /// separators unified, empty and `.` segments dropped, `..` rejected.
    fn normalize(destination_path: &str) -> Result<PathBuf, UploadError> {
        let mut normalized = PathBuf::new();
        for segment in destination_path.replace('\\', "/").split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(UploadError::Config(format!(
                        "destination path must not traverse upward: {destination_path}"
                    )));
                }
                other => normalized.push(other),
            }
        }
        Ok(normalized)
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

#[async_trait]
impl UploadProvider for FsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fs
    }

    async fn upload(
        &self,
        destination_path: &str,
        file_name: &str,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<UploadReceipt, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let dir = self.base_path.join(Self::normalize(destination_path)?);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| UploadError::Io(format!("creating {}: {e}", dir.display())))?;

        let final_path = dir.join(file_name);
        let temp_path = dir.join(format!("{file_name}.tmp.{}", Uuid::new_v4().simple()));

        let write = tokio::fs::write(&temp_path, data);
        let written = tokio::select! {
            () = cancel.cancelled() => Err(UploadError::Cancelled),
            result = write => result.map_err(|e| {
                UploadError::Io(format!("writing {}: {e}", temp_path.display()))
            }),
        };
        if let Err(err) = written {
            remove_quietly(&temp_path).await;
            return Err(err);
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            remove_quietly(&temp_path).await;
            return Err(UploadError::Io(format!(
                "moving into place at {}: {e}",
                final_path.display()
            )));
        }

        let absolute = tokio::fs::canonicalize(&final_path)
            .await
            .unwrap_or(final_path);
        debug!(target: "lakeport.upload", path = %absolute.display(), bytes = data.len(), "file delivered");
        Ok(UploadReceipt {
            path: absolute.display().to_string(),
            bytes_written: data.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(dir: &tempfile::TempDir) -> FsProvider {
        FsProvider::new(dir.path())
    }

    #[tokio::test]
    async fn upload_creates_parents_and_reports_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = provider(&dir)
            .upload("trades/daily", "tr_20240115.parquet", b"payload", &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(receipt.bytes_written, 7);
        assert!(Path::new(&receipt.path).is_absolute());
        let on_disk = std::fs::read(dir.path().join("trades/daily/tr_20240115.parquet")).unwrap();
        assert_eq!(on_disk, b"payload");
    }

    #[tokio::test]
    async fn upload_replaces_existing_content_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let fs = provider(&dir);
        let cancel = CancelToken::new();
        fs.upload("out", "a.bin", b"first", &cancel).await.unwrap();
        fs.upload("out", "a.bin", b"second version", &cancel).await.unwrap();

        let on_disk = std::fs::read(dir.path().join("out/a.bin")).unwrap();
        assert_eq!(on_disk, b"second version");
    }

    #[tokio::test]
    async fn no_temp_files_survive_a_successful_upload() {
        let dir = tempfile::tempdir().unwrap();
        provider(&dir)
            .upload("out", "a.bin", b"x", &CancelToken::new())
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn backslash_separators_normalise() {
        let dir = tempfile::tempdir().unwrap();
        provider(&dir)
            .upload(r"nested\deep", "a.bin", b"x", &CancelToken::new())
            .await
            .unwrap();
        assert!(dir.path().join("nested/deep/a.bin").exists());
    }

    #[tokio::test]
    async fn upward_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = provider(&dir)
            .upload("../escape", "a.bin", b"x", &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[tokio::test]
    async fn cancelled_upload_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = provider(&dir)
            .upload("out", "a.bin", b"x", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, UploadError::Cancelled);
        assert!(!dir.path().join("out/a.bin").exists());
    }
}
