// SPDX-License-Identifier: MIT OR Apache-2.0
//! S3-compatible blob provider.
//!
//! Keys join `destination_path` and the file name with `/` separators. The
//! bucket is probed once per provider instance and created when absent;
//! uploads overwrite by object-store semantics.

use crate::{UploadError, UploadProvider, UploadReceipt};
use async_trait::async_trait;
use lkp_core::{CancelToken, ProviderKind};
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Connection settings for the blob store.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Service endpoint, e.g. `http://minio.internal:9000`.
    pub endpoint: String,
    /// Region name; S3-compatible stores accept any label.
    pub region: String,
    /// Container (bucket) receiving the artifacts.
    pub bucket: String,
    /// Access key; falls back to the ambient credential chain when absent.
    pub access_key: Option<String>,
    /// Secret key; falls back to the ambient credential chain when absent.
    pub secret_key: Option<String>,
    /// Use path-style addressing (required by most self-hosted stores).
    pub path_style: bool,
}

/// Object-store destination.
pub struct BlobProvider {
    bucket: Bucket,
    config: BlobConfig,
    ensured: OnceCell<()>,
}

impl BlobProvider {
    /// Build the provider; credentials and region are validated eagerly,
    /// the bucket probe happens on first upload.
    pub fn new(config: BlobConfig) -> Result<Self, UploadError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| UploadError::Config(format!("blob credentials: {e}")))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| UploadError::Config(format!("blob bucket handle: {e}")))?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            config,
            ensured: OnceCell::new(),
        })
    }

    /// Join destination path and file name into an object key with `/`
    /// separators and no leading slash.
    #[must_use]
    pub fn object_key(destination_path: &str, file_name: &str) -> String {
        let mut segments: Vec<String> = destination_path
            .replace('\\', "/")
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();
        segments.push(file_name.to_string());
        segments.join("/")
    }

    async fn ensure_bucket(&self) -> Result<(), UploadError> {
        self.ensured
            .get_or_try_init(|| async {
                let exists = self
                    .bucket
                    .exists()
                    .await
                    .map_err(|e| UploadError::Io(format!("bucket probe: {e}")))?;
                if exists {
                    return Ok(());
                }
                info!(
                    target: "lakeport.upload",
                    bucket = %self.config.bucket,
                    "bucket absent; creating"
                );
                let region = Region::Custom {
                    region: self.config.region.clone(),
                    endpoint: self.config.endpoint.clone(),
                };
                let credentials = Credentials::new(
                    self.config.access_key.as_deref(),
                    self.config.secret_key.as_deref(),
                    None,
                    None,
                    None,
                )
                .map_err(|e| UploadError::Config(format!("blob credentials: {e}")))?;
                Bucket::create(
                    &self.config.bucket,
                    region,
                    credentials,
                    BucketConfiguration::default(),
                )
                .await
                .map_err(|e| UploadError::Io(format!("bucket create: {e}")))?;
                Ok(())
            })
            .await
            .copied()
    }
}

#[async_trait]
impl UploadProvider for BlobProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Blob
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

        tokio::select! {
            () = cancel.cancelled() => return Err(UploadError::Cancelled),
            ensured = self.ensure_bucket() => ensured?,
        }

        let key = Self::object_key(destination_path, file_name);
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = self.bucket.put_object(&key, data) => result
                .map_err(|e| UploadError::Io(format!("put {key}: {e}")))?,
        };
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(UploadError::Io(format!(
                "put {key}: unexpected status {status}"
            )));
        }

        let uri = format!("s3://{}/{key}", self.config.bucket);
        debug!(target: "lakeport.upload", %uri, bytes = data.len(), "blob delivered");
        Ok(UploadReceipt {
            path: uri,
            bytes_written: data.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_join_with_forward_slashes() {
        assert_eq!(
            BlobProvider::object_key("exports/daily", "tr.parquet"),
            "exports/daily/tr.parquet"
        );
        assert_eq!(
            BlobProvider::object_key(r"exports\daily", "tr.parquet"),
            "exports/daily/tr.parquet"
        );
        assert_eq!(BlobProvider::object_key("", "tr.parquet"), "tr.parquet");
        assert_eq!(
            BlobProvider::object_key("/leading/", "tr.parquet"),
            "leading/tr.parquet"
        );
    }
}
