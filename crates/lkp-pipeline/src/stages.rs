// SPDX-License-Identifier: MIT OR Apache-2.0
//! The five built-in stages.

use crate::{ExecutionContext, PipelineStage, StageResult};
use async_trait::async_trait;
use lkp_core::{ControlRecord, ExecutionState, naming};
use lkp_error::{ErrorKind, Severity, StageError};
use lkp_pack::{ParquetPacker, sha256_hex, write_control};
use lkp_source::{DataSource, ExtractRequest, SourceError};
use lkp_transform::{TransformEngine, TransformError};
use lkp_upload::UploadProvider;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Stage 1: pull rows from the source database.
pub struct ExtractStage {
    source: Arc<dyn DataSource>,
}

impl ExtractStage {
    /// An extract stage over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PipelineStage for ExtractStage {
    fn name(&self) -> &'static str {
        "Extraction"
    }

    fn state(&self) -> ExecutionState {
        ExecutionState::Extracting
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult {
        let started = Instant::now();
        let request = ExtractRequest {
            connection_string: ctx.inputs.connection_string.clone(),
            query: ctx.inputs.query.clone(),
            parameters: ctx.inputs.parameters.clone(),
            timeout: ctx.inputs.command_timeout,
        };

        match self.source.extract(&request, &ctx.execution.cancel).await {
            Ok(table) => {
                let rows = table.row_count();
                ctx.execution.extracted_table = Some(table);
                StageResult::success()
                    .with_metric("rows", rows)
                    .with_metric("elapsed_ms", elapsed_ms(started))
            }
            Err(err) => {
                let kind = match &err {
                    SourceError::Cancelled => ErrorKind::Cancelled,
                    _ => ErrorKind::Extraction,
                };
                ctx.execution.record_error(
                    StageError::new(self.name(), kind, Severity::Critical, "extraction failed")
                        .with_cause(err.to_string()),
                );
                StageResult::failed(err.to_string()).with_metric("elapsed_ms", elapsed_ms(started))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transformation
// ---------------------------------------------------------------------------

/// Stage 2: apply the planned transformation steps.
pub struct TransformStage {
    engine: Arc<TransformEngine>,
}

impl TransformStage {
    /// A transform stage using `engine` for environment gating.
    #[must_use]
    pub fn new(engine: Arc<TransformEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PipelineStage for TransformStage {
    fn name(&self) -> &'static str {
        "Transformation"
    }

    fn state(&self) -> ExecutionState {
        ExecutionState::Transforming
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult {
        let started = Instant::now();
        let Some(table) = ctx.execution.extracted_table.as_ref() else {
            ctx.execution.record_error(StageError::new(
                self.name(),
                ErrorKind::Transform,
                Severity::Critical,
                "no extracted table to transform",
            ));
            return StageResult::failed("no extracted table");
        };

        if table.is_empty() {
            warn!(
                target: "lakeport.pipeline",
                execution_id = %ctx.execution.execution_id,
                "extracted table is empty; transformations skipped"
            );
            return StageResult::success()
                .with_message("empty table, transformations skipped")
                .with_metric("rows", 0)
                .with_metric("steps", 0);
        }

        let steps = ctx.inputs.steps.clone();
        match self
            .engine
            .apply(table, &steps, &ctx.execution.cancel)
            .await
        {
            Ok(transformed) => {
                let rows = transformed.row_count();
                ctx.execution.extracted_table = Some(transformed);
                StageResult::success()
                    .with_metric("rows", rows)
                    .with_metric("steps", steps.len())
                    .with_metric("elapsed_ms", elapsed_ms(started))
            }
            Err(err) => {
                let kind = match &err {
                    TransformError::Validation(_) => ErrorKind::Validation,
                    TransformError::Cancelled => ErrorKind::Cancelled,
                    _ => ErrorKind::Transform,
                };
                ctx.execution.record_error(
                    StageError::new(self.name(), kind, Severity::Critical, "transformation failed")
                        .with_cause(err.to_string()),
                );
                StageResult::failed(err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// Stage 3: serialise the table to columnar bytes.
pub struct PackStage {
    packer: ParquetPacker,
}

impl PackStage {
    /// A pack stage with a fresh writer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            packer: ParquetPacker::new(),
        }
    }
}

impl Default for PackStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for PackStage {
    fn name(&self) -> &'static str {
        "Packing"
    }

    fn state(&self) -> ExecutionState {
        ExecutionState::Packing
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult {
        let started = Instant::now();
        let Some(table) = ctx.execution.extracted_table.as_ref() else {
            ctx.execution.record_error(StageError::new(
                self.name(),
                ErrorKind::Pack,
                Severity::Critical,
                "no table available to pack",
            ));
            return StageResult::failed("no table available to pack");
        };

        let rows = table.row_count();
        match self
            .packer
            .write(table, &ctx.inputs.pack_options, &ctx.execution.cancel)
        {
            Ok(bytes) => {
                let size = bytes.len();
                ctx.execution.packed_bytes = Some(bytes);
                StageResult::success()
                    .with_metric("rows", rows)
                    .with_metric("bytes", size)
                    .with_metric("elapsed_ms", elapsed_ms(started))
            }
            Err(err) => {
                ctx.execution.record_error(
                    StageError::new(self.name(), ErrorKind::Pack, Severity::Critical, "packing failed")
                        .with_cause(err.to_string()),
                );
                StageResult::failed(err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Control generation
// ---------------------------------------------------------------------------

/// Stage 4: checksum the artifact and render the control sidecar.
pub struct ControlGenerationStage;

#[async_trait]
impl PipelineStage for ControlGenerationStage {
    fn name(&self) -> &'static str {
        "ControlGeneration"
    }

    fn state(&self) -> ExecutionState {
        ExecutionState::GeneratingControl
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult {
        let started = Instant::now();
        let Some(packed) = ctx.execution.packed_bytes.as_ref() else {
            ctx.execution.record_error(StageError::new(
                self.name(),
                ErrorKind::Control,
                Severity::Critical,
                "no packed artifact to describe",
            ));
            return StageResult::failed("no packed artifact to describe");
        };

        let record = ControlRecord {
            record_count: ctx
                .execution
                .extracted_table
                .as_ref()
                .map(|t| t.row_count() as u64)
                .unwrap_or(0),
            ref_date: ctx.execution.start_time,
            checksum: sha256_hex(packed),
            timestamp: chrono::Utc::now(),
            dataset_name: naming::dataset_name(&ctx.execution.dataset_id, ctx.execution.start_time),
            source: ctx.inputs.source_kind.to_string(),
        };

        match write_control(&record) {
            Ok(bytes) => {
                let size = bytes.len();
                ctx.execution.control_file_name = Some(record.file_name());
                ctx.execution.control_bytes = Some(bytes);
                StageResult::success()
                    .with_metric("records", record.record_count)
                    .with_metric("bytes", size)
                    .with_metric("elapsed_ms", elapsed_ms(started))
            }
            Err(err) => {
                ctx.execution.record_error(
                    StageError::new(
                        self.name(),
                        ErrorKind::Control,
                        Severity::Critical,
                        "control record generation failed",
                    )
                    .with_cause(err.to_string()),
                );
                StageResult::failed(err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// Stage 5: deliver the artifact and then its control record through one
/// provider instance.
pub struct PublishStage {
    provider: Arc<dyn UploadProvider>,
}

impl PublishStage {
    /// A publish stage over `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn UploadProvider>) -> Self {
        Self { provider }
    }

    async fn write_local_copies(ctx: &ExecutionContext) {
        let Some(dir) = ctx.inputs.local_copy_path.as_ref() else {
            return;
        };
        let mut pairs: Vec<(String, &[u8])> = Vec::new();
        if let Some(packed) = ctx.execution.packed_bytes.as_ref() {
            pairs.push((ctx.inputs.file_name.clone(), packed));
        }
        if let (Some(control), Some(name)) = (
            ctx.execution.control_bytes.as_ref(),
            ctx.execution.control_file_name.as_ref(),
        ) {
            pairs.push((name.clone(), control));
        }

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!(
                target: "lakeport.pipeline",
                execution_id = %ctx.execution.execution_id,
                dir = %dir.display(),
                error = %e,
                "local copy directory could not be created"
            );
            return;
        }
        for (name, bytes) in pairs {
            let path = dir.join(&name);
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                error!(
                    target: "lakeport.pipeline",
                    execution_id = %ctx.execution.execution_id,
                    path = %path.display(),
                    error = %e,
                    "local copy failed"
                );
            }
        }
    }
}

#[async_trait]
impl PipelineStage for PublishStage {
    fn name(&self) -> &'static str {
        "Publish"
    }

    fn state(&self) -> ExecutionState {
        ExecutionState::Publishing
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult {
        let started = Instant::now();
        let destination = ctx.inputs.destination_path.clone();
        let file_name = ctx.inputs.file_name.clone();

        let artifact = match ctx.execution.packed_bytes.as_ref() {
            Some(packed) => {
                self.provider
                    .upload(&destination, &file_name, packed, &ctx.execution.cancel)
                    .await
            }
            None => {
                ctx.execution.record_error(StageError::new(
                    self.name(),
                    ErrorKind::Upload,
                    Severity::Error,
                    "no packed artifact to publish",
                ));
                return StageResult::failed("no packed artifact to publish");
            }
        };
        let receipt = match artifact {
            Ok(receipt) => receipt,
            Err(err) => {
                ctx.execution.record_error(
                    StageError::new(self.name(), ErrorKind::Upload, Severity::Error, "artifact upload failed")
                        .with_cause(err.to_string()),
                );
                return StageResult::failed(err.to_string());
            }
        };

        let control_result = match (
            ctx.execution.control_bytes.as_ref(),
            ctx.execution.control_file_name.as_ref(),
        ) {
            (Some(control), Some(control_name)) => {
                self.provider
                    .upload(&destination, control_name, control, &ctx.execution.cancel)
                    .await
            }
            _ => {
                ctx.execution.record_error(StageError::new(
                    self.name(),
                    ErrorKind::Upload,
                    Severity::Error,
                    "no control record to publish",
                ));
                return StageResult::failed("no control record to publish");
            }
        };
        if let Err(err) = control_result {
            ctx.execution.record_error(
                StageError::new(
                    self.name(),
                    ErrorKind::Upload,
                    Severity::Error,
                    "control record upload failed",
                )
                .with_cause(err.to_string()),
            );
            return StageResult::failed(err.to_string());
        }

        let artifact_bytes = receipt.bytes_written;
        ctx.execution.published_uri = Some(receipt.path);

        if ctx.inputs.keep_local_copy {
            Self::write_local_copies(ctx).await;
        }

        StageResult::success()
            .with_metric("bytes", artifact_bytes)
            .with_metric("elapsed_ms", elapsed_ms(started))
    }
}

/// The standard five-stage chain in contract order.
#[must_use]
pub fn standard_stages(
    source: Arc<dyn DataSource>,
    transform_engine: Arc<TransformEngine>,
    provider: Arc<dyn UploadProvider>,
) -> Vec<Arc<dyn PipelineStage>> {
    vec![
        Arc::new(ExtractStage::new(source)),
        Arc::new(TransformStage::new(transform_engine)),
        Arc::new(PackStage::new()),
        Arc::new(ControlGenerationStage),
        Arc::new(PublishStage::new(provider)),
    ]
}
