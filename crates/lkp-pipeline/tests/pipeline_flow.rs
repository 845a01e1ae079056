// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage-chain behavior over in-memory collaborators.

use async_trait::async_trait;
use chrono::Utc;
use lkp_core::{
    CancelToken, ColumnDef, ExecutionState, JobExecution, LogicalType, ProviderKind, SourceKind,
    TabularData, Value,
};
use lkp_error::Severity;
use lkp_pipeline::{ExecutionContext, Pipeline, StageInputs, standard_stages};
use lkp_source::{DataSource, ExtractRequest, SourceError};
use lkp_transform::{StepRegistry, TransformEngine};
use lkp_upload::{UploadError, UploadProvider, UploadReceipt};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct CannedSource {
    result: Result<TabularData, SourceError>,
}

#[async_trait]
impl DataSource for CannedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SqlServer
    }

    async fn extract(
        &self,
        _request: &ExtractRequest,
        _cancel: &CancelToken,
    ) -> Result<TabularData, SourceError> {
        self.result.clone()
    }
}

#[derive(Default)]
struct RecordingProvider {
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
}

#[async_trait]
impl UploadProvider for RecordingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fs
    }

    async fn upload(
        &self,
        destination_path: &str,
        file_name: &str,
        data: &[u8],
        _cancel: &CancelToken,
    ) -> Result<UploadReceipt, UploadError> {
        self.uploads.lock().unwrap().push((
            destination_path.to_string(),
            file_name.to_string(),
            data.to_vec(),
        ));
        Ok(UploadReceipt {
            path: format!("/delivered/{destination_path}/{file_name}"),
            bytes_written: data.len() as u64,
        })
    }
}

fn trades_table() -> TabularData {
    let mut table = TabularData::with_schema(vec![
        ColumnDef::new("TradeId", LogicalType::Int64, false),
        ColumnDef::new("Symbol", LogicalType::String, true),
        ColumnDef::new("Price", LogicalType::Decimal, true),
    ]);
    for (id, symbol, price) in [
        (1i64, "VOD.L", "101.25"),
        (2, "AZN.L", "12034.00"),
        (3, "BP.L", "4.72"),
    ] {
        table.push_row(vec![
            Value::Int64(id),
            Value::String(symbol.into()),
            Value::Decimal(price.parse().unwrap()),
        ]);
    }
    table
}

async fn run_pipeline(
    source_result: Result<TabularData, SourceError>,
) -> (ExecutionContext, Arc<RecordingProvider>) {
    let provider = Arc::new(RecordingProvider::default());
    let stages = standard_stages(
        Arc::new(CannedSource {
            result: source_result,
        }),
        Arc::new(TransformEngine::new(
            Arc::new(StepRegistry::with_builtins()),
            "Production",
        )),
        Arc::clone(&provider) as Arc<dyn UploadProvider>,
    );
    let pipeline = Pipeline::new(stages);

    let mut inputs = StageInputs::empty();
    inputs.destination_path = "trades/daily".into();
    inputs.file_name = "tr_20240115.parquet".into();
    let mut ctx = ExecutionContext::new(JobExecution::new("tr1", Utc::now()), inputs);

    pipeline.run(&mut ctx).await;
    (ctx, provider)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_run_publishes_artifact_then_control() {
    let (ctx, provider) = run_pipeline(Ok(trades_table())).await;

    assert_eq!(ctx.execution.state, ExecutionState::Succeeded);
    assert!(ctx.execution.errors.is_empty());
    assert!(ctx.execution.published_uri.as_deref().unwrap().contains("tr_20240115.parquet"));

    let uploads = provider.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].1, "tr_20240115.parquet", "artifact first");
    assert!(uploads[1].1.ends_with(".ctl"), "control second");
    assert!(uploads[1].1.starts_with("tr1_"), "control name carries the dataset");
}

#[tokio::test]
async fn checksum_in_control_matches_packed_bytes() {
    let (ctx, provider) = run_pipeline(Ok(trades_table())).await;

    let packed = ctx.execution.packed_bytes.as_ref().unwrap();
    let expected = lkp_pack::sha256_hex(packed);

    let uploads = provider.uploads.lock().unwrap();
    let control_text = String::from_utf8(uploads[1].2.clone()).unwrap();
    let data_line = control_text.lines().nth(1).unwrap();
    let fields: Vec<&str> = data_line.split(',').collect();
    assert_eq!(fields[0], "3", "record count");
    assert_eq!(fields[2], expected, "checksum field is sha256 of packed bytes");
    assert_eq!(fields[5], "sqlserver");
}

#[tokio::test]
async fn extraction_failure_aborts_all_downstream_stages() {
    let (ctx, provider) = run_pipeline(Err(SourceError::Extraction(
        "ORA-12541: no listener".into(),
    )))
    .await;

    assert_eq!(ctx.execution.state, ExecutionState::Failed);
    let first = &ctx.execution.errors[0];
    assert_eq!(first.stage, "Extraction");
    assert_eq!(first.severity, Severity::Critical);
    assert!(first.cause.as_deref().unwrap().contains("ORA-12541"));

    assert!(ctx.execution.extracted_table.is_none());
    assert!(ctx.execution.packed_bytes.is_none());
    assert!(ctx.execution.control_bytes.is_none());
    assert!(ctx.execution.published_uri.is_none());
    assert!(provider.uploads.lock().unwrap().is_empty(), "publish never ran");
}

#[tokio::test]
async fn empty_extraction_still_publishes_a_valid_empty_artifact() {
    let empty = TabularData::with_schema(vec![
        ColumnDef::new("TradeId", LogicalType::Int64, false),
        ColumnDef::new("Symbol", LogicalType::String, true),
    ]);
    let (ctx, provider) = run_pipeline(Ok(empty)).await;

    assert_eq!(ctx.execution.state, ExecutionState::Succeeded);
    assert!(ctx.execution.packed_bytes.as_ref().is_some_and(|b| !b.is_empty()));

    let uploads = provider.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    let control_text = String::from_utf8(uploads[1].2.clone()).unwrap();
    let data_line = control_text.lines().nth(1).unwrap();
    assert!(data_line.starts_with("0,"), "record count is zero: {data_line}");
}

#[tokio::test]
async fn publish_failure_is_error_not_critical() {
    struct FailingProvider;

    #[async_trait]
    impl UploadProvider for FailingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Fs
        }

        async fn upload(
            &self,
            _destination_path: &str,
            _file_name: &str,
            _data: &[u8],
            _cancel: &CancelToken,
        ) -> Result<UploadReceipt, UploadError> {
            Err(UploadError::Io("disk full".into()))
        }
    }

    let stages = standard_stages(
        Arc::new(CannedSource {
            result: Ok(trades_table()),
        }),
        Arc::new(TransformEngine::new(
            Arc::new(StepRegistry::with_builtins()),
            "Production",
        )),
        Arc::new(FailingProvider),
    );
    let pipeline = Pipeline::new(stages);
    let mut ctx = ExecutionContext::new(JobExecution::new("tr1", Utc::now()), StageInputs::empty());

    pipeline.run(&mut ctx).await;

    assert_eq!(ctx.execution.state, ExecutionState::Failed);
    let publish_error = ctx.execution.errors.iter().find(|e| e.stage == "Publish").unwrap();
    assert_eq!(publish_error.severity, Severity::Error);
    // Upstream outputs survive; only delivery failed.
    assert!(ctx.execution.packed_bytes.is_some());
    assert!(ctx.execution.control_bytes.is_some());
    assert!(ctx.execution.published_uri.is_none());
}
