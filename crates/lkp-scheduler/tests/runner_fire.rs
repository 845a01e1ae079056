// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fire-time behavior: exclusivity, build failures, artifact delivery.

use async_trait::async_trait;
use lkp_core::{
    CancelToken, ColumnDef, DatasetSpec, DestinationSpec, ExecutionState, LogicalType, OutputSpec,
    ProviderKind, SourceKind, SourceSpec, TabularData, Value,
};
use lkp_scheduler::{FireOutcome, JobDeps, JobRunner, SourceResolver};
use lkp_source::{DataSource, ExtractRequest, SourceError};
use lkp_transform::{StepRegistry, TransformEngine};
use lkp_upload::ProviderFactory;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test doubles and wiring
// ---------------------------------------------------------------------------

/// Mock driver that optionally stalls before returning one row.
struct StallSource {
    delay: Duration,
}

#[async_trait]
impl DataSource for StallSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SqlServer
    }

    async fn extract(
        &self,
        _request: &ExtractRequest,
        cancel: &CancelToken,
    ) -> Result<TabularData, SourceError> {
        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(SourceError::Cancelled),
                () = tokio::time::sleep(self.delay) => {}
            }
        }
        let mut table = TabularData::with_schema(vec![ColumnDef::new(
            "N",
            LogicalType::Int32,
            false,
        )]);
        table.push_row(vec![Value::Int32(42)]);
        Ok(table)
    }
}

struct StallResolver {
    delay: Duration,
}

impl SourceResolver for StallResolver {
    fn resolve(&self, _kind: SourceKind) -> Arc<dyn DataSource> {
        Arc::new(StallSource { delay: self.delay })
    }
}

fn deps(out_dir: &std::path::Path, source_delay: Duration) -> Arc<JobDeps> {
    let mut connections = BTreeMap::new();
    connections.insert(
        "trades".to_string(),
        "Server=db;User=svc;Password=plain".to_string(),
    );
    Arc::new(JobDeps {
        connections,
        resolver: None,
        transform_engine: Arc::new(TransformEngine::new(
            Arc::new(StepRegistry::with_builtins()),
            "Production",
        )),
        providers: Arc::new(ProviderFactory::new(out_dir, None)),
        sources: Arc::new(StallResolver {
            delay: source_delay,
        }),
        sql_dir: out_dir.to_path_buf(),
    })
}

fn dataset(id: &str) -> DatasetSpec {
    DatasetSpec {
        id: id.to_string(),
        enabled: true,
        cron: "0/5 * * * * ?".to_string(),
        source: SourceSpec {
            kind: SourceKind::SqlServer,
            connection_key: "trades".to_string(),
            extraction_kind: lkp_core::ExtractionKind::Procedure,
            procedure: Some("dbo.sp_GetDailyTrades".to_string()),
            package: None,
            sql_file: None,
            parameters: indexmap::IndexMap::new(),
            command_timeout_sec: Some(30),
        },
        transformations: Vec::new(),
        output: OutputSpec {
            file_name_pattern: "tr_{date:yyyyMMdd}.parquet".to_string(),
            compression: lkp_core::CompressionCodec::Snappy,
            row_group_size: None,
        },
        destination: DestinationSpec {
            provider: ProviderKind::Fs,
            path: "out".to_string(),
        },
        keep_local_copy: false,
        local_copy_path: None,
    }
}

fn summary(outcome: FireOutcome) -> lkp_scheduler::JobSummary {
    match outcome {
        FireOutcome::Completed(summary) => summary,
        FireOutcome::Skipped => panic!("expected a completed execution"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fire_runs_the_pipeline_and_delivers_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let runner = JobRunner::new(deps(dir.path(), Duration::ZERO));
    let guard = Arc::new(tokio::sync::Mutex::new(()));

    let outcome = runner
        .fire(&dataset("tr1"), guard, &CancelToken::new())
        .await;
    let summary = summary(outcome);
    assert_eq!(summary.state, ExecutionState::Succeeded);
    assert_eq!(summary.error_count, 0);
    assert!(summary.execution_id.starts_with("tr1."));

    let delivered: Vec<String> = std::fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(delivered.len(), 2, "{delivered:?}");
    assert!(delivered.iter().any(|f| f.starts_with("tr_") && f.ends_with(".parquet")));
    assert!(delivered.iter().any(|f| f.starts_with("tr1_") && f.ends_with(".ctl")));
}

#[tokio::test]
async fn second_fire_while_active_is_skipped_not_queued() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(JobRunner::new(deps(dir.path(), Duration::from_secs(2))));
    let guard = Arc::new(tokio::sync::Mutex::new(()));
    let shutdown = CancelToken::new();

    let first = {
        let runner = Arc::clone(&runner);
        let guard = Arc::clone(&guard);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { runner.fire(&dataset("tr1"), guard, &shutdown).await })
    };
    // Let the first fire take the guard and stall in extraction.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = runner.fire(&dataset("tr1"), guard, &shutdown).await;
    assert!(matches!(second, FireOutcome::Skipped));

    let first = first.await.unwrap();
    assert_eq!(summary(first).state, ExecutionState::Succeeded);
}

#[tokio::test]
async fn missing_connection_template_fails_only_that_execution() {
    let dir = tempfile::tempdir().unwrap();
    let runner = JobRunner::new(deps(dir.path(), Duration::ZERO));
    let mut spec = dataset("tr1");
    spec.source.connection_key = "absent".to_string();

    let outcome = runner
        .fire(&spec, Arc::new(tokio::sync::Mutex::new(())), &CancelToken::new())
        .await;
    let summary = summary(outcome);
    assert_eq!(summary.state, ExecutionState::Failed);
    assert_eq!(summary.error_count, 1);
    assert!(summary.published_uri.is_none());
}

#[tokio::test]
async fn unknown_step_type_fails_before_the_job_runs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = JobRunner::new(deps(dir.path(), Duration::ZERO));
    let mut spec = dataset("tr1");
    spec.transformations.push(lkp_core::TransformationSpec {
        step_type: "Mystery".to_string(),
        enabled: true,
        order: 1,
        environments: std::collections::BTreeSet::new(),
        config: serde_json::Map::new(),
    });

    let outcome = runner
        .fire(&spec, Arc::new(tokio::sync::Mutex::new(())), &CancelToken::new())
        .await;
    let summary = summary(outcome);
    assert_eq!(summary.state, ExecutionState::Failed);
    // Nothing was extracted or delivered.
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn service_shutdown_cancels_an_active_execution() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(JobRunner::new(deps(dir.path(), Duration::from_secs(30))));
    let shutdown = CancelToken::new();

    let fire = {
        let runner = Arc::clone(&runner);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            runner
                .fire(&dataset("tr1"), Arc::new(tokio::sync::Mutex::new(())), &shutdown)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), fire)
        .await
        .expect("execution unwinds promptly on shutdown")
        .unwrap();
    let summary = summary(outcome);
    assert_eq!(summary.state, ExecutionState::Failed);
    assert!(summary.error_count >= 1);
}
