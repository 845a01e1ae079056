// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job building and execution.
//!
//! The runner owns everything that happens at fire time: the at-most-one
//! guard, secret resolution, SQL file loading, transformation planning,
//! artifact naming, the pipeline run, and the single structured completion
//! log line every execution ends with.

use chrono::Utc;
use lkp_core::{
    CancelToken, DatasetSpec, ExecutionState, ExtractionKind, JobExecution, SourceKind, naming,
};
use lkp_error::{ErrorKind, Severity, StageError};
use lkp_pack::PackOptions;
use lkp_pipeline::{ExecutionContext, Pipeline, StageInputs, standard_stages};
use lkp_source::{DataSource, SourceFactory};
use lkp_transform::TransformEngine;
use lkp_upload::ProviderFactory;
use lkp_vault::{TemplateResolver, VaultError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Resolves a driver for a source kind; injectable for tests.
pub trait SourceResolver: Send + Sync {
    /// The driver serving `kind`.
    fn resolve(&self, kind: SourceKind) -> Arc<dyn DataSource>;
}

/// Production resolver backed by the real drivers.
pub struct DriverSourceResolver;

impl SourceResolver for DriverSourceResolver {
    fn resolve(&self, kind: SourceKind) -> Arc<dyn DataSource> {
        SourceFactory::create(kind)
    }
}

/// Everything the runner needs to build and execute jobs.
pub struct JobDeps {
    /// Connection templates keyed by `connectionKey`.
    pub connections: BTreeMap<String, String>,
    /// Secret resolver; absent when no secret store is configured.
    pub resolver: Option<Arc<TemplateResolver>>,
    /// Transformation engine carrying the environment tag.
    pub transform_engine: Arc<TransformEngine>,
    /// Upload provider factory.
    pub providers: Arc<ProviderFactory>,
    /// Driver lookup.
    pub sources: Arc<dyn SourceResolver>,
    /// Base directory for relative `sqlFile` paths.
    pub sql_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// What happened to one trigger fire.
#[derive(Debug)]
pub enum FireOutcome {
    /// The job ran (successfully or not); details in the summary.
    Completed(JobSummary),
    /// Another execution of the same dataset was still active.
    Skipped,
}

/// Terminal snapshot of one execution, for logging and tests.
#[derive(Debug, Clone)]
pub struct JobSummary {
    /// The execution's id.
    pub execution_id: String,
    /// Owning dataset.
    pub dataset_id: String,
    /// Terminal state.
    pub state: ExecutionState,
    /// Number of recorded errors.
    pub error_count: usize,
    /// Canonical URI of the published artifact, on success.
    pub published_uri: Option<String>,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
}

struct BuildError {
    kind: ErrorKind,
    message: String,
}

impl BuildError {
    fn config(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Config,
            message: message.into(),
        }
    }
}

impl From<VaultError> for BuildError {
    fn from(err: VaultError) -> Self {
        let kind = match &err {
            VaultError::Auth { .. } => ErrorKind::Auth,
            VaultError::NotFound { .. } => ErrorKind::NotFound,
            VaultError::Cancelled => ErrorKind::Cancelled,
            VaultError::Config(_) => ErrorKind::Config,
            VaultError::Transport { .. } => ErrorKind::Transport,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Builds and runs one job per trigger fire.
pub struct JobRunner {
    deps: Arc<JobDeps>,
}

impl JobRunner {
    /// A runner over `deps`.
    #[must_use]
    pub fn new(deps: Arc<JobDeps>) -> Self {
        Self { deps }
    }

    /// Fire `spec` now.
    ///
    /// `guard` is the dataset's exclusivity mutex: when a previous execution
    /// still holds it, this fire is skipped with a log — no queueing.
    /// `shutdown` cancels the execution mid-flight on service stop.
    pub async fn fire(
        &self,
        spec: &DatasetSpec,
        guard: Arc<tokio::sync::Mutex<()>>,
        shutdown: &CancelToken,
    ) -> FireOutcome {
        let Ok(_permit) = guard.try_lock_owned() else {
            warn!(
                target: "lakeport.scheduler",
                dataset_id = %spec.id,
                "trigger fired while a previous execution is active; skipping"
            );
            return FireOutcome::Skipped;
        };

        let started = Utc::now();
        let mut execution = JobExecution::new(&spec.id, started);
        let execution_id = execution.execution_id.clone();

        // Propagate service shutdown into this execution's token.
        let watcher = {
            let job_cancel = execution.cancel.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                job_cancel.cancel();
            })
        };

        match self.build(spec, &execution).await {
            Ok((inputs, stages)) => {
                annotate_metadata(&mut execution, spec, &inputs);
                let mut ctx = ExecutionContext::new(execution, inputs);
                Pipeline::new(stages).run(&mut ctx).await;
                execution = ctx.execution;
            }
            Err(build_err) => {
                execution.record_error(StageError::new(
                    "Build",
                    build_err.kind,
                    Severity::Critical,
                    build_err.message,
                ));
                execution.state = ExecutionState::Failed;
            }
        }
        watcher.abort();

        let summary = JobSummary {
            execution_id,
            dataset_id: spec.id.clone(),
            state: execution.state,
            error_count: execution.errors.len(),
            published_uri: execution.published_uri.clone(),
            duration_secs: (Utc::now() - started).num_milliseconds() as f64 / 1000.0,
        };
        info!(
            target: "lakeport.scheduler",
            dataset_id = %summary.dataset_id,
            execution_id = %summary.execution_id,
            outcome = %summary.state,
            duration_secs = summary.duration_secs,
            error_count = summary.error_count,
            published_uri = summary.published_uri.as_deref().unwrap_or(""),
            "execution finished"
        );
        FireOutcome::Completed(summary)
    }

    #[allow(clippy::type_complexity)]
    async fn build(
        &self,
        spec: &DatasetSpec,
        execution: &JobExecution,
    ) -> Result<(StageInputs, Vec<Arc<dyn lkp_pipeline::PipelineStage>>), BuildError> {
        let template = self
            .deps
            .connections
            .get(&spec.source.connection_key)
            .ok_or_else(|| {
                BuildError::config(format!(
                    "no connection template named '{}'",
                    spec.source.connection_key
                ))
            })?;

        let connection_string = match &self.deps.resolver {
            Some(resolver) => resolver.resolve(template, &execution.cancel).await?,
            None if template.contains("{vault:") => {
                return Err(BuildError::config(
                    "connection template references the secret store, but none is configured",
                ));
            }
            None => template.clone(),
        };

        let query = match spec.source.extraction_kind {
            ExtractionKind::Procedure | ExtractionKind::Package => {
                spec.source.statement().ok_or_else(|| {
                    BuildError::config("extraction kind requires a procedure reference")
                })?
            }
            ExtractionKind::Query => {
                let raw = spec.source.sql_file.as_deref().ok_or_else(|| {
                    BuildError::config("query extraction requires source.sqlFile")
                })?;
                let path = if std::path::Path::new(raw).is_absolute() {
                    PathBuf::from(raw)
                } else {
                    self.deps.sql_dir.join(raw)
                };
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    BuildError::config(format!("reading {}: {e}", path.display()))
                })?
            }
        };

        let steps = self
            .deps
            .transform_engine
            .plan(&spec.transformations)
            .map_err(|e| BuildError {
                kind: ErrorKind::Config,
                message: e.to_string(),
            })?;

        let provider = self
            .deps
            .providers
            .create(spec.destination.provider)
            .map_err(|e| BuildError {
                kind: ErrorKind::Config,
                message: e.to_string(),
            })?;

        let inputs = StageInputs {
            source_kind: spec.source.kind,
            connection_string,
            query,
            parameters: spec.source.parameters.clone(),
            command_timeout: spec.source.command_timeout(),
            steps,
            pack_options: PackOptions {
                compression: spec.output.compression,
                row_group_size: spec.output.row_group_size,
            },
            destination_path: spec.destination.path.clone(),
            file_name: naming::render_file_name(&spec.output.file_name_pattern, execution.start_time),
            keep_local_copy: spec.keep_local_copy,
            local_copy_path: spec.local_copy_path.clone().map(PathBuf::from),
        };

        let source = self.deps.sources.resolve(spec.source.kind);
        let stages = standard_stages(source, Arc::clone(&self.deps.transform_engine), provider);
        Ok((inputs, stages))
    }
}

/// Mirror the non-secret derived inputs into the execution's metadata bag
/// for traceability. The resolved connection string stays out on purpose.
fn annotate_metadata(execution: &mut JobExecution, spec: &DatasetSpec, inputs: &StageInputs) {
    let metadata = &mut execution.metadata;
    metadata.insert("sourceKind".into(), inputs.source_kind.to_string().into());
    metadata.insert("connectionKey".into(), spec.source.connection_key.clone().into());
    metadata.insert("query".into(), inputs.query.clone().into());
    metadata.insert("fileName".into(), inputs.file_name.clone().into());
    metadata.insert(
        "destination".into(),
        format!("{}:{}", spec.destination.provider, spec.destination.path).into(),
    );
}
