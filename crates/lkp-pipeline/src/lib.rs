// SPDX-License-Identifier: MIT OR Apache-2.0
//! Five-stage ingestion pipeline engine.
//!
//! A [`Pipeline`] chains the Extract → Transform → Pack → ControlGeneration
//! → Publish stages over one [`ExecutionContext`]. Stages run in order; a
//! `Critical` error stops the chain, and every `execute` call sits behind a
//! panic boundary so a misbehaving stage is recorded rather than unwinding
//! into the scheduler.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Execution context and typed stage inputs.
pub mod context;
/// The five built-in stages.
pub mod stages;

use async_trait::async_trait;
use futures::FutureExt;
use lkp_core::ExecutionState;
use lkp_error::{ErrorKind, Severity, StageError};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use context::{ExecutionContext, StageInputs};
pub use stages::{
    ControlGenerationStage, ExtractStage, PackStage, PublishStage, TransformStage, standard_stages,
};

// ---------------------------------------------------------------------------
// Stage contract
// ---------------------------------------------------------------------------

/// Outcome of one stage execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Whether the stage did what it set out to do.
    pub success: bool,
    /// Human-readable outcome note.
    pub message: Option<String>,
    /// Whether the engine should invoke the next stage.
    pub should_continue: bool,
    /// Stage metrics (row counts, elapsed milliseconds, byte sizes) for
    /// structured logging.
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl StageResult {
    /// A successful result that continues the chain.
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
            should_continue: true,
            metrics: BTreeMap::new(),
        }
    }

    /// A failed result that stops the chain.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            should_continue: false,
            metrics: BTreeMap::new(),
        }
    }

    /// Attach a metric.
    #[must_use]
    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    /// Attach an outcome note.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One link of the pipeline chain.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name recorded on errors (e.g. `"Extraction"`).
    fn name(&self) -> &'static str;

    /// Execution state the job enters while this stage runs.
    fn state(&self) -> ExecutionState;

    /// Run the stage against the shared context.
    async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// An ordered chain of [`PipelineStage`]s executed sequentially.
pub struct Pipeline {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl Pipeline {
    /// A pipeline over an explicit stage list.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// Run the chain to completion and settle the execution's terminal
    /// state. This never returns an error: failures live on the execution.
    pub async fn run(&self, ctx: &mut ExecutionContext) {
        for stage in &self.stages {
            // A stage that asked to continue despite recording a critical
            // error does not get its wish.
            if ctx.execution.has_critical_error() {
                warn!(
                    target: "lakeport.pipeline",
                    execution_id = %ctx.execution.execution_id,
                    stage = stage.name(),
                    "aborting before stage: a critical error is already recorded"
                );
                ctx.execution.state = ExecutionState::Aborted;
                return;
            }

            ctx.execution.state = stage.state();
            let outcome = AssertUnwindSafe(stage.execute(ctx)).catch_unwind().await;

            match outcome {
                Ok(result) => {
                    info!(
                        target: "lakeport.pipeline",
                        execution_id = %ctx.execution.execution_id,
                        stage = stage.name(),
                        success = result.success,
                        metrics = %serde_json::Value::Object(
                            result.metrics.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                        ),
                        "stage finished"
                    );
                    if !result.should_continue {
                        break;
                    }
                }
                Err(panic) => {
                    let reason = panic_message(&panic);
                    error!(
                        target: "lakeport.pipeline",
                        execution_id = %ctx.execution.execution_id,
                        stage = stage.name(),
                        reason,
                        "stage panicked"
                    );
                    ctx.execution.record_error(
                        StageError::new(
                            stage.name(),
                            ErrorKind::Internal,
                            Severity::Critical,
                            format!("stage panicked: {reason}"),
                        ),
                    );
                    break;
                }
            }
        }

        ctx.execution.state = if ctx.execution.has_failure() {
            ExecutionState::Failed
        } else {
            ExecutionState::Succeeded
        };
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lkp_core::JobExecution;

    struct NoopStage;

    #[async_trait]
    impl PipelineStage for NoopStage {
        fn name(&self) -> &'static str {
            "Noop"
        }

        fn state(&self) -> ExecutionState {
            ExecutionState::Extracting
        }

        async fn execute(&self, _ctx: &mut ExecutionContext) -> StageResult {
            StageResult::success()
        }
    }

    struct PanicStage;

    #[async_trait]
    impl PipelineStage for PanicStage {
        fn name(&self) -> &'static str {
            "Panicky"
        }

        fn state(&self) -> ExecutionState {
            ExecutionState::Transforming
        }

        async fn execute(&self, _ctx: &mut ExecutionContext) -> StageResult {
            panic!("stage exploded");
        }
    }

    /// Records a critical error but claims the chain should continue.
    struct LyingStage;

    #[async_trait]
    impl PipelineStage for LyingStage {
        fn name(&self) -> &'static str {
            "Lying"
        }

        fn state(&self) -> ExecutionState {
            ExecutionState::Extracting
        }

        async fn execute(&self, ctx: &mut ExecutionContext) -> StageResult {
            ctx.execution.record_error(StageError::new(
                "Lying",
                ErrorKind::Internal,
                Severity::Critical,
                "bad data",
            ));
            StageResult::success()
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::bare(JobExecution::new("t", Utc::now()))
    }

    #[tokio::test]
    async fn clean_chain_succeeds() {
        let pipeline = Pipeline::new(vec![Arc::new(NoopStage), Arc::new(NoopStage)]);
        let mut ctx = ctx();
        pipeline.run(&mut ctx).await;
        assert_eq!(ctx.execution.state, ExecutionState::Succeeded);
        assert!(ctx.execution.errors.is_empty());
    }

    #[tokio::test]
    async fn panic_is_recorded_as_critical_and_stops_the_chain() {
        let pipeline = Pipeline::new(vec![Arc::new(PanicStage), Arc::new(NoopStage)]);
        let mut ctx = ctx();
        pipeline.run(&mut ctx).await;
        assert_eq!(ctx.execution.state, ExecutionState::Failed);
        assert_eq!(ctx.execution.errors.len(), 1);
        let err = &ctx.execution.errors[0];
        assert_eq!(err.stage, "Panicky");
        assert_eq!(err.severity, Severity::Critical);
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("stage exploded"));
    }

    #[tokio::test]
    async fn critical_error_with_continue_request_aborts_before_next_stage() {
        let pipeline = Pipeline::new(vec![Arc::new(LyingStage), Arc::new(PanicStage)]);
        let mut ctx = ctx();
        pipeline.run(&mut ctx).await;
        // The panic stage never ran; the engine aborted first.
        assert_eq!(ctx.execution.state, ExecutionState::Aborted);
        assert_eq!(ctx.execution.errors.len(), 1);
    }
}
