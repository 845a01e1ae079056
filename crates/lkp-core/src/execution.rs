// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job execution record and state machine.
//!
//! One [`JobExecution`] is created per trigger fire, owned exclusively by
//! the worker that runs it, and observed once by the scheduler after it
//! reaches a terminal state.

use crate::cancel::CancelToken;
use crate::table::TabularData;
use chrono::{DateTime, Utc};
use lkp_error::{Severity, StageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where an execution currently is in the five-stage chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Stage 1: pulling rows from the source.
    Extracting,
    /// Stage 2: applying transformation steps.
    Transforming,
    /// Stage 3: columnar serialization.
    Packing,
    /// Stage 4: control-record generation.
    GeneratingControl,
    /// Stage 5: artifact delivery.
    Publishing,
    /// Terminal: every stage succeeded.
    Succeeded,
    /// Terminal: a stage failed.
    Failed,
    /// Terminal: a critical error short-circuited later stages.
    Aborted,
}

impl ExecutionState {
    /// Whether the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Extracting => "extracting",
            Self::Transforming => "transforming",
            Self::Packing => "packing",
            Self::GeneratingControl => "generating_control",
            Self::Publishing => "publishing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One concrete run of a dataset's pipeline.
///
/// Stage outputs are append-only: a stage only observes state written by
/// strictly earlier stages and never mutates their outputs.
#[derive(Debug)]
pub struct JobExecution {
    /// `{dataset_id}.{yyyyMMddHHmmss}-{8-hex}`; stable for this run.
    pub execution_id: String,
    /// The dataset this run belongs to.
    pub dataset_id: String,
    /// UTC instant the trigger fired.
    pub start_time: DateTime<Utc>,
    /// Cancellation signal propagated into every I/O of this run.
    pub cancel: CancelToken,
    /// Untyped inputs carried between stages (resolved connection string,
    /// query text, rendered file name, …).
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Current pipeline state.
    pub state: ExecutionState,
    /// Output of the extract stage.
    pub extracted_table: Option<TabularData>,
    /// Output of the pack stage.
    pub packed_bytes: Option<Vec<u8>>,
    /// Output of the control-generation stage.
    pub control_bytes: Option<Vec<u8>>,
    /// `{dataset_name}.ctl`, set by the control-generation stage.
    pub control_file_name: Option<String>,
    /// URI of the published artifact, set by the publish stage.
    pub published_uri: Option<String>,
    /// Errors recorded by stages, in occurrence order.
    pub errors: Vec<StageError>,
}

impl JobExecution {
    /// Create a fresh execution for `dataset_id` fired at `start_time`.
    #[must_use]
    pub fn new(dataset_id: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            execution_id: crate::naming::new_execution_id(dataset_id, start_time),
            dataset_id: dataset_id.to_string(),
            start_time,
            cancel: CancelToken::new(),
            metadata: BTreeMap::new(),
            state: ExecutionState::Extracting,
            extracted_table: None,
            packed_bytes: None,
            control_bytes: None,
            control_file_name: None,
            published_uri: None,
            errors: Vec::new(),
        }
    }

    /// Record a stage error.
    pub fn record_error(&mut self, error: StageError) {
        self.errors.push(error);
    }

    /// Whether any recorded error is [`Severity::Critical`].
    #[must_use]
    pub fn has_critical_error(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Critical)
    }

    /// Whether any recorded error is at least [`Severity::Error`].
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.errors.iter().any(|e| e.severity >= Severity::Error)
    }

    /// Seconds elapsed since the trigger fired.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
