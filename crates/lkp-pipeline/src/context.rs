// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution context and typed stage inputs.
//!
//! The untyped metadata bag on [`lkp_core::JobExecution`] stays for
//! traceability, but stages read their inputs from the typed
//! [`StageInputs`] built once at job-build time. That keeps the pipeline
//! polymorphic without turning every stage into a string-map parser.

use indexmap::IndexMap;
use lkp_core::{JobExecution, ParamValue, SourceKind};
use lkp_pack::PackOptions;
use lkp_transform::TransformStep;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolved inputs for one execution, assembled by the job builder before
/// the first stage runs.
#[derive(Clone)]
pub struct StageInputs {
    /// Source database family; recorded in the control file.
    pub source_kind: SourceKind,
    /// Fully resolved connection string.
    pub connection_string: String,
    /// Procedure name, `package.procedure`, or raw statement text.
    pub query: String,
    /// Named parameters in declaration order.
    pub parameters: IndexMap<String, ParamValue>,
    /// Command timeout for the extraction.
    pub command_timeout: Duration,
    /// Planned transformation steps in application order.
    pub steps: Vec<Arc<dyn TransformStep>>,
    /// Columnar writer options from the output spec.
    pub pack_options: PackOptions,
    /// Destination path within the provider.
    pub destination_path: String,
    /// Rendered artifact file name.
    pub file_name: String,
    /// Also write artifacts to `local_copy_path`.
    pub keep_local_copy: bool,
    /// Directory for local copies.
    pub local_copy_path: Option<PathBuf>,
}

impl StageInputs {
    /// Inputs with everything empty; used by engine-level tests.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            source_kind: SourceKind::SqlServer,
            connection_string: String::new(),
            query: String::new(),
            parameters: IndexMap::new(),
            command_timeout: Duration::from_secs(300),
            steps: Vec::new(),
            pack_options: PackOptions::default(),
            destination_path: String::new(),
            file_name: String::new(),
            keep_local_copy: false,
            local_copy_path: None,
        }
    }
}

/// Shared state one pipeline run operates on.
pub struct ExecutionContext {
    /// The execution record owning outputs, errors, and the state machine.
    pub execution: JobExecution,
    /// Typed inputs resolved at job-build time.
    pub inputs: StageInputs,
}

impl ExecutionContext {
    /// A context over `execution` with `inputs`.
    #[must_use]
    pub fn new(execution: JobExecution, inputs: StageInputs) -> Self {
        Self { execution, inputs }
    }

    /// A context with empty inputs; used by engine-level tests.
    #[must_use]
    pub fn bare(execution: JobExecution) -> Self {
        Self::new(execution, StageInputs::empty())
    }
}
