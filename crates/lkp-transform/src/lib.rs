// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transformation step registry and engine.
//!
//! Step types register under a name derived from their type name minus the
//! trailing `Step` token (`DataCleansingStep` → `DataCleansing`). The
//! registry is seeded once at startup and immutable afterwards; additional
//! step libraries contribute by calling [`StepRegistry::register_type`]
//! during seeding. Unknown step names fail at job build time, before the
//! job runs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Built-in transformation steps.
pub mod steps;

use async_trait::async_trait;
use lkp_core::{CancelToken, TabularData, TransformationSpec};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use steps::{DataCleansingStep, DataValidationStep};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by step construction and application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// A dataset references a step type nobody registered.
    #[error("unknown transformation step type: {0}")]
    UnknownStep(String),

    /// The step's configuration block does not parse.
    #[error("invalid configuration for step '{step}': {reason}")]
    BadConfig {
        /// Step type name.
        step: String,
        /// Parse failure detail.
        reason: String,
    },

    /// A validation step rejected the table.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A step failed while rewriting the table.
    #[error("step '{step}' failed: {reason}")]
    Failed {
        /// Step display name.
        step: String,
        /// Failure detail.
        reason: String,
    },

    /// The engine was cancelled between steps.
    #[error("transformation cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Step contract
// ---------------------------------------------------------------------------

/// One transformation applied to the extracted table.
///
/// Steps receive the engine's working copy by value and return the rewritten
/// table. A step must preserve the row count unless its documented behavior
/// says otherwise (`DataCleansing` with `removeEmptyStrings` nulls cells,
/// it never drops rows). Long inner loops are expected to poll the
/// cancellation token.
#[async_trait]
pub trait TransformStep: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Environment tags this instance runs in; empty means all.
    fn environments(&self) -> &BTreeSet<String>;

    /// Rewrite the table.
    async fn apply(
        &self,
        table: TabularData,
        cancel: &CancelToken,
    ) -> Result<TabularData, TransformError>;
}

/// Builds a step instance from its dataset-spec block.
pub type StepBuilder = fn(&TransformationSpec) -> Result<Arc<dyn TransformStep>, TransformError>;

/// Registration name for a step type: the type name minus a trailing
/// `Step` token.
#[must_use]
pub fn registration_name(type_name: &str) -> &str {
    type_name.strip_suffix("Step").unwrap_or(type_name)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps step type names to constructors.
///
/// Immutable after seeding; share it behind an `Arc` for lock-free reads.
#[derive(Default)]
pub struct StepRegistry {
    builders: HashMap<String, StepBuilder>,
}

impl StepRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the built-in steps.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_type(steps::DataCleansingStep::TYPE_NAME, steps::DataCleansingStep::build);
        registry.register_type(steps::DataValidationStep::TYPE_NAME, steps::DataValidationStep::build);
        registry
    }

    /// Register `builder` under the name derived from `type_name`.
    ///
    /// Duplicates are skipped — first registration wins.
    pub fn register_type(&mut self, type_name: &str, builder: StepBuilder) {
        let name = registration_name(type_name);
        if self.builders.contains_key(name) {
            warn!(
                target: "lakeport.transform",
                step = name,
                "duplicate step registration skipped; first registration wins"
            );
            return;
        }
        self.builders.insert(name.to_string(), builder);
    }

    /// Registered step names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the step instance for `spec`.
    pub fn build(&self, spec: &TransformationSpec) -> Result<Arc<dyn TransformStep>, TransformError> {
        let builder = self
            .builders
            .get(spec.step_type.as_str())
            .ok_or_else(|| TransformError::UnknownStep(spec.step_type.clone()))?;
        builder(spec)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies a dataset's transformation chain.
pub struct TransformEngine {
    registry: Arc<StepRegistry>,
    environment: String,
}

impl TransformEngine {
    /// An engine resolving steps from `registry`, gated on `environment`.
    pub fn new(registry: Arc<StepRegistry>, environment: impl Into<String>) -> Self {
        Self {
            registry,
            environment: environment.into(),
        }
    }

    /// The environment tag executions run under.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Resolve the enabled steps of `specs` in application order.
    ///
    /// Fails on the first unknown step type so misconfigured datasets die
    /// at build time rather than mid-run. Ties in `order` keep declaration
    /// order.
    pub fn plan(
        &self,
        specs: &[TransformationSpec],
    ) -> Result<Vec<Arc<dyn TransformStep>>, TransformError> {
        let mut enabled: Vec<&TransformationSpec> =
            specs.iter().filter(|s| s.enabled).collect();
        enabled.sort_by_key(|s| s.order);
        enabled
            .into_iter()
            .map(|spec| self.registry.build(spec))
            .collect()
    }

    /// Run `steps` over a deep copy of `table`.
    pub async fn apply(
        &self,
        table: &TabularData,
        steps: &[Arc<dyn TransformStep>],
        cancel: &CancelToken,
    ) -> Result<TabularData, TransformError> {
        let mut working = table.clone();
        for step in steps {
            if cancel.is_cancelled() {
                return Err(TransformError::Cancelled);
            }
            let environments = step.environments();
            if !environments.is_empty() && !environments.contains(&self.environment) {
                info!(
                    target: "lakeport.transform",
                    step = step.name(),
                    environment = %self.environment,
                    "step skipped: not enabled for this environment"
                );
                continue;
            }
            debug!(target: "lakeport.transform", step = step.name(), rows = working.row_count(), "applying step");
            working = step.apply(working, cancel).await?;
        }
        Ok(working)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
