// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in transformation steps.

use crate::{TransformError, TransformStep};
use async_trait::async_trait;
use lkp_core::{CancelToken, LogicalType, TabularData, TransformationSpec, Value};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// How often row loops poll the cancellation token.
const CANCEL_POLL_EVERY: usize = 1024;

fn parse_config<T: serde::de::DeserializeOwned + Default>(
    spec: &TransformationSpec,
) -> Result<T, TransformError> {
    if spec.config.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_value(serde_json::Value::Object(spec.config.clone())).map_err(|e| {
        TransformError::BadConfig {
            step: spec.step_type.clone(),
            reason: e.to_string(),
        }
    })
}

// ---------------------------------------------------------------------------
// DataCleansing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CleansingConfig {
    trim_whitespace: bool,
    remove_empty_strings: bool,
}

impl Default for CleansingConfig {
    fn default() -> Self {
        Self {
            trim_whitespace: true,
            remove_empty_strings: false,
        }
    }
}

/// Normalises string columns: trims ASCII whitespace and optionally nulls
/// out strings that are empty after trimming. Non-string columns pass
/// through untouched, and the row count never changes.
pub struct DataCleansingStep {
    config: CleansingConfig,
    environments: BTreeSet<String>,
}

impl DataCleansingStep {
    /// Type name this step registers under (minus the `Step` suffix).
    pub const TYPE_NAME: &'static str = "DataCleansingStep";

    /// Builder wired into the step registry.
    pub fn build(spec: &TransformationSpec) -> Result<Arc<dyn TransformStep>, TransformError> {
        Ok(Arc::new(Self {
            config: parse_config(spec)?,
            environments: spec.environments.clone(),
        }))
    }
}

#[async_trait]
impl TransformStep for DataCleansingStep {
    fn name(&self) -> &str {
        "DataCleansing"
    }

    fn environments(&self) -> &BTreeSet<String> {
        &self.environments
    }

    async fn apply(
        &self,
        mut table: TabularData,
        cancel: &CancelToken,
    ) -> Result<TabularData, TransformError> {
        let string_columns: Vec<usize> = table
            .schema
            .iter()
            .enumerate()
            .filter(|(_, c)| c.logical_type == LogicalType::String)
            .map(|(idx, _)| idx)
            .collect();
        if string_columns.is_empty() || (!self.config.trim_whitespace && !self.config.remove_empty_strings) {
            return Ok(table);
        }

        let mut trimmed = 0usize;
        let mut nulled = 0usize;
        for (row_idx, row) in table.rows.iter_mut().enumerate() {
            if row_idx % CANCEL_POLL_EVERY == 0 {
                cancel
                    .bail_if_cancelled()
                    .map_err(|_| TransformError::Cancelled)?;
            }
            for &col in &string_columns {
                let Value::String(text) = &row[col] else {
                    continue;
                };
                let cleaned = if self.config.trim_whitespace {
                    text.trim_matches(|c: char| c.is_ascii_whitespace())
                } else {
                    text.as_str()
                };
                if self.config.remove_empty_strings && cleaned.is_empty() {
                    row[col] = Value::Null;
                    nulled += 1;
                } else if cleaned.len() != text.len() {
                    row[col] = Value::String(cleaned.to_string());
                    trimmed += 1;
                }
            }
        }
        debug!(target: "lakeport.transform", trimmed, nulled, "cleansing pass finished");
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// DataValidation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ValidationConfig {
    required_columns: Vec<String>,
    validate_email: bool,
}

/// Checks structural expectations against the extracted schema.
///
/// Missing required columns (case-sensitive) fail the table. Email
/// validation is accepted in configuration but currently advisory: it
/// never rejects or drops rows.
pub struct DataValidationStep {
    config: ValidationConfig,
    environments: BTreeSet<String>,
}

impl DataValidationStep {
    /// Type name this step registers under (minus the `Step` suffix).
    pub const TYPE_NAME: &'static str = "DataValidationStep";

    /// Builder wired into the step registry.
    pub fn build(spec: &TransformationSpec) -> Result<Arc<dyn TransformStep>, TransformError> {
        Ok(Arc::new(Self {
            config: parse_config(spec)?,
            environments: spec.environments.clone(),
        }))
    }
}

#[async_trait]
impl TransformStep for DataValidationStep {
    fn name(&self) -> &str {
        "DataValidation"
    }

    fn environments(&self) -> &BTreeSet<String> {
        &self.environments
    }

    async fn apply(
        &self,
        table: TabularData,
        _cancel: &CancelToken,
    ) -> Result<TabularData, TransformError> {
        let missing: Vec<&str> = self
            .config
            .required_columns
            .iter()
            .filter(|required| table.column_index(required).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(TransformError::Validation(format!(
                "required columns absent from the extracted schema: {}",
                missing.join(", ")
            )));
        }
        if self.config.validate_email {
            debug!(
                target: "lakeport.transform",
                "validateEmail is advisory; no rows were checked or dropped"
            );
        }
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
