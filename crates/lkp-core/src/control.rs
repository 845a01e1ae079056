// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control-record sidecar describing a packed artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The CSV sidecar consumers use to verify and register an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Number of rows in the packed artifact.
    pub record_count: u64,
    /// Business reference date of the extraction (UTC).
    pub ref_date: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the packed bytes.
    pub checksum: String,
    /// When the control record was generated (UTC).
    pub timestamp: DateTime<Utc>,
    /// `{dataset_id}_{yyyyMMddHHmmss}` for this execution.
    pub dataset_name: String,
    /// Source kind tag (e.g. `"sqlserver"`, `"oracle"`).
    pub source: String,
}

impl ControlRecord {
    /// File name of the control sidecar: `{dataset_name}.ctl`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.ctl", self.dataset_name)
    }
}
