// SPDX-License-Identifier: MIT OR Apache-2.0
//! Driver error type.

use std::time::Duration;

/// Failures surfaced by extraction drivers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The driver failed; the underlying driver message is preserved.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The statement exceeded its command timeout.
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    /// The extraction was cancelled.
    #[error("extraction cancelled")]
    Cancelled,

    /// The request cannot be executed as configured.
    #[error("unsupported source configuration: {0}")]
    Config(String),
}
