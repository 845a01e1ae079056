// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error kinds for Lakeport.
//!
//! Every failure surfaced by the ingestion pipeline carries an [`ErrorKind`]
//! (a machine-readable, stable tag), a [`Severity`], and a human-readable
//! message. Failures that occur inside a pipeline stage are recorded on the
//! owning job execution as [`StageError`] values.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable, stable error kind.
///
/// Each variant serialises to a `snake_case` string that is guaranteed not
/// to change across patch releases; operators key alerting rules off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Host or dataset configuration is missing or malformed.
    Config,
    /// The secret store rejected our credentials.
    Auth,
    /// An HTTP or network-level failure talking to the secret store.
    Transport,
    /// A requested secret or resource does not exist (or is empty).
    NotFound,
    /// A database driver failed to produce a result set.
    Extraction,
    /// A validation transformation rejected the table.
    Validation,
    /// A transformation step failed.
    Transform,
    /// Columnar serialization failed.
    Pack,
    /// Control-record generation failed.
    Control,
    /// Artifact delivery failed.
    Upload,
    /// The operation was cancelled before it completed.
    Cancelled,
    /// Catch-all for unexpected internal errors (including stage panics).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::NotFound => "not_found",
            Self::Extraction => "extraction",
            Self::Validation => "validation",
            Self::Transform => "transform",
            Self::Pack => "pack",
            Self::Control => "control",
            Self::Upload => "upload",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How badly a recorded error compromises the execution.
///
/// Ordering is meaningful: `Warning < Error < Critical`. A `Critical` error
/// in one stage aborts every later stage; an `Error` marks the execution
/// failed without aborting in-stage cleanup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Advisory only; the execution may still succeed.
    Warning,
    /// The execution fails, but downstream stages were not poisoned.
    Error,
    /// The execution fails and all later stages are aborted.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// StageError
// ---------------------------------------------------------------------------

/// An error recorded against one pipeline stage of a job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    /// Name of the stage that reported the error (e.g. `"Extraction"`).
    pub stage: String,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Underlying cause, if one was preserved.
    pub cause: Option<String>,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
    /// How badly this error compromises the execution.
    pub severity: Severity,
    /// Taxonomy tag for alerting and tests.
    pub kind: ErrorKind,
}

impl StageError {
    /// Record a new error against `stage` with the current timestamp.
    pub fn new(
        stage: impl Into<String>,
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            cause: None,
            timestamp: Utc::now(),
            severity,
            kind,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {}: {}",
            self.stage, self.severity, self.kind, self.message
        )?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for StageError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_meaningful() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!(
            [Severity::Critical, Severity::Warning, Severity::Error]
                .iter()
                .max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::NotFound);
    }

    #[test]
    fn stage_error_display_includes_cause() {
        let err = StageError::new("Extraction", ErrorKind::Extraction, Severity::Critical, "boom")
            .with_cause("ORA-00942: table or view does not exist");
        let rendered = err.to_string();
        assert!(rendered.contains("Extraction"));
        assert!(rendered.contains("critical"));
        assert!(rendered.contains("ORA-00942"));
    }

    #[test]
    fn stage_error_round_trips_through_json() {
        let err = StageError::new("Publish", ErrorKind::Upload, Severity::Error, "bucket gone");
        let json = serde_json::to_string(&err).unwrap();
        let back: StageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
