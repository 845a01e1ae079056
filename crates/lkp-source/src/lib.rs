// SPDX-License-Identifier: MIT OR Apache-2.0
//! Database extraction drivers for Lakeport.
//!
//! Every driver implements the same [`DataSource`] contract: hand it a
//! resolved connection string, a statement, and typed parameters, get back
//! a [`TabularData`] or a [`SourceError`]. Driver-specific quirks (the
//! Oracle ref-cursor protocol, SQL Server `EXEC` generation) stay inside
//! the driver modules.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Statement classification shared by the drivers.
pub mod classify;
/// Driver error type.
pub mod error;
/// SQL Server driver.
pub mod mssql;
/// Oracle ref-cursor driver.
pub mod oracle_source;

use async_trait::async_trait;
use indexmap::IndexMap;
use lkp_core::{CancelToken, ParamValue, SourceKind, TabularData};
use std::sync::Arc;
use std::time::Duration;

pub use classify::is_raw_statement;
pub use error::SourceError;
pub use mssql::SqlServerSource;
pub use oracle_source::OracleSource;

/// Everything a driver needs for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Fully resolved connection string (no secret placeholders left).
    pub connection_string: String,
    /// Procedure name, `package.procedure`, or raw statement text.
    pub query: String,
    /// Named parameters in declaration order.
    pub parameters: IndexMap<String, ParamValue>,
    /// Command timeout for the statement.
    pub timeout: Duration,
}

/// Default command timeout for drivers when the dataset does not override.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Executes a named extraction against a database.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The database family this driver serves.
    fn kind(&self) -> SourceKind;

    /// Run the extraction and normalise the result.
    async fn extract(
        &self,
        request: &ExtractRequest,
        cancel: &CancelToken,
    ) -> Result<TabularData, SourceError>;
}

/// Builds drivers by source kind.
pub struct SourceFactory;

impl SourceFactory {
    /// The driver for `kind`.
    #[must_use]
    pub fn create(kind: SourceKind) -> Arc<dyn DataSource> {
        match kind {
            SourceKind::SqlServer => Arc::new(SqlServerSource::new()),
            SourceKind::Oracle => Arc::new(OracleSource::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_returns_matching_kinds() {
        assert_eq!(
            SourceFactory::create(SourceKind::SqlServer).kind(),
            SourceKind::SqlServer
        );
        assert_eq!(
            SourceFactory::create(SourceKind::Oracle).kind(),
            SourceKind::Oracle
        );
    }
}
