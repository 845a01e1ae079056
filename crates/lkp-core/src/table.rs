// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory tabular data model.
//!
//! Drivers produce a [`TabularData`], transformation steps rewrite it, and
//! the columnar packer consumes it. The model is deliberately row-oriented:
//! result sets arrive row by row from database drivers, and transformations
//! are row-local; columnar layout only happens at pack time.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// LogicalType
// ---------------------------------------------------------------------------

/// Logical column types supported end to end.
///
/// Richer driver types must be coerced on read: offset-bearing timestamps
/// are normalized to naive UTC, UUIDs become strings, and anything the
/// driver cannot classify is carried as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Fixed-point decimal.
    Decimal,
    /// 64-bit IEEE float.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string; always nullable in the packed output.
    String,
    /// Naive UTC timestamp.
    Timestamp,
    /// Raw bytes.
    Binary,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Decimal => "decimal",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Fixed-point decimal.
    Decimal(Decimal),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Naive UTC timestamp.
    Timestamp(NaiveDateTime),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The logical type this value naturally carries, if not null.
    #[must_use]
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(LogicalType::Bool),
            Value::Int32(_) => Some(LogicalType::Int32),
            Value::Int64(_) => Some(LogicalType::Int64),
            Value::Decimal(_) => Some(LogicalType::Decimal),
            Value::Float64(_) => Some(LogicalType::Float64),
            Value::String(_) => Some(LogicalType::String),
            Value::Timestamp(_) => Some(LogicalType::Timestamp),
            Value::Binary(_) => Some(LogicalType::Binary),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnDef / TabularData
// ---------------------------------------------------------------------------

/// One column of a result-set schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as reported by the driver.
    pub name: String,
    /// Logical type after driver coercion.
    pub logical_type: LogicalType,
    /// Whether the driver reported the column as nullable.
    pub nullable: bool,
}

impl ColumnDef {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, logical_type: LogicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable,
        }
    }
}

/// An ordered schema plus rows.
///
/// Invariant: every row has exactly `schema.len()` cells. The engine deep
/// copies a table before handing it to transformation steps, so steps may
/// mutate freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularData {
    /// Ordered column definitions.
    pub schema: Vec<ColumnDef>,
    /// Row-major cell data.
    pub rows: Vec<Vec<Value>>,
}

impl TabularData {
    /// An empty table with the given schema.
    #[must_use]
    pub fn with_schema(schema: Vec<ColumnDef>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// `true` when the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column named `name` (case-sensitive).
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|c| c.name == name)
    }

    /// Append a row.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the row width does not match the schema.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.schema.len(), "row width mismatch");
        self.rows.push(row);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn trades_schema() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("TradeId", LogicalType::Int64, false),
            ColumnDef::new("Symbol", LogicalType::String, true),
            ColumnDef::new("Price", LogicalType::Decimal, true),
        ]
    }

    #[test]
    fn column_index_is_case_sensitive() {
        let table = TabularData::with_schema(trades_schema());
        assert_eq!(table.column_index("Symbol"), Some(1));
        assert_eq!(table.column_index("symbol"), None);
    }

    #[test]
    fn push_row_tracks_counts() {
        let mut table = TabularData::with_schema(trades_schema());
        assert!(table.is_empty());
        table.push_row(vec![
            Value::Int64(1),
            Value::String("VOD.L".into()),
            Value::Decimal("101.25".parse().unwrap()),
        ]);
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column_count(), 3);
    }

    #[test]
    fn value_reports_its_logical_type() {
        assert_eq!(Value::Null.logical_type(), None);
        assert_eq!(Value::Int32(7).logical_type(), Some(LogicalType::Int32));
        assert_eq!(
            Value::Binary(vec![1, 2]).logical_type(),
            Some(LogicalType::Binary)
        );
    }

    #[test]
    fn table_round_trips_through_json() {
        let mut table = TabularData::with_schema(trades_schema());
        table.push_row(vec![Value::Int64(9), Value::Null, Value::Float64(1.5)]);
        let json = serde_json::to_string(&table).unwrap();
        let back: TabularData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
