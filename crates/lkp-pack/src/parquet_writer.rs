// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parquet serialisation.
//!
//! Logical → physical mapping: Int32/Int64/Float64/Bool map directly,
//! Decimal becomes `Decimal128(38, 10)`, String is always-nullable UTF-8,
//! Timestamp is microseconds since epoch (naive UTC), Binary is a byte
//! array. Parquet supports per-column null masks, so nulls are materialised
//! as validity bitmaps for every type rather than sentinel values.

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Decimal128Builder, Float64Builder, Int32Builder,
    Int64Builder, StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use lkp_core::{CancelToken, CompressionCodec, LogicalType, TabularData, Value};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Precision of the packed decimal physical type.
pub const DECIMAL_PRECISION: u8 = 38;
/// Scale of the packed decimal physical type.
pub const DECIMAL_SCALE: i8 = 10;

/// Failures surfaced while packing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    /// Column buffer construction failed.
    #[error("column encoding failed: {0}")]
    Encode(String),

    /// The Parquet writer failed.
    #[error("parquet write failed: {0}")]
    Write(String),

    /// A cell's value cannot be represented in its column's type.
    #[error("column '{column}' row {row}: {reason}")]
    BadCell {
        /// Column name.
        column: String,
        /// Zero-based row index.
        row: usize,
        /// What was wrong.
        reason: String,
    },

    /// Packing was cancelled.
    #[error("packing cancelled")]
    Cancelled,
}

/// Tunables carried from the dataset's output spec.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Compression codec; Snappy unless overridden.
    pub compression: CompressionCodec,
    /// Row-group size hint.
    pub row_group_size: Option<usize>,
}

/// Serialises tables to Parquet bytes.
#[derive(Debug, Default)]
pub struct ParquetPacker;

impl ParquetPacker {
    /// A packer with no state; options travel per call.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Pack `table` into Parquet bytes.
    pub fn write(
        &self,
        table: &TabularData,
        options: &PackOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, PackError> {
        let schema = Arc::new(arrow_schema(table));
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(table.schema.len());
        for (idx, column) in table.schema.iter().enumerate() {
            cancel.bail_if_cancelled().map_err(|_| PackError::Cancelled)?;
            columns.push(encode_column(table, idx, column.logical_type)?);
        }

        let batch = if columns.is_empty() {
            RecordBatch::new_empty(Arc::clone(&schema))
        } else {
            RecordBatch::try_new(Arc::clone(&schema), columns)
                .map_err(|e| PackError::Encode(e.to_string()))?
        };

        let mut properties = WriterProperties::builder()
            .set_compression(map_compression(options.compression));
        if let Some(rows) = options.row_group_size {
            properties = properties.set_max_row_group_size(rows.max(1));
        }

        let mut sink = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut sink, schema, Some(properties.build()))
            .map_err(|e| PackError::Write(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| PackError::Write(e.to_string()))?;
        writer.close().map_err(|e| PackError::Write(e.to_string()))?;

        debug!(
            target: "lakeport.pack",
            rows = table.row_count(),
            columns = table.column_count(),
            bytes = sink.len(),
            "packed table"
        );
        Ok(sink)
    }
}

fn map_compression(codec: CompressionCodec) -> Compression {
    match codec {
        CompressionCodec::Snappy => Compression::SNAPPY,
        CompressionCodec::None => Compression::UNCOMPRESSED,
        CompressionCodec::Gzip => Compression::GZIP(GzipLevel::default()),
        CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
    }
}

fn arrow_schema(table: &TabularData) -> Schema {
    let fields: Vec<Field> = table
        .schema
        .iter()
        .map(|column| Field::new(&column.name, arrow_type(column.logical_type), true))
        .collect();
    Schema::new(fields)
}

fn arrow_type(logical: LogicalType) -> DataType {
    match logical {
        LogicalType::Int32 => DataType::Int32,
        LogicalType::Int64 => DataType::Int64,
        LogicalType::Decimal => DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE),
        LogicalType::Float64 => DataType::Float64,
        LogicalType::Bool => DataType::Boolean,
        LogicalType::String => DataType::Utf8,
        LogicalType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        LogicalType::Binary => DataType::Binary,
    }
}

/// Rescale a decimal to the packed scale, returning the i128 mantissa.
fn decimal_to_i128(value: Decimal) -> i128 {
    let rounded = value.round_dp(u32::from(DECIMAL_SCALE.unsigned_abs()));
    let shift = u32::from(DECIMAL_SCALE.unsigned_abs()) - rounded.scale();
    rounded.mantissa() * 10i128.pow(shift)
}

macro_rules! bad_cell {
    ($table:expr, $idx:expr, $row:expr, $value:expr) => {
        PackError::BadCell {
            column: $table.schema[$idx].name.clone(),
            row: $row,
            reason: format!("unexpected value {:?}", $value),
        }
    };
}

#[allow(clippy::too_many_lines)]
fn encode_column(
    table: &TabularData,
    idx: usize,
    logical: LogicalType,
) -> Result<ArrayRef, PackError> {
    let rows = &table.rows;
    Ok(match logical {
        LogicalType::Int32 => {
            let mut builder = Int32Builder::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Int32(v) => builder.append_value(*v),
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Int64(v) => builder.append_value(*v),
                    Value::Int32(v) => builder.append_value(i64::from(*v)),
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::Decimal => {
            let mut builder = Decimal128Builder::with_capacity(rows.len())
                .with_data_type(DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE));
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Decimal(v) => builder.append_value(decimal_to_i128(*v)),
                    Value::Int32(v) => builder.append_value(decimal_to_i128(Decimal::from(*v))),
                    Value::Int64(v) => builder.append_value(decimal_to_i128(Decimal::from(*v))),
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Float64(v) => builder.append_value(*v),
                    Value::Int32(v) => builder.append_value(f64::from(*v)),
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::Bool => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Bool(v) => builder.append_value(*v),
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::String => {
            let mut builder = StringBuilder::new();
            for row in rows {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::String(v) => builder.append_value(v),
                    // Unclassified values carry as their display form.
                    Value::Bool(v) => builder.append_value(v.to_string()),
                    Value::Int32(v) => builder.append_value(v.to_string()),
                    Value::Int64(v) => builder.append_value(v.to_string()),
                    Value::Float64(v) => builder.append_value(v.to_string()),
                    Value::Decimal(v) => builder.append_value(v.to_string()),
                    Value::Timestamp(v) => builder.append_value(v.to_string()),
                    Value::Binary(_) => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::Timestamp => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Timestamp(v) => {
                        builder.append_value(v.and_utc().timestamp_micros());
                    }
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
        LogicalType::Binary => {
            let mut builder = BinaryBuilder::new();
            for (row_idx, row) in rows.iter().enumerate() {
                match &row[idx] {
                    Value::Null => builder.append_null(),
                    Value::Binary(v) => builder.append_value(v),
                    other => return Err(bad_cell!(table, idx, row_idx, other)),
                }
            }
            Arc::new(builder.finish())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_rescaling_pads_to_packed_scale() {
        // 101.25 at scale 10 → 101.2500000000
        assert_eq!(
            decimal_to_i128("101.25".parse().unwrap()),
            1_012_500_000_000
        );
        assert_eq!(decimal_to_i128(Decimal::from(1)), 10_000_000_000);
        assert_eq!(decimal_to_i128(Decimal::ZERO), 0);
    }

    #[test]
    fn decimal_rescaling_rounds_excess_precision() {
        // 12 fractional digits round half-even into 10.
        assert_eq!(
            decimal_to_i128("0.123456789012".parse().unwrap()),
            1_234_567_890
        );
    }

    #[test]
    fn compression_codecs_map_onto_parquet() {
        assert_eq!(map_compression(CompressionCodec::Snappy), Compression::SNAPPY);
        assert_eq!(map_compression(CompressionCodec::None), Compression::UNCOMPRESSED);
        assert!(matches!(map_compression(CompressionCodec::Gzip), Compression::GZIP(_)));
        assert!(matches!(map_compression(CompressionCodec::Zstd), Compression::ZSTD(_)));
    }
}
