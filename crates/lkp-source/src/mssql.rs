// SPDX-License-Identifier: MIT OR Apache-2.0
//! SQL Server driver.
//!
//! The query string is executed as a stored procedure unless it classifies
//! as raw statement text. Procedure calls are rendered as an `EXEC` with
//! every parameter bound by name (`@Name = @Pn`), so procedures with
//! defaulted parameters keep working when a dataset omits them.

use crate::classify::{clean_parameter_name, is_raw_statement};
use crate::error::SourceError;
use crate::{DataSource, ExtractRequest};
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use lkp_core::{CancelToken, ColumnDef, LogicalType, ParamValue, SourceKind, TabularData, Value};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use tiberius::numeric::Numeric;
use tiberius::{Client, ColumnData, ColumnType, Config, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

/// Driver for the stored-procedure database family.
#[derive(Debug, Default)]
pub struct SqlServerSource;

impl SqlServerSource {
    /// A fresh driver; connections open per extraction.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for SqlServerSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SqlServer
    }

    async fn extract(
        &self,
        request: &ExtractRequest,
        cancel: &CancelToken,
    ) -> Result<TabularData, SourceError> {
        let work = run_extraction(request, cancel);
        let timed = tokio::time::timeout(request.timeout, work);
        tokio::select! {
            () = cancel.cancelled() => Err(SourceError::Cancelled),
            result = timed => match result {
                Ok(inner) => inner,
                Err(_) => Err(SourceError::Timeout(request.timeout)),
            },
        }
    }
}

async fn run_extraction(
    request: &ExtractRequest,
    cancel: &CancelToken,
) -> Result<TabularData, SourceError> {
    let mut client = connect(&request.connection_string).await?;

    let sql = if is_raw_statement(&request.query) {
        request.query.clone()
    } else {
        render_exec_statement(&request.query, &request.parameters)
    };
    debug!(target: "lakeport.source", sql = %sql, "executing statement");

    let mut query = Query::new(sql);
    for value in request.parameters.values() {
        bind_param(&mut query, value);
    }

    let mut stream = query.query(&mut client).await.map_err(wrap)?;
    let columns = stream
        .columns()
        .await
        .map_err(wrap)?
        .map(<[tiberius::Column]>::to_vec)
        .unwrap_or_default();
    let rows = stream.into_first_result().await.map_err(wrap)?;

    let column_types: Vec<ColumnType> = columns.iter().map(|c| c.column_type()).collect();
    let schema: Vec<ColumnDef> = columns
        .iter()
        .map(|c| ColumnDef::new(c.name(), map_column_type(c.column_type()), true))
        .collect();

    let mut table = TabularData::with_schema(schema);
    for row in rows {
        cancel.bail_if_cancelled().map_err(|_| SourceError::Cancelled)?;
        table.push_row(read_row(row, &table.schema, &column_types)?);
    }
    Ok(table)
}

async fn connect(connection_string: &str) -> Result<Client<Compat<TcpStream>>, SourceError> {
    let config = Config::from_ado_string(connection_string).map_err(wrap)?;
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| SourceError::Extraction(format!("tcp connect failed: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| SourceError::Extraction(format!("setting nodelay: {e}")))?;
    Client::connect(config, tcp.compat_write()).await.map_err(wrap)
}

fn wrap(err: tiberius::error::Error) -> SourceError {
    SourceError::Extraction(err.to_string())
}

/// Render `EXEC proc @Name = @P1, …` with one positional placeholder per
/// declared parameter.
fn render_exec_statement(procedure: &str, parameters: &IndexMap<String, ParamValue>) -> String {
    let mut sql = format!("EXEC {procedure}");
    for (position, name) in parameters.keys().enumerate() {
        let separator = if position == 0 { ' ' } else { ',' };
        let _ = write!(
            sql,
            "{separator}@{} = @P{}",
            clean_parameter_name(name),
            position + 1
        );
    }
    sql
}

/// Convert a `rust_decimal::Decimal` into tiberius's `Numeric` wire type,
/// since `Decimal` only implements `ToSql` (by-reference) and `Query::bind`
/// requires `IntoSql` (by-value).
fn decimal_to_numeric(value: Decimal) -> Numeric {
    let unpacked = value.unpack();
    let mut raw = (((unpacked.hi as u128) << 64)
        + ((unpacked.mid as u128) << 32)
        + unpacked.lo as u128) as i128;
    if value.is_sign_negative() {
        raw = -raw;
    }
    Numeric::new_with_scale(raw, value.scale() as u8)
}

fn bind_param<'a>(query: &mut Query<'a>, value: &'a ParamValue) {
    match value {
        ParamValue::Null => query.bind(Option::<&str>::None),
        ParamValue::Bool(b) => query.bind(*b),
        ParamValue::Int32(i) => query.bind(*i),
        ParamValue::Int64(i) => query.bind(*i),
        ParamValue::Decimal(d) => query.bind(decimal_to_numeric(*d)),
        ParamValue::Float64(f) => query.bind(*f),
        ParamValue::String(s) => query.bind(s.as_str()),
    }
}

/// Driver type → logical type.
fn map_column_type(column_type: ColumnType) -> LogicalType {
    use ColumnType as C;
    match column_type {
        C::Int1 | C::Int2 | C::Int4 => LogicalType::Int32,
        C::Int8 | C::Intn => LogicalType::Int64,
        C::Bit | C::Bitn => LogicalType::Bool,
        C::Float4 | C::Float8 | C::Floatn => LogicalType::Float64,
        C::Decimaln | C::Numericn | C::Money | C::Money4 => LogicalType::Decimal,
        C::Datetime | C::Datetime4 | C::Datetimen | C::Datetime2 | C::Daten
        | C::DatetimeOffsetn => LogicalType::Timestamp,
        C::BigVarBin | C::BigBinary | C::Image => LogicalType::Binary,
        // Guid, Timen, character, XML, and anything unclassified all carry
        // as strings.
        _ => LogicalType::String,
    }
}

fn is_temporal(column_type: ColumnType) -> bool {
    use ColumnType as C;
    matches!(
        column_type,
        C::Datetime
            | C::Datetime4
            | C::Datetimen
            | C::Datetime2
            | C::Daten
            | C::Timen
            | C::DatetimeOffsetn
    )
}

/// Materialise one row. Temporal columns go through the typed chrono
/// getters (offset values are normalized to naive UTC); everything else is
/// converted straight from the wire representation.
fn read_row(
    row: Row,
    schema: &[ColumnDef],
    column_types: &[ColumnType],
) -> Result<Vec<Value>, SourceError> {
    let mut cells: Vec<Value> = vec![Value::Null; schema.len()];

    for (idx, column_type) in column_types.iter().enumerate() {
        if is_temporal(*column_type) {
            cells[idx] = read_temporal(&row, idx, *column_type)?;
        }
    }

    for (idx, data) in row.into_iter().enumerate() {
        if idx >= cells.len() || is_temporal(column_types[idx]) {
            continue;
        }
        cells[idx] = widen_numeric(schema[idx].logical_type, cell_from_data(data));
    }
    Ok(cells)
}

fn read_temporal(row: &Row, idx: usize, column_type: ColumnType) -> Result<Value, SourceError> {
    use ColumnType as C;
    let value = match column_type {
        C::DatetimeOffsetn => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map_err(wrap)?
            .map(|dt| dt.naive_utc()),
        C::Daten => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map_err(wrap)?
            .map(|d| d.and_time(NaiveTime::MIN)),
        C::Timen => {
            return Ok(row
                .try_get::<NaiveTime, _>(idx)
                .map_err(wrap)?
                .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null));
        }
        _ => row.try_get::<NaiveDateTime, _>(idx).map_err(wrap)?,
    };
    Ok(value.map(Value::Timestamp).unwrap_or(Value::Null))
}

fn cell_from_data(data: ColumnData<'_>) -> Value {
    use ColumnData as D;
    match data {
        D::U8(v) => v.map(|x| Value::Int32(i32::from(x))).unwrap_or(Value::Null),
        D::I16(v) => v.map(|x| Value::Int32(i32::from(x))).unwrap_or(Value::Null),
        D::I32(v) => v.map(Value::Int32).unwrap_or(Value::Null),
        D::I64(v) => v.map(Value::Int64).unwrap_or(Value::Null),
        D::F32(v) => v.map(|x| Value::Float64(f64::from(x))).unwrap_or(Value::Null),
        D::F64(v) => v.map(Value::Float64).unwrap_or(Value::Null),
        D::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        D::String(v) => v
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null),
        D::Guid(v) => v.map(|g| Value::String(g.to_string())).unwrap_or(Value::Null),
        D::Binary(v) => v
            .map(|b| Value::Binary(b.into_owned()))
            .unwrap_or(Value::Null),
        D::Numeric(v) => v
            .map(|n| Value::Decimal(Decimal::from_i128_with_scale(n.value(), u32::from(n.scale()))))
            .unwrap_or(Value::Null),
        D::Xml(v) => v
            .map(|x| Value::String(x.into_owned().to_string()))
            .unwrap_or(Value::Null),
        // Temporal variants are handled by `read_temporal`.
        _ => Value::Null,
    }
}

/// Widen narrow integer wire values into the column's declared type so a
/// nullable-int column always yields `Int64` cells.
fn widen_numeric(logical: LogicalType, value: Value) -> Value {
    match (logical, value) {
        (LogicalType::Int64, Value::Int32(i)) => Value::Int64(i64::from(i)),
        (LogicalType::Float64, Value::Int32(i)) => Value::Float64(f64::from(i)),
        (LogicalType::Decimal, Value::Int32(i)) => Value::Decimal(Decimal::from(i)),
        (LogicalType::Decimal, Value::Int64(i)) => Value::Decimal(Decimal::from(i)),
        (_, v) => v,
    }
}
