// SPDX-License-Identifier: MIT OR Apache-2.0
//! Oracle ref-cursor driver.
//!
//! Procedures (package-qualified or plain) are invoked through an anonymous
//! block whose binds are the declared parameters in order plus a trailing
//! `p_cursor` OUT ref-cursor that supplies the rows. Raw statements execute
//! as text with no cursor attached. The underlying driver is blocking, so
//! all database work runs on the blocking thread pool and polls the
//! cancellation token between rows.

use crate::classify::{clean_parameter_name, is_raw_statement};
use crate::error::SourceError;
use crate::{DataSource, ExtractRequest};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use lkp_core::{CancelToken, ColumnDef, LogicalType, ParamValue, SourceKind, TabularData, Value};
use oracle::sql_type::{OracleType, RefCursor, ToSql};
use oracle::{Connection, ResultSet, Row};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

/// Name of the trailing output-cursor bind appended to every procedure
/// invocation.
pub const CURSOR_BIND: &str = "p_cursor";

/// Driver for the output-cursor database family.
#[derive(Debug, Default)]
pub struct OracleSource;

impl OracleSource {
    /// A fresh driver; connections open per extraction.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for OracleSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Oracle
    }

    async fn extract(
        &self,
        request: &ExtractRequest,
        cancel: &CancelToken,
    ) -> Result<TabularData, SourceError> {
        let blocking_request = request.clone();
        let blocking_cancel = cancel.clone();
        let handle =
            tokio::task::spawn_blocking(move || run_blocking(&blocking_request, &blocking_cancel));
        let timed = tokio::time::timeout(request.timeout, handle);

        tokio::select! {
            () = cancel.cancelled() => Err(SourceError::Cancelled),
            joined = timed => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(SourceError::Extraction(format!(
                    "driver task failed: {join_err}"
                ))),
                Err(_) => Err(SourceError::Timeout(request.timeout)),
            },
        }
    }
}

fn run_blocking(request: &ExtractRequest, cancel: &CancelToken) -> Result<TabularData, SourceError> {
    let credentials = ConnectDescriptor::parse(&request.connection_string)?;
    let conn = Connection::connect(
        &credentials.username,
        &credentials.password,
        &credentials.connect_string,
    )
    .map_err(wrap)?;
    conn.set_call_timeout(Some(request.timeout)).map_err(wrap)?;

    let owned_params: Vec<(String, Box<dyn ToSql>)> = request
        .parameters
        .iter()
        .map(|(name, value)| {
            (
                clean_parameter_name(name).to_string(),
                to_sql_value(value),
            )
        })
        .collect();
    let named: Vec<(&str, &dyn ToSql)> = owned_params
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_ref()))
        .collect();

    let table = if is_raw_statement(&request.query) {
        debug!(target: "lakeport.source", "executing raw statement");
        let rows = if named.is_empty() {
            conn.query(&request.query, &[]).map_err(wrap)?
        } else {
            conn.query_named(&request.query, &named).map_err(wrap)?
        };
        collect_rows(rows, cancel)?
    } else {
        let block = render_block(&request.query, &request.parameters);
        debug!(target: "lakeport.source", block = %block, "invoking procedure");

        let mut stmt = conn.statement(&block).build().map_err(wrap)?;
        let mut binds = named;
        binds.push((CURSOR_BIND, &OracleType::RefCursor));
        stmt.execute_named(&binds).map_err(wrap)?;

        let mut cursor: RefCursor = stmt.bind_value(CURSOR_BIND).map_err(wrap)?;
        let rows = cursor.query().map_err(wrap)?;
        collect_rows(rows, cancel)?
    };

    Ok(table)
}

fn wrap(err: oracle::Error) -> SourceError {
    SourceError::Extraction(err.to_string())
}

// ---------------------------------------------------------------------------
// Connection descriptor
// ---------------------------------------------------------------------------

/// Credentials split out of a resolved connection string.
///
/// Two shapes are accepted: the key-value form
/// (`User Id=u;Password=p;Data Source=//host/svc`) and the compact
/// `user/password@connect` form.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectDescriptor {
    username: String,
    password: String,
    connect_string: String,
}

impl ConnectDescriptor {
    fn parse(connection_string: &str) -> Result<Self, SourceError> {
        if connection_string.contains('=') {
            let mut username = None;
            let mut password = None;
            let mut connect = None;
            for pair in connection_string.split(';') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                match key.trim().to_ascii_lowercase().as_str() {
                    "user id" | "user" => username = Some(value.trim().to_string()),
                    "password" => password = Some(value.trim().to_string()),
                    "data source" => connect = Some(value.trim().to_string()),
                    _ => {}
                }
            }
            return match (username, password, connect) {
                (Some(username), Some(password), Some(connect_string)) => Ok(Self {
                    username,
                    password,
                    connect_string,
                }),
                _ => Err(SourceError::Config(
                    "connection string must carry User Id, Password, and Data Source".to_string(),
                )),
            };
        }

        // user/password@connect
        if let Some((creds, connect)) = connection_string.split_once('@') {
            if let Some((username, password)) = creds.split_once('/') {
                if !username.is_empty() && !password.is_empty() && !connect.is_empty() {
                    return Ok(Self {
                        username: username.to_string(),
                        password: password.to_string(),
                        connect_string: connect.to_string(),
                    });
                }
            }
        }
        Err(SourceError::Config(
            "unrecognised connection string shape".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Statement rendering and binding
// ---------------------------------------------------------------------------

/// Render the anonymous block for a procedure invocation: the declared
/// parameters in order, then the trailing output cursor.
fn render_block(
    procedure: &str,
    parameters: &indexmap::IndexMap<String, ParamValue>,
) -> String {
    let mut binds: Vec<String> = parameters
        .keys()
        .map(|name| format!(":{}", clean_parameter_name(name)))
        .collect();
    binds.push(format!(":{CURSOR_BIND}"));
    format!("begin {procedure}({}); end;", binds.join(", "))
}

fn to_sql_value(value: &ParamValue) -> Box<dyn ToSql> {
    match value {
        ParamValue::Null => Box::new(None::<String>),
        ParamValue::Bool(b) => Box::new(*b),
        ParamValue::Int32(i) => Box::new(*i),
        ParamValue::Int64(i) => Box::new(*i),
        // Decimals travel as text; the server coerces to NUMBER without
        // a float round trip.
        ParamValue::Decimal(d) => Box::new(d.to_string()),
        ParamValue::Float64(f) => Box::new(*f),
        ParamValue::String(s) => Box::new(s.clone()),
    }
}

// ---------------------------------------------------------------------------
// Result materialisation
// ---------------------------------------------------------------------------

fn collect_rows(
    rows: ResultSet<'_, Row>,
    cancel: &CancelToken,
) -> Result<TabularData, SourceError> {
    let schema: Vec<ColumnDef> = rows
        .column_info()
        .iter()
        .map(|info| {
            ColumnDef::new(
                info.name(),
                map_oracle_type(info.oracle_type()),
                info.nullable(),
            )
        })
        .collect();
    let types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|info| info.oracle_type().clone())
        .collect();

    let mut table = TabularData::with_schema(schema);
    for row in rows {
        cancel
            .bail_if_cancelled()
            .map_err(|_| SourceError::Cancelled)?;
        let row = row.map_err(wrap)?;
        let mut cells = Vec::with_capacity(table.schema.len());
        for (idx, column) in table.schema.iter().enumerate() {
            cells.push(read_cell(&row, idx, column.logical_type, &types[idx])?);
        }
        table.rows.push(cells);
    }
    Ok(table)
}

/// Driver type → logical type.
///
/// Integer-shaped NUMBER columns (scale 0) narrow by precision; anything
/// fractional or unconstrained stays decimal.
fn map_oracle_type(oracle_type: &OracleType) -> LogicalType {
    match oracle_type {
        OracleType::Number(precision, scale) => {
            if *scale == 0 && *precision > 0 {
                if *precision <= 9 {
                    LogicalType::Int32
                } else if *precision <= 18 {
                    LogicalType::Int64
                } else {
                    LogicalType::Decimal
                }
            } else {
                LogicalType::Decimal
            }
        }
        OracleType::Int64 | OracleType::UInt64 => LogicalType::Int64,
        OracleType::Float(_) | OracleType::BinaryFloat | OracleType::BinaryDouble => {
            LogicalType::Float64
        }
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => LogicalType::Timestamp,
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => LogicalType::Binary,
        OracleType::Boolean => LogicalType::Bool,
        // Character data, CLOBs, intervals, and anything unclassified all
        // carry as strings.
        _ => LogicalType::String,
    }
}

fn read_cell(
    row: &Row,
    idx: usize,
    logical: LogicalType,
    oracle_type: &OracleType,
) -> Result<Value, SourceError> {
    let value = match logical {
        LogicalType::Int32 => row
            .get::<usize, Option<i32>>(idx)
            .map_err(wrap)?
            .map(Value::Int32),
        LogicalType::Int64 => row
            .get::<usize, Option<i64>>(idx)
            .map_err(wrap)?
            .map(Value::Int64),
        LogicalType::Float64 => row
            .get::<usize, Option<f64>>(idx)
            .map_err(wrap)?
            .map(Value::Float64),
        LogicalType::Bool => row
            .get::<usize, Option<bool>>(idx)
            .map_err(wrap)?
            .map(Value::Bool),
        LogicalType::Decimal => row
            .get::<usize, Option<String>>(idx)
            .map_err(wrap)?
            .map(|text| parse_decimal(&text)),
        LogicalType::Timestamp => match oracle_type {
            // Offset-bearing values normalise to naive UTC.
            OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => row
                .get::<usize, Option<DateTime<Utc>>>(idx)
                .map_err(wrap)?
                .map(|dt| Value::Timestamp(dt.naive_utc())),
            _ => row
                .get::<usize, Option<NaiveDateTime>>(idx)
                .map_err(wrap)?
                .map(Value::Timestamp),
        },
        LogicalType::Binary => row
            .get::<usize, Option<Vec<u8>>>(idx)
            .map_err(wrap)?
            .map(Value::Binary),
        LogicalType::String => row
            .get::<usize, Option<String>>(idx)
            .map_err(wrap)?
            .map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// NUMBER text → decimal, falling back to the raw text for exotic values
/// (scientific notation beyond decimal range).
fn parse_decimal(text: &str) -> Value {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map(Value::Decimal)
        .unwrap_or_else(|_| Value::String(text.to_string()))
}
