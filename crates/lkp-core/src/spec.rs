// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataset specification types as loaded from `dataset-*.json`.
//!
//! Enum-valued fields (`kind`, `extractionKind`, compression, destination
//! provider) parse case-insensitively; unknown JSON fields are ignored.
//! Parameter scalars are coerced on load to the narrowest typed value so
//! drivers never see opaque JSON nodes.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Declares `FromStr` (case-insensitive), `Display`, and serde impls for a
/// config-facing enum in one place.
macro_rules! config_enum {
    ($name:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), " value: {}"),
                        other
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $(Self::$variant => $text,)+
                };
                f.write_str(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
                ser.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
                let s = String::deserialize(de)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which database family a dataset extracts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// SQL Server — stored-procedure family.
    SqlServer,
    /// Oracle — output-cursor family.
    Oracle,
}

config_enum!(SourceKind {
    SqlServer => "sqlserver" | "mssql",
    Oracle => "oracle",
});

/// How the extraction statement is expressed in the dataset spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionKind {
    /// A plain stored procedure named by `procedure`.
    Procedure,
    /// A package-qualified procedure: `package` + `procedure`.
    Package,
    /// Raw SQL text read from `sqlFile`.
    Query,
}

config_enum!(ExtractionKind {
    Procedure => "procedure",
    Package => "package",
    Query => "query",
});

/// Compression codec for the packed artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompressionCodec {
    /// Snappy (the default).
    #[default]
    Snappy,
    /// No compression.
    None,
    /// Gzip.
    Gzip,
    /// Zstandard.
    Zstd,
}

config_enum!(CompressionCodec {
    Snappy => "snappy",
    None => "none",
    Gzip => "gzip",
    Zstd => "zstd",
});

/// Which upload provider delivers the artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Local or mounted filesystem.
    Fs,
    /// S3-compatible object store.
    Blob,
}

config_enum!(ProviderKind {
    Fs => "fs" | "filesystem",
    Blob => "blob" | "s3",
});

// ---------------------------------------------------------------------------
// ParamValue
// ---------------------------------------------------------------------------

/// A typed scalar bound as a driver parameter.
///
/// JSON numbers coerce to the narrowest representation that holds them:
/// `i32`, then `i64`, then [`Decimal`], then `f64`. Arrays and objects are
/// rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum ParamValue {
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
    /// String.
    String(String),
}

impl TryFrom<serde_json::Value> for ParamValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;
        match value {
            Json::Null => Ok(Self::Null),
            Json::Bool(b) => Ok(Self::Bool(b)),
            Json::String(s) => Ok(Self::String(s)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if let Ok(narrow) = i32::try_from(i) {
                        return Ok(Self::Int32(narrow));
                    }
                    return Ok(Self::Int64(i));
                }
                if let Ok(d) = Decimal::from_str(&n.to_string()) {
                    return Ok(Self::Decimal(d));
                }
                n.as_f64()
                    .map(Self::Float64)
                    .ok_or_else(|| format!("unrepresentable number: {n}"))
            }
            Json::Array(_) | Json::Object(_) => {
                Err("parameter values must be scalars".to_string())
            }
        }
    }
}

impl From<ParamValue> for serde_json::Value {
    fn from(value: ParamValue) -> Self {
        use serde_json::Value as Json;
        match value {
            ParamValue::Null => Json::Null,
            ParamValue::Bool(b) => Json::Bool(b),
            ParamValue::Int32(i) => Json::from(i),
            ParamValue::Int64(i) => Json::from(i),
            ParamValue::Decimal(d) => Json::String(d.to_string()),
            ParamValue::Float64(f) => {
                serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number)
            }
            ParamValue::String(s) => Json::String(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Spec structs
// ---------------------------------------------------------------------------

/// Where and how a dataset's rows are extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    /// Database family.
    pub kind: SourceKind,
    /// Name of the connection template in the host configuration.
    pub connection_key: String,
    /// How the extraction statement is expressed.
    #[serde(default = "default_extraction_kind")]
    pub extraction_kind: ExtractionKind,
    /// Stored-procedure name (for `procedure` and `package` kinds).
    #[serde(default)]
    pub procedure: Option<String>,
    /// Package name (only for the `package` kind).
    #[serde(default)]
    pub package: Option<String>,
    /// Path to a SQL file (only for the `query` kind).
    #[serde(default)]
    pub sql_file: Option<String>,
    /// Named parameters in declaration order.
    #[serde(default)]
    pub parameters: IndexMap<String, ParamValue>,
    /// Per-dataset command timeout override in seconds.
    #[serde(default)]
    pub command_timeout_sec: Option<u64>,
}

fn default_extraction_kind() -> ExtractionKind {
    ExtractionKind::Procedure
}

impl SourceSpec {
    /// Effective command timeout: the per-dataset override, or the driver
    /// family default (600 s for the cursor family, 300 s otherwise).
    #[must_use]
    pub fn command_timeout(&self) -> std::time::Duration {
        let secs = self.command_timeout_sec.unwrap_or(match self.kind {
            SourceKind::Oracle => 600,
            SourceKind::SqlServer => 300,
        });
        std::time::Duration::from_secs(secs)
    }

    /// The statement handed to the driver for procedure-style extractions.
    ///
    /// `package` kinds produce the dot-qualified `package.procedure` form;
    /// `query` kinds have no inline statement (the SQL file is read at job
    /// build time).
    #[must_use]
    pub fn statement(&self) -> Option<String> {
        match self.extraction_kind {
            ExtractionKind::Procedure => self.procedure.clone(),
            ExtractionKind::Package => match (&self.package, &self.procedure) {
                (Some(pkg), Some(proc_name)) => Some(format!("{pkg}.{proc_name}")),
                _ => None,
            },
            ExtractionKind::Query => None,
        }
    }
}

/// One transformation step to apply after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationSpec {
    /// Registered step type name (e.g. `"DataCleansing"`).
    #[serde(rename = "type")]
    pub step_type: String,
    /// Disabled steps are skipped without a log.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ascending application order; ties break by declaration order.
    #[serde(default)]
    pub order: i32,
    /// Environment tags this step runs in; empty means all.
    #[serde(default)]
    pub environments: BTreeSet<String>,
    /// Step-specific configuration.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Shape of the packed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// File name pattern with `{date:yyyyMMdd}` / `{time:HHmmss}` tokens.
    pub file_name_pattern: String,
    /// Compression codec; Snappy unless overridden.
    #[serde(default)]
    pub compression: CompressionCodec,
    /// Row-group size hint for the columnar writer.
    #[serde(default)]
    pub row_group_size: Option<usize>,
}

/// Where the artifacts are delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    /// Upload provider tag.
    pub provider: ProviderKind,
    /// Destination path (relative to the provider's base path / container).
    #[serde(default)]
    pub path: String,
}

/// A declarative recipe for one recurring ingestion flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    /// Unique dataset identifier.
    pub id: String,
    /// Disabled datasets never register a trigger.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression: `sec min hour dom month dow [year]`.
    pub cron: String,
    /// Extraction source.
    pub source: SourceSpec,
    /// Ordered transformation steps.
    #[serde(default)]
    pub transformations: Vec<TransformationSpec>,
    /// Packed-artifact shape.
    pub output: OutputSpec,
    /// Delivery destination.
    pub destination: DestinationSpec,
    /// Also write the artifacts to `local_copy_path`.
    #[serde(default)]
    pub keep_local_copy: bool,
    /// Directory for the local copies.
    #[serde(default)]
    pub local_copy_path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl DatasetSpec {
    /// Structural validation problems, empty when the spec is coherent.
    ///
    /// Cron syntax is checked by the scheduler where the expression is
    /// actually compiled; this only covers cross-field consistency.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.id.trim().is_empty() {
            problems.push("dataset id must not be empty".to_string());
        }
        if self.cron.trim().is_empty() {
            problems.push("cron expression must not be empty".to_string());
        }
        if self.output.file_name_pattern.trim().is_empty() {
            problems.push("output.fileNamePattern must not be empty".to_string());
        }
        match self.source.extraction_kind {
            ExtractionKind::Procedure => {
                if self.source.procedure.as_deref().unwrap_or("").is_empty() {
                    problems.push("procedure extraction requires source.procedure".to_string());
                }
            }
            ExtractionKind::Package => {
                if self.source.statement().is_none() {
                    problems.push(
                        "package extraction requires source.package and source.procedure"
                            .to_string(),
                    );
                }
            }
            ExtractionKind::Query => {
                if self.source.sql_file.as_deref().unwrap_or("").is_empty() {
                    problems.push("query extraction requires source.sqlFile".to_string());
                }
            }
        }
        if self.keep_local_copy && self.local_copy_path.is_none() {
            problems.push("keepLocalCopy requires localCopyPath".to_string());
        }
        problems
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
