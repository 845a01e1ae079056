// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control-record CSV writer.
//!
//! RFC-4180, UTF-8, one header row and one data row. Quoting is handled by
//! the CSV layer: fields containing commas, quotes, or line breaks are
//! wrapped and embedded quotes doubled. Consumers treat CRLF and LF
//! equivalently, so the writer emits LF.

use chrono::SecondsFormat;
use lkp_core::ControlRecord;

/// The literal header row every control file starts with.
pub const CONTROL_HEADER: [&str; 6] = [
    "RecordCount",
    "RefDate",
    "Checksum",
    "Timestamp",
    "DatasetName",
    "Source",
];

/// Failures while rendering the control record.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The CSV layer failed.
    #[error("control record write failed: {0}")]
    Write(String),
}

/// Render `record` as CSV bytes.
pub fn write_control(record: &ControlRecord) -> Result<Vec<u8>, ControlError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(CONTROL_HEADER)
        .map_err(|e| ControlError::Write(e.to_string()))?;
    writer
        .write_record([
            record.record_count.to_string(),
            record.ref_date.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.checksum.clone(),
            record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.dataset_name.clone(),
            record.source.clone(),
        ])
        .map_err(|e| ControlError::Write(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| ControlError::Write(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| ControlError::Write(e.to_string()))
}
