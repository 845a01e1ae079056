// SPDX-License-Identifier: MIT OR Apache-2.0
//! Artifact and execution naming helpers.
//!
//! All names derive from a single UTC instant captured when the trigger
//! fires, so the packed file, the control record, and the execution id of
//! one run always agree on the timestamp.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Compact `yyyyMMddHHmmss` stamp used across all artifact names.
fn compact_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// A fresh execution id: `{dataset_id}.{yyyyMMddHHmmss}-{8-hex}`.
///
/// The timestamp prefix keeps ids sortable and monotonic within a dataset
/// (executions of one dataset never overlap); the random suffix makes them
/// unique process-wide.
#[must_use]
pub fn new_execution_id(dataset_id: &str, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{dataset_id}.{}-{}", compact_stamp(at), &suffix[..8])
}

/// The dataset name recorded in the control file: `{id}_{yyyyMMddHHmmss}`.
#[must_use]
pub fn dataset_name(dataset_id: &str, at: DateTime<Utc>) -> String {
    format!("{dataset_id}_{}", compact_stamp(at))
}

/// Render an output file name pattern against `at`.
///
/// Supported tokens: `{date:yyyyMMdd}`, `{time:HHmmss}`, and the bare
/// `{date}` / `{time}` (same values). Date/time format strings understand
/// the `yyyy`, `MM`, `dd`, `HH`, `mm`, `ss` tokens.
#[must_use]
pub fn render_file_name(pattern: &str, at: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            // Unbalanced brace: emit the tail verbatim.
            out.push_str(&rest[open..]);
            return out;
        };
        let token = &rest[open + 1..open + close];
        let (name, format) = match token.split_once(':') {
            Some((name, format)) => (name, Some(format)),
            None => (token, None),
        };
        match name {
            "date" => out.push_str(&render_stamp(format.unwrap_or("yyyyMMdd"), at)),
            "time" => out.push_str(&render_stamp(format.unwrap_or("HHmmss"), at)),
            _ => {
                // Unknown tokens pass through untouched.
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Translate a `yyyyMMdd`-style format to chrono specifiers and render it.
fn render_stamp(format: &str, at: DateTime<Utc>) -> String {
    let mut chrono_fmt = String::with_capacity(format.len() * 2);
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        match (c, run) {
            ('y', 4) => chrono_fmt.push_str("%Y"),
            ('y', 2) => chrono_fmt.push_str("%y"),
            ('M', 2) => chrono_fmt.push_str("%m"),
            ('d', 2) => chrono_fmt.push_str("%d"),
            ('H', 2) => chrono_fmt.push_str("%H"),
            ('m', 2) => chrono_fmt.push_str("%M"),
            ('s', 2) => chrono_fmt.push_str("%S"),
            _ => {
                for _ in 0..run {
                    chrono_fmt.push(c);
                }
            }
        }
    }
    at.format(&chrono_fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jan15() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 5).unwrap()
    }

    #[test]
    fn execution_id_has_dataset_prefix_and_stamp() {
        let id = new_execution_id("tr1", jan15());
        assert!(id.starts_with("tr1.20240115093005-"), "{id}");
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn execution_ids_are_unique() {
        let a = new_execution_id("tr1", jan15());
        let b = new_execution_id("tr1", jan15());
        assert_ne!(a, b);
    }

    #[test]
    fn dataset_name_matches_control_contract() {
        assert_eq!(dataset_name("tr1", jan15()), "tr1_20240115093005");
    }

    #[test]
    fn file_pattern_renders_date_and_time_tokens() {
        assert_eq!(
            render_file_name("tr_{date:yyyyMMdd}.parquet", jan15()),
            "tr_20240115.parquet"
        );
        assert_eq!(
            render_file_name("x_{date}_{time}.parquet", jan15()),
            "x_20240115_093005.parquet"
        );
        assert_eq!(
            render_file_name("{date:yyyyMMdd}_{time:HHmmss}", jan15()),
            "20240115_093005"
        );
    }

    #[test]
    fn unknown_tokens_and_plain_names_pass_through() {
        assert_eq!(render_file_name("plain.parquet", jan15()), "plain.parquet");
        assert_eq!(render_file_name("a_{env}.bin", jan15()), "a_{env}.bin");
        assert_eq!(render_file_name("oops_{date", jan15()), "oops_{date");
    }
}
