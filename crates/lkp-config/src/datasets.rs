// SPDX-License-Identifier: MIT OR Apache-2.0
//! `dataset-*.json` loading.
//!
//! Each file parses independently: a file that fails to parse or fails
//! structural validation is logged and skipped while the other specs still
//! load. File names are not semantically significant; the `id` inside
//! determines identity, and the first file claiming an id wins.

use crate::ConfigError;
use lkp_core::DatasetSpec;
use std::path::Path;
use tracing::{debug, error, warn};

/// Whether a file name matches the `dataset-*.json` convention.
fn is_dataset_file(name: &str) -> bool {
    name.starts_with("dataset-") && name.ends_with(".json") && name.len() > "dataset-.json".len()
}

/// Load every valid dataset spec under `dir`, in file-name order.
pub fn load_datasets(dir: &Path) -> Result<Vec<DatasetSpec>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Unreadable {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut paths: Vec<std::path::PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_dataset_file)
        })
        .collect();
    paths.sort();

    let mut specs: Vec<DatasetSpec> = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    target: "lakeport.config",
                    path = %path.display(),
                    error = %e,
                    "dataset file unreadable; skipped"
                );
                continue;
            }
        };
        let spec: DatasetSpec = match serde_json::from_str(&raw) {
            Ok(spec) => spec,
            Err(e) => {
                error!(
                    target: "lakeport.config",
                    path = %path.display(),
                    error = %e,
                    "dataset file does not parse; skipped"
                );
                continue;
            }
        };
        let problems = spec.problems();
        if !problems.is_empty() {
            error!(
                target: "lakeport.config",
                path = %path.display(),
                dataset_id = %spec.id,
                problems = ?problems,
                "dataset spec is inconsistent; skipped"
            );
            continue;
        }
        if specs.iter().any(|existing| existing.id == spec.id) {
            warn!(
                target: "lakeport.config",
                path = %path.display(),
                dataset_id = %spec.id,
                "duplicate dataset id; first file wins"
            );
            continue;
        }
        debug!(
            target: "lakeport.config",
            path = %path.display(),
            dataset_id = %spec.id,
            enabled = spec.enabled,
            "dataset spec loaded"
        );
        specs.push(spec);
    }
    Ok(specs)
}
