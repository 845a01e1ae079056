// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core data model for Lakeport.
//!
//! If you only take one dependency, take this one. It defines the in-memory
//! tabular representation exchanged between drivers, transformations, and
//! the columnar packer; the dataset specification loaded from disk; the job
//! execution record with its state machine; and the cancellation primitive
//! threaded through every blocking operation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cancellation token shared by every I/O path of an execution.
pub mod cancel;
/// Control-record sidecar describing a packed artifact.
pub mod control;
/// Job execution record and state machine.
pub mod execution;
/// Artifact and execution naming helpers.
pub mod naming;
/// Dataset specification types as loaded from `dataset-*.json`.
pub mod spec;
/// In-memory tabular data model.
pub mod table;

pub use cancel::CancelToken;
pub use control::ControlRecord;
pub use execution::{ExecutionState, JobExecution};
pub use naming::{dataset_name, new_execution_id, render_file_name};
pub use spec::{
    CompressionCodec, DatasetSpec, DestinationSpec, ExtractionKind, OutputSpec, ParamValue,
    ProviderKind, SourceKind, SourceSpec, TransformationSpec,
};
pub use table::{ColumnDef, LogicalType, TabularData, Value};
