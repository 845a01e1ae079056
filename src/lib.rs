// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lakeport — a scheduled relational-to-columnar ingestion service.
//!
//! This façade crate re-exports the workspace members so integrators (and
//! the end-to-end tests under `tests/`) can take a single dependency. The
//! daemon binary lives in `lakeportd`.

#![deny(unsafe_code)]

pub use lkp_config as config;
pub use lkp_core as model;
pub use lkp_error as error;
pub use lkp_pack as pack;
pub use lkp_pipeline as pipeline;
pub use lkp_scheduler as scheduler;
pub use lkp_source as source;
pub use lkp_transform as transform;
pub use lkp_upload as upload;
pub use lkp_vault as vault;
