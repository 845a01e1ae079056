// SPDX-License-Identifier: MIT OR Apache-2.0
//! Columnar packing and control-record generation.
//!
//! [`ParquetPacker`] serialises a [`lkp_core::TabularData`] to Parquet
//! bytes (Snappy by default, null masks for every column);
//! [`write_control`] renders the CSV sidecar; [`sha256_hex`] computes the
//! checksum that links the two.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Control-record CSV writer.
pub mod control;
/// Parquet serialisation.
pub mod parquet_writer;

pub use control::{CONTROL_HEADER, ControlError, write_control};
pub use parquet_writer::{PackError, PackOptions, ParquetPacker};

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_lowercase_hex_of_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn checksum_of_empty_input_is_stable() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
