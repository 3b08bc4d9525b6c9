/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! # SZip Rust Library
//!
//! Packs a directory tree into a signed, tamper-evident `.szp` container: a
//! ZIP archive plus a SHA-1 manifest of every file, framed together and
//! wrapped in a PEM-encoded PKCS#7 SignedData envelope. Extraction verifies
//! the signature, then every file hash, before anything touches the disk.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod keys;
pub mod manifest;
pub mod pkcs7;
pub mod processor;
pub mod signing;
pub mod ui;
pub mod unpack;
pub mod verification;

use std::path::{Path, PathBuf};

pub use error::{ErrorKind, SzipError};
pub use keys::KeyChain;
pub use manifest::{Manifest, ManifestEntry};
pub use unpack::ExtractSummary;
pub use verification::TrustPin;

pub const APP_NAME: &str = "SZip";
pub const APP_BIN_NAME: &str = "szip";
pub const APP_VERSION: &str = "1.0.0";
pub const APP_AUTHOR: &str = "Tiash H Kabir / @MrCarb0n";
pub const APP_ABOUT: &str =
    "Signed, tamper-evident directory containers: ZIP payload, SHA-1 manifest, PKCS#7 envelope.";
pub const BUFFER_SIZE: usize = 64 * 1024;

pub const CONTAINER_EXTENSION: &str = "szp";
pub const PEM_TAG: &str = "PKCS7";

/// Pack `source_root` into a signed container named after `output`.
pub fn pack(
    source_root: &Path,
    output: &Path,
    keys: &KeyChain,
    ui: &ui::Ui,
) -> Result<PathBuf, SzipError> {
    processor::ArtifactProcessor::pack(source_root, output, keys, ui)
}

/// Verify `container` and write its files under `destination`.
pub fn extract(
    container: &Path,
    destination: &Path,
    pin: Option<&TrustPin>,
    ui: &ui::Ui,
) -> Result<ExtractSummary, SzipError> {
    unpack::ArtifactUnpacker::extract(container, destination, pin, ui)
}

/// Verify `container` and return its manifest text.
pub fn info(container: &Path, pin: Option<&TrustPin>, ui: &ui::Ui) -> Result<String, SzipError> {
    unpack::ArtifactUnpacker::info(container, pin, ui)
}
