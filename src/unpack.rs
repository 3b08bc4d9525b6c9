/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Container extraction.
//!
//! Runs only on content whose signature has already been verified. Every
//! archive entry is checked against the manifest before the first file is
//! written, so an integrity failure leaves the destination untouched.

use crate::{
    crypto::CryptoEngine,
    error::SzipError,
    frame,
    manifest::{Manifest, ManifestEntry},
    ui::Ui,
    verification::{ArtifactVerifier, TrustPin},
};
use filetime::{set_file_mtime, FileTime};
use std::{
    collections::HashSet,
    fs,
    io::{Cursor, Read, Seek, Write},
    path::{Path, PathBuf},
};
use zip::ZipArchive;

/// What an extraction run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub signer: String,
}

pub struct ArtifactUnpacker;

impl ArtifactUnpacker {
    /// Verify `container` and materialize its files under `destination`.
    pub fn extract(
        container: &Path,
        destination: &Path,
        pin: Option<&TrustPin>,
        ui: &Ui,
    ) -> Result<ExtractSummary, SzipError> {
        let verified = ArtifactVerifier::verify(container, pin, ui)?;
        let (manifest_bytes, archive_bytes) = frame::unframe(&verified.content)?;
        let manifest = Manifest::parse(&manifest_bytes)?;
        ui.verbose(&format!("Manifest lists {} files", manifest.len()));

        let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
        Self::check_entries(&mut archive, &manifest, ui)?;

        let mut summary = Self::materialize(&mut archive, &manifest, destination, ui)?;
        summary.signer = verified.signer_subject;
        Ok(summary)
    }

    /// Verify `container` and return its manifest text.
    pub fn info(container: &Path, pin: Option<&TrustPin>, ui: &Ui) -> Result<String, SzipError> {
        let verified = ArtifactVerifier::verify(container, pin, ui)?;
        let (manifest_bytes, _) = frame::unframe(&verified.content)?;
        let manifest = Manifest::parse(&manifest_bytes)?;
        ui.verbose(&format!("Manifest lists {} files", manifest.len()));
        Ok(String::from_utf8_lossy(&manifest_bytes).into_owned())
    }

    /// Hash every file entry against the manifest without writing anything.
    fn check_entries<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        manifest: &Manifest,
        ui: &Ui,
    ) -> Result<(), SzipError> {
        let mut seen = HashSet::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            Self::safe_path(file.enclosed_name(), file.name())?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let (index, _) =
                Self::read_verified(&mut file, &name, manifest, &mut std::io::sink())?;
            seen.insert(index);
            ui.very_verbose(&format!("ok   {}", name));
        }

        if let Some(missing) = manifest
            .entries()
            .iter()
            .enumerate()
            .find(|(i, _)| !seen.contains(i))
            .map(|(_, e)| e)
        {
            return Err(SzipError::integrity(
                &missing.path,
                format!(
                    "`{}` is listed in the manifest but missing from the archive",
                    missing.path
                ),
            ));
        }
        Ok(())
    }

    fn materialize<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        manifest: &Manifest,
        destination: &Path,
        ui: &Ui,
    ) -> Result<ExtractSummary, SzipError> {
        fs::create_dir_all(destination).map_err(|e| SzipError::io_at(destination, e))?;
        let mut summary = ExtractSummary::default();
        ui.show_progress_bar(archive.len() as u64, "Extracting");

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let rel = Self::safe_path(file.enclosed_name(), file.name())?;
            let target = destination.join(rel);

            if file.is_dir() {
                fs::create_dir_all(&target).map_err(|e| SzipError::io_at(&target, e))?;
                summary.directories += 1;
                ui.update_progress((i + 1) as u64);
                continue;
            }

            let name = file.name().to_string();
            let mut data = Vec::new();
            let (_, record) = Self::read_verified(&mut file, &name, manifest, &mut data)?;

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| SzipError::io_at(parent, e))?;
            }
            fs::write(&target, &data).map_err(|e| SzipError::io_at(&target, e))?;
            let mtime = FileTime::from_unix_time(
                record.mod_time.timestamp(),
                record.mod_time.timestamp_subsec_nanos(),
            );
            set_file_mtime(&target, mtime).map_err(|e| SzipError::io_at(&target, e))?;

            summary.files += 1;
            summary.bytes += data.len() as u64;
            ui.very_verbose(&format!("wrote {}", target.display()));
            ui.update_progress((i + 1) as u64);
        }
        ui.finish_progress();
        Ok(summary)
    }

    /// Decompress one entry into `out`, requiring its SHA-1 and size to match
    /// the manifest record for the same path.
    fn read_verified<'m, R: Read, W: Write>(
        file: &mut R,
        name: &str,
        manifest: &'m Manifest,
        out: &mut W,
    ) -> Result<(usize, &'m ManifestEntry), SzipError> {
        let index = manifest.position(name).ok_or_else(|| {
            SzipError::integrity(name, format!("`{}` has no manifest record", name))
        })?;
        let record = &manifest.entries()[index];
        let (digest, size) = CryptoEngine::copy_with_sha1(file, out, None, Some(name))?;
        if !CryptoEngine::digests_match(&digest, &record.sha1) || size != record.uncompressed_size
        {
            return Err(SzipError::integrity(
                name,
                format!("hash of `{}` does not match", name),
            ));
        }
        Ok((index, record))
    }

    fn safe_path(enclosed: Option<PathBuf>, name: &str) -> Result<PathBuf, SzipError> {
        enclosed.ok_or_else(|| {
            SzipError::Format(format!("archive entry `{}` escapes the destination", name))
        })
    }
}
