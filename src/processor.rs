/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Container packing.
//! One traversal of the source tree feeds the ZIP writer and the manifest
//! builder; the archive is then framed with the manifest and signed.

use crate::{
    crypto::CryptoEngine,
    error::SzipError,
    frame,
    keys::KeyChain,
    manifest::{Manifest, ManifestBuilder, ManifestEntry},
    signing::Signer,
    ui::Ui,
    BUFFER_SIZE, CONTAINER_EXTENSION,
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use crc32fast::Hasher as Crc32;
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use walkdir::{DirEntry, WalkDir};
use zip::{
    write::{SimpleFileOptions, ZipWriter},
    CompressionMethod, DateTime as ZipDateTime, ZipArchive,
};

/// Core processor for container packing.
pub struct ArtifactProcessor;

impl ArtifactProcessor {
    /// Pack `source_root` into `<output>.szp`, returning the container path.
    ///
    /// The container is written to a temporary file in the target directory
    /// and renamed into place only once the signed envelope is complete.
    pub fn pack(
        source_root: &Path,
        output: &Path,
        keys: &KeyChain,
        ui: &Ui,
    ) -> Result<PathBuf, SzipError> {
        if !source_root.is_dir() {
            return Err(SzipError::Config(format!(
                "Source is not a directory: {}",
                source_root.display()
            )));
        }
        let container_path = Self::container_path(output);
        let out_dir = match container_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // Listed before the scratch file exists so it never packs itself
        let entries = Self::collect_entries(source_root)?;
        let mut scratch = tempfile::Builder::new()
            .prefix(".szip-")
            .suffix(".zip")
            .tempfile_in(&out_dir)
            .map_err(|e| SzipError::io_at(&out_dir, e))?;
        ui.debug(&format!("Scratch archive: {}", scratch.path().display()));

        let manifest = Self::write_archive(source_root, &entries, scratch.as_file_mut(), ui)?;
        ui.verbose(&format!("Archived {} files", manifest.len()));

        let mut archive_bytes = Vec::new();
        scratch.as_file_mut().rewind()?;
        scratch.as_file_mut().read_to_end(&mut archive_bytes)?;
        Self::verify_zip_integrity(&archive_bytes, &manifest, ui)?;

        let manifest_xml = manifest.to_xml();
        let payload = frame::frame(manifest_xml.as_bytes(), &archive_bytes)?;
        ui.verbose(&format!(
            "Frame: {} byte manifest, {} byte archive",
            manifest_xml.len(),
            archive_bytes.len()
        ));

        let envelope = Signer::sign(&payload, keys, ui)?;

        let mut staged =
            NamedTempFile::new_in(&out_dir).map_err(|e| SzipError::io_at(&out_dir, e))?;
        staged.write_all(envelope.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&container_path)
            .map_err(|e| SzipError::io_at(&container_path, e.error))?;
        scratch.close()?;

        ui.verbose(&format!("Container written: {}", container_path.display()));
        Ok(container_path)
    }

    /// `name` -> `name.szp`; an existing `.szp` extension is kept.
    pub fn container_path(output: &Path) -> PathBuf {
        match output.extension() {
            Some(ext) if ext == CONTAINER_EXTENSION => output.to_path_buf(),
            _ => {
                let mut name = output.as_os_str().to_owned();
                name.push(".");
                name.push(CONTAINER_EXTENSION);
                PathBuf::from(name)
            }
        }
    }

    /// Depth-first listing of `root`, sorted by name within each directory.
    pub fn collect_entries(root: &Path) -> Result<Vec<DirEntry>, SzipError> {
        Ok(WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Writes `entries` into a ZIP stream on `file` and returns the manifest
    /// of the files written.
    pub fn write_archive(
        root: &Path,
        entries: &[DirEntry],
        file: &mut File,
        ui: &Ui,
    ) -> Result<Manifest, SzipError> {
        let mut writer = ZipWriter::new(BufWriter::with_capacity(BUFFER_SIZE, file));
        let mut builder = ManifestBuilder::new();
        ui.show_progress_bar(entries.len() as u64, "Packing");

        for (i, entry) in entries.iter().enumerate() {
            let name = Self::archive_name(root, entry.path())?;
            if entry.file_type().is_dir() {
                ui.very_verbose(&format!("dir  {}/", name));
                let options = SimpleFileOptions::default();
                writer.add_directory(format!("{}/", name), options)?;
            } else {
                let record = Self::add_file(&mut writer, entry.path(), name, ui)?;
                builder.push(record)?;
            }
            ui.update_progress((i + 1) as u64);
        }
        ui.finish_progress();

        writer.finish()?.flush()?;
        Ok(builder.finish())
    }

    /// Compresses one file into the archive, hashing the uncompressed bytes
    /// as they pass through.
    fn add_file<W: Write + Seek>(
        writer: &mut ZipWriter<W>,
        path: &Path,
        name: String,
        ui: &Ui,
    ) -> Result<ManifestEntry, SzipError> {
        let file = File::open(path).map_err(|e| SzipError::io_at(path, e))?;
        let metadata = file.metadata().map_err(|e| SzipError::io_at(path, e))?;
        let mod_time: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| SzipError::io_at(path, e))?
            .into();

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(Self::zip_datetime(&mod_time))
            .unix_permissions(Self::permissions(&metadata));
        writer.start_file(name.clone(), options)?;

        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let (sha1, size) =
            CryptoEngine::copy_with_sha1(&mut reader, writer, Some(ui), Some(name.as_str()))
                .map_err(|e| match e {
                    SzipError::Io(io) => SzipError::io_at(path, io),
                    other => other,
                })?;
        ui.very_verbose(&format!("file {} ({} bytes, sha1 {})", name, size, sha1));

        Ok(ManifestEntry {
            path: name,
            uncompressed_size: size,
            mod_time,
            sha1,
        })
    }

    /// Forward-slash relative name, independent of the host separator.
    pub fn archive_name(root: &Path, path: &Path) -> Result<String, SzipError> {
        let rel = path.strip_prefix(root).map_err(|_| {
            SzipError::Format(format!("{} is outside {}", path.display(), root.display()))
        })?;
        let parts = rel
            .components()
            .map(|c| {
                c.as_os_str().to_str().ok_or_else(|| {
                    SzipError::Format(format!("non UTF-8 path: {}", path.display()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join("/"))
    }

    /// Re-reads the finished archive: CRC-32 of every entry, and a one to
    /// one match between file entries and manifest records.
    fn verify_zip_integrity(
        archive_bytes: &[u8],
        manifest: &Manifest,
        ui: &Ui,
    ) -> Result<(), SzipError> {
        let mut archive = ZipArchive::new(std::io::Cursor::new(archive_bytes))?;
        let mut buf = vec![0u8; BUFFER_SIZE];
        let mut files = 0usize;
        for i in 0..archive.len() {
            let mut f = archive.by_index(i)?;
            let mut hasher = Crc32::new();
            loop {
                let n = f.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let stored = f.crc32();
            let computed = hasher.finalize();
            if stored != computed {
                return Err(SzipError::integrity(
                    f.name(),
                    format!(
                        "CRC mismatch for `{}`: stored={:#010x}, computed={:#010x}",
                        f.name(),
                        stored,
                        computed
                    ),
                ));
            }
            if f.is_dir() {
                continue;
            }
            files += 1;
            match manifest.find(f.name()) {
                Some(m) if m.uncompressed_size == f.size() => {
                    ui.debug(&format!(
                        "{}: {} -> {} bytes",
                        f.name(),
                        f.size(),
                        f.compressed_size()
                    ));
                }
                Some(_) => {
                    return Err(SzipError::integrity(
                        f.name(),
                        format!("size of `{}` changed while packing", f.name()),
                    ))
                }
                None => {
                    return Err(SzipError::integrity(
                        f.name(),
                        format!("`{}` has no manifest record", f.name()),
                    ))
                }
            }
        }
        if files != manifest.len() {
            return Err(SzipError::Format(format!(
                "archive holds {} files but the manifest lists {}",
                files,
                manifest.len()
            )));
        }
        Ok(())
    }

    fn zip_datetime(dt: &DateTime<Utc>) -> ZipDateTime {
        let year = (dt.year().clamp(1980, 2107)) as u16;
        ZipDateTime::from_date_and_time(
            year,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second().min(59) as u8,
        )
        .unwrap_or_default()
    }

    #[cfg(unix)]
    fn permissions(metadata: &fs::Metadata) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o777
    }

    #[cfg(not(unix))]
    fn permissions(_metadata: &fs::Metadata) -> u32 {
        0o644
    }
}
