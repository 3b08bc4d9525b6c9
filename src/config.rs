// SZip Rust - Signed, tamper-evident directory containers
// Copyright (C) 2025 Tiash H Kabir / @MrCarb0n
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Configuration parsing and validation for the SZip CLI.

use crate::{
    error::SzipError, processor::ArtifactProcessor, ui::Ui, verification::TrustPin, APP_BIN_NAME,
};
use clap::ArgMatches;
use std::path::{Path, PathBuf};

pub const DEFAULT_CERT_PATH: &str = "./my.crt";
pub const DEFAULT_KEY_PATH: &str = "./my.key";

/// Execution mode for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Pack a directory into a signed container
    Pack { source: PathBuf },
    /// Verify a container and write its files out
    Extract { destination: PathBuf },
    /// Verify a container and print its manifest
    Info,
}

/// Application configuration parsed from command-line arguments.
#[derive(Debug)]
pub struct Config {
    /// Container to write (pack) or read (extract, info)
    pub container_path: PathBuf,
    /// Execution mode (pack/extract/info)
    pub mode: Mode,
    /// Signer certificate, PEM or DER
    pub cert_path: PathBuf,
    /// Signer private key, PKCS#8 or PKCS#1
    pub key_path: PathBuf,
    /// Fingerprint the container or its signer must match
    pub pin: Option<TrustPin>,
    /// Whether to overwrite an existing container
    pub overwrite: bool,
    /// Whether to suppress non-error output
    pub quiet: bool,
    /// Verbosity level (0 = off, 1 = verbose, 2 = very verbose, 3+ = debug)
    pub verbosity_level: u8,
}

impl Config {
    /// Parse configuration from command-line argument matches.
    pub fn from_matches(matches: &ArgMatches, ui: &Ui) -> Result<Self, SzipError> {
        let quiet = matches.get_flag("quiet");
        let verbosity_level = matches.get_count("verbose");

        let mut config = match matches.subcommand() {
            Some(("pack", sub)) => Self::parse_pack(sub, ui)?,
            Some(("extract", sub)) => Self::parse_extract(sub, ui)?,
            Some(("info", sub)) => Self::parse_read(sub, Mode::Info, ui)?,
            _ => {
                return Err(SzipError::Config(
                    "No subcommand provided. Use 'pack', 'extract' or 'info'.".into(),
                ))
            }
        };
        config.quiet = quiet;
        config.verbosity_level = verbosity_level;
        Ok(config)
    }

    fn parse_pack(matches: &ArgMatches, ui: &Ui) -> Result<Self, SzipError> {
        let source = PathBuf::from(
            matches
                .get_one::<String>("source")
                .ok_or_else(|| SzipError::Config("No source directory specified".into()))?,
        );
        if !source.is_dir() {
            return Err(SzipError::Config(format!(
                "Source directory does not exist: {}",
                source.display()
            )));
        }

        let output = match matches.get_one::<String>("output") {
            Some(out) => PathBuf::from(out),
            None => PathBuf::from(Self::default_name(&source)),
        };
        let container_path = ArtifactProcessor::container_path(&output);
        ui.debug(&format!("Using container path: {}", container_path.display()));

        let cert_path = Self::existing_file(matches, "cert", DEFAULT_CERT_PATH, "Certificate")?;
        let key_path = Self::existing_file(matches, "private_key", DEFAULT_KEY_PATH, "Private key")?;

        Ok(Self {
            container_path,
            mode: Mode::Pack { source },
            cert_path,
            key_path,
            pin: None,
            overwrite: matches.get_flag("overwrite"),
            quiet: false,
            verbosity_level: 0,
        })
    }

    fn parse_extract(matches: &ArgMatches, ui: &Ui) -> Result<Self, SzipError> {
        let mut config = Self::parse_read(matches, Mode::Info, ui)?;
        let destination = match matches.get_one::<String>("destination") {
            Some(d) => PathBuf::from(d),
            None => config
                .container_path
                .file_stem()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(APP_BIN_NAME)),
        };
        ui.debug(&format!("Using destination: {}", destination.display()));
        config.mode = Mode::Extract { destination };
        Ok(config)
    }

    /// Shared parsing for the modes that read an existing container.
    fn parse_read(matches: &ArgMatches, mode: Mode, ui: &Ui) -> Result<Self, SzipError> {
        let container_path = PathBuf::from(
            matches
                .get_one::<String>("container")
                .ok_or_else(|| SzipError::Config("No container specified".into()))?,
        );
        if !container_path.is_file() {
            return Err(SzipError::Config(format!(
                "Container does not exist: {}",
                container_path.display()
            )));
        }
        ui.debug(&format!("Using container: {}", container_path.display()));

        let pin = match (
            matches.get_one::<String>("hash"),
            matches.get_one::<String>("signer_hash"),
        ) {
            (Some(h), _) => Some(TrustPin::container(h)?),
            (None, Some(h)) => Some(TrustPin::signer(h)?),
            (None, None) => None,
        };

        Ok(Self {
            container_path,
            mode,
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            pin,
            overwrite: false,
            quiet: false,
            verbosity_level: 0,
        })
    }

    fn existing_file(
        matches: &ArgMatches,
        id: &str,
        default: &str,
        what: &str,
    ) -> Result<PathBuf, SzipError> {
        let path = PathBuf::from(
            matches
                .get_one::<String>(id)
                .map(String::as_str)
                .unwrap_or(default),
        );
        if !path.is_file() {
            return Err(SzipError::Config(format!(
                "{} file does not exist: {}",
                what,
                path.display()
            )));
        }
        Ok(path)
    }

    /// Container name derived from the source directory, `szip` as fallback.
    fn default_name(source: &Path) -> String {
        source
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| APP_BIN_NAME.to_string())
    }
}
