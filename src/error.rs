/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Error types and handling for the SZip library.
//! Every failure of a pack, extract or info run surfaces as one `SzipError`.

use std::{fmt, io, path::Path};

/// Comprehensive error type for all container operations.
#[derive(Debug)]
pub enum SzipError {
    /// I/O errors during file operations
    Io(io::Error),
    /// Malformed PEM, PKCS#7, frame, manifest or archive structure
    Format(String),
    /// Certificate or key cannot be used for signing
    Signing(String),
    /// Fingerprint mismatch or signature verification failure
    Trust(String),
    /// An archive entry disagrees with its manifest record
    Integrity { path: String, message: String },
    /// Invalid caller input
    Config(String),
}

/// Flat error category, for callers that only branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    Signing,
    Trust,
    Integrity,
    Config,
}

impl SzipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SzipError::Io(_) => ErrorKind::Io,
            SzipError::Format(_) => ErrorKind::Format,
            SzipError::Signing(_) => ErrorKind::Signing,
            SzipError::Trust(_) => ErrorKind::Trust,
            SzipError::Integrity { .. } => ErrorKind::Integrity,
            SzipError::Config(_) => ErrorKind::Config,
        }
    }

    /// Wraps an I/O error so its message names the file involved.
    pub fn io_at(path: &Path, e: io::Error) -> Self {
        Self::Io(io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    }

    pub fn integrity(path: &str, message: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SzipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SzipError::Io(e) => write!(f, "I/O Error: {}", e),
            SzipError::Format(s) => write!(f, "Format Error: {}", s),
            SzipError::Signing(s) => write!(f, "Signing Error: {}", s),
            SzipError::Trust(s) => write!(f, "Trust Error: {}", s),
            SzipError::Integrity { message, .. } => write!(f, "Integrity Error: {}", message),
            SzipError::Config(s) => write!(f, "Configuration Error: {}", s),
        }
    }
}

impl std::error::Error for SzipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SzipError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SzipError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<zip::result::ZipError> for SzipError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Format(format!("archive: {}", other)),
        }
    }
}

impl From<walkdir::Error> for SzipError {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(Path::to_path_buf);
        let io_err = io::Error::from(e);
        match path {
            Some(p) => Self::io_at(&p, io_err),
            None => Self::Io(io_err),
        }
    }
}

impl From<pem::PemError> for SzipError {
    fn from(e: pem::PemError) -> Self {
        Self::Format(format!("no PEM block found: {}", e))
    }
}

impl From<simple_asn1::ASN1DecodeErr> for SzipError {
    fn from(e: simple_asn1::ASN1DecodeErr) -> Self {
        Self::Format(format!("malformed signed-data structure: {}", e))
    }
}

impl From<simple_asn1::ASN1EncodeErr> for SzipError {
    fn from(e: simple_asn1::ASN1EncodeErr) -> Self {
        Self::Format(format!("ASN.1 encode error: {}", e))
    }
}
