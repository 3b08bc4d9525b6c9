/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{error::SzipError, ui::Ui, BUFFER_SIZE};
use ring::digest;
use std::io::{Read, Write};

pub struct CryptoEngine;

impl CryptoEngine {
    /// Lowercase hex SHA-1, the form stored in manifests.
    pub fn compute_sha1(data: &[u8]) -> String {
        hex::encode(digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data))
    }

    pub fn compute_sha256(data: &[u8]) -> Vec<u8> {
        digest::digest(&digest::SHA256, data).as_ref().to_vec()
    }

    /// Streams `reader` into `writer`, hashing the bytes on the way through.
    ///
    /// Returns the hex SHA-1 of everything read and the number of bytes copied.
    pub fn copy_with_sha1<R: Read, W: Write>(
        reader: &mut R,
        writer: &mut W,
        ui: Option<&Ui>,
        file_path: Option<&str>,
    ) -> Result<(String, u64), SzipError> {
        let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);

        if let (Some(ui), Some(path)) = (ui, file_path) {
            ui.very_verbose(&format!("SHA1: {}", path));
        }

        let mut buf = vec![0u8; BUFFER_SIZE];
        let mut processed = 0u64;
        loop {
            let count = reader.read(&mut buf)?;
            if count == 0 {
                break;
            }
            ctx.update(&buf[..count]);
            writer.write_all(&buf[..count])?;
            processed += count as u64;

            if let Some(ui) = ui {
                if ui.debug && processed % (BUFFER_SIZE as u64 * 16) == 0 {
                    ui.debug(&format!("SHA1: {} bytes", processed));
                }
            }
        }

        Ok((hex::encode(ctx.finish()), processed))
    }

    /// Normalizes a user-supplied fingerprint: strips `:` separators and
    /// surrounding whitespace, lowercases, and requires 40 hex digits.
    pub fn normalize_fingerprint(input: &str) -> Result<String, SzipError> {
        let cleaned: String = input
            .trim()
            .chars()
            .filter(|c| *c != ':')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if cleaned.len() != 40 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SzipError::Config(format!(
                "Fingerprint must be 40 hex characters (SHA-1), got '{}'",
                input
            )));
        }
        Ok(cleaned)
    }

    pub fn digests_match(a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(
            CryptoEngine::compute_sha1(b"hi"),
            "c22b5f9178342609428d6f51b2c5af4c0bde6a42"
        );
    }

    #[test]
    fn copy_hashes_what_it_copies() {
        let data = vec![7u8; BUFFER_SIZE * 2 + 13];
        let mut out = Vec::new();
        let (digest, n) =
            CryptoEngine::copy_with_sha1(&mut data.as_slice(), &mut out, None, None).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(digest, CryptoEngine::compute_sha1(&data));
    }

    #[test]
    fn fingerprints_are_normalized() {
        let colons = "47:C1:0B:01:72:1B:20:D9:45:B6:68:08:15:B6:0B:D2:73:73:FA:05";
        assert_eq!(
            CryptoEngine::normalize_fingerprint(colons).unwrap(),
            "47c10b01721b20d945b6680815b60bd27373fa05"
        );
        assert!(CryptoEngine::normalize_fingerprint("abc").is_err());
        assert!(CryptoEngine::normalize_fingerprint(&"g".repeat(40)).is_err());
    }
}
