/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Per-file integrity manifest.
//!
//! Each file of the archive is described by one `<meta>` record:
//! ```text
//! <meta>
//!   <name>docs/readme.txt</name>
//!   <size>
//!     <original_size>2</original_size>
//!   </size>
//!   <mod_time>2024-05-01T10:00:00Z</mod_time>
//!   <sha1_hash>c22b5f9178342609428d6f51b2c5af4c0bde6a42</sha1_hash>
//! </meta>
//! ```
//! Records follow archive traversal order; lookups go by path.

use crate::error::SzipError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;

const RECORD_OPEN: &str = "<meta>";
const RECORD_CLOSE: &str = "</meta>";

/// Integrity record of one archived file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Forward-slash path relative to the packed root
    pub path: String,
    pub uncompressed_size: u64,
    pub mod_time: DateTime<Utc>,
    /// Lowercase hex SHA-1 of the uncompressed bytes
    pub sha1: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the record for `path`: an exact match wins, otherwise the
    /// first case-insensitive match.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path).or_else(|| {
            let wanted = path.to_lowercase();
            self.entries
                .iter()
                .position(|e| e.path.to_lowercase() == wanted)
        })
    }

    pub fn find(&self, path: &str) -> Option<&ManifestEntry> {
        self.position(path).map(|i| &self.entries[i])
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 220);
        for entry in &self.entries {
            write_record(&mut out, entry);
        }
        out
    }

    /// Decode manifest text. Parsing stops at the first record that is not
    /// complete, so trailing garbage after the last record is ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, SzipError> {
        let text = String::from_utf8_lossy(bytes);
        let mut rest = text.trim_start();
        let mut entries = Vec::new();

        while let Some(after_open) = rest.strip_prefix(RECORD_OPEN) {
            let Some(end) = after_open.find(RECORD_CLOSE) else {
                break;
            };
            entries.push(parse_record(&after_open[..end], entries.len())?);
            rest = after_open[end + RECORD_CLOSE.len()..].trim_start();
        }

        Ok(Self { entries })
    }
}

/// Owned accumulator threaded through the packing traversal.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    entries: Vec<ManifestEntry>,
    seen: HashSet<String>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ManifestEntry) -> Result<(), SzipError> {
        if !self.seen.insert(entry.path.clone()) {
            return Err(SzipError::Format(format!(
                "duplicate manifest path: {}",
                entry.path
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Manifest {
        Manifest {
            entries: self.entries,
        }
    }
}

fn write_record(out: &mut String, entry: &ManifestEntry) {
    out.push_str(RECORD_OPEN);
    out.push('\n');
    out.push_str(&format!("  <name>{}</name>\n", escape(&entry.path)));
    out.push_str("  <size>\n");
    out.push_str(&format!(
        "    <original_size>{}</original_size>\n",
        entry.uncompressed_size
    ));
    out.push_str("  </size>\n");
    out.push_str(&format!(
        "  <mod_time>{}</mod_time>\n",
        entry.mod_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("  <sha1_hash>{}</sha1_hash>\n", entry.sha1));
    out.push_str(RECORD_CLOSE);
    out.push('\n');
}

fn parse_record(body: &str, index: usize) -> Result<ManifestEntry, SzipError> {
    let field = |tag: &str| -> Result<String, SzipError> {
        element_text(body, tag).ok_or_else(|| {
            SzipError::Format(format!("manifest record {} has no <{}>", index, tag))
        })
    };

    let path = unescape(&field("name")?);
    let size_text = field("original_size")?;
    let uncompressed_size = size_text.trim().parse::<u64>().map_err(|_| {
        SzipError::Format(format!("manifest record {}: bad size '{}'", index, size_text))
    })?;
    let time_text = field("mod_time")?;
    let mod_time = DateTime::parse_from_rfc3339(time_text.trim())
        .map_err(|e| {
            SzipError::Format(format!("manifest record {}: bad mod_time: {}", index, e))
        })?
        .with_timezone(&Utc);
    let sha1 = field("sha1_hash")?.trim().to_ascii_lowercase();
    if sha1.len() != 40 || !sha1.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SzipError::Format(format!(
            "manifest record {}: bad sha1_hash '{}'",
            index, sha1
        )));
    }

    Ok(ManifestEntry {
        path,
        uncompressed_size,
        mod_time,
        sha1,
    })
}

fn element_text(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    Some(body[start..start + len].to_string())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;

    fn entry(path: &str) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            uncompressed_size: 2,
            mod_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            sha1: "c22b5f9178342609428d6f51b2c5af4c0bde6a42".to_string(),
        }
    }

    fn manifest(paths: &[&str]) -> Manifest {
        let mut builder = ManifestBuilder::new();
        for p in paths {
            builder.push(entry(p)).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn test_record_format() {
        let xml = manifest(&["hello.txt"]).to_xml();
        assert!(xml.contains("<name>hello.txt</name>"));
        assert!(xml.contains("<original_size>2</original_size>"));
        assert!(xml.contains("<mod_time>2024-05-01T10:00:00Z</mod_time>"));
        assert!(xml.contains("<sha1_hash>c22b5f9178342609428d6f51b2c5af4c0bde6a42</sha1_hash>"));
    }

    #[test]
    fn test_parse_keeps_order_and_escapes() {
        let original = manifest(&["b.txt", "a/<odd> & name.txt", "a/b/c.txt"]);
        let parsed = Manifest::parse(original.to_xml().as_bytes()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.entries()[1].path, "a/<odd> & name.txt");
    }

    #[test]
    fn test_trailing_partial_record_is_end_of_stream() {
        let mut xml = manifest(&["one.txt", "two.txt"]).to_xml();
        xml.push_str("<meta>\n  <name>three.txt</name>\n  <size>");
        let parsed = Manifest::parse(xml.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_trailing_garbage_ignored() {
        let mut xml = manifest(&["one.txt"]).to_xml();
        xml.push_str("\u{0}\u{0}garbage");
        assert_eq!(Manifest::parse(xml.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn test_complete_but_malformed_record_fails() {
        let xml = "<meta><name>x</name><original_size>nope</original_size>\
                   <mod_time>2024-05-01T10:00:00Z</mod_time>\
                   <sha1_hash>c22b5f9178342609428d6f51b2c5af4c0bde6a42</sha1_hash></meta>";
        let err = Manifest::parse(xml.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_accepts_offset_timestamps_and_uppercase_hash() {
        let xml = "  <meta>\n      <name>x.bin</name>\n      <size>\n          \
                   <original_size>7</original_size>\n      </size>\n      \
                   <mod_time>2024-05-01T12:00:00.5+02:00</mod_time>\n      \
                   <sha1_hash>C22B5F9178342609428D6F51B2C5AF4C0BDE6A42</sha1_hash>\n  </meta>\n";
        let parsed = Manifest::parse(xml.as_bytes()).unwrap();
        let e = &parsed.entries()[0];
        assert_eq!(e.uncompressed_size, 7);
        assert_eq!(e.sha1, "c22b5f9178342609428d6f51b2c5af4c0bde6a42");
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(e.mod_time.timestamp(), expected.timestamp());
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let m = manifest(&["Docs/Readme.TXT"]);
        assert!(m.find("docs/readme.txt").is_some());
        assert!(m.find("docs/other.txt").is_none());
    }

    #[test]
    fn test_exact_match_wins_over_case_fold() {
        let m = manifest(&["A.txt", "a.txt"]);
        assert_eq!(m.position("A.txt"), Some(0));
        assert_eq!(m.position("a.txt"), Some(1));
        assert_eq!(m.find("a.txt").unwrap().path, "a.txt");
        assert_eq!(m.position("A.TXT"), Some(0));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut builder = ManifestBuilder::new();
        builder.push(entry("a.txt")).unwrap();
        assert_eq!(builder.push(entry("a.txt")).unwrap_err().kind(), ErrorKind::Format);
    }
}
