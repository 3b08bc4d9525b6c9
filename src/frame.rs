/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Container frame: the signed payload of a `.szp` file.
//!
//! Layout:
//! ```text
//! Offset  Size  Field
//! 0       4     manifest_len (u32 LE) - length of the compressed manifest
//! 4       L     manifest (raw DEFLATE)
//! 4 + L   ...   ZIP archive, byte for byte
//! ```

use crate::error::SzipError;
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use std::io::{Read, Write};

/// Size of the little-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bounds-checked cursor over a frame buffer.
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8], SzipError> {
        if n > self.remaining() {
            return Err(SzipError::Format(format!(
                "frame truncated: need {} bytes at offset {}, {} available",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, SzipError> {
        let bytes = self.read_exact(LENGTH_PREFIX_SIZE)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Everything not consumed yet.
    pub fn rest(self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// Compress the manifest and concatenate it, length-prefixed, with the archive.
pub fn frame(manifest: &[u8], archive: &[u8]) -> Result<Vec<u8>, SzipError> {
    let compressed = deflate(manifest)?;
    let len = u32::try_from(compressed.len()).map_err(|_| {
        SzipError::Format(format!(
            "compressed manifest too large for frame: {} bytes",
            compressed.len()
        ))
    })?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + compressed.len() + archive.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&compressed);
    out.extend_from_slice(archive);
    Ok(out)
}

/// Split a frame into the inflated manifest and the untouched archive bytes.
pub fn unframe(frame: &[u8]) -> Result<(Vec<u8>, &[u8]), SzipError> {
    let mut reader = FrameReader::new(frame);
    let len = reader.read_u32_le()? as usize;
    if len > reader.remaining() {
        return Err(SzipError::Format(format!(
            "manifest length {} exceeds remaining frame size {}",
            len,
            reader.remaining()
        )));
    }
    let manifest = inflate(reader.read_exact(len)?)?;
    Ok((manifest, reader.rest()))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, SzipError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, SzipError> {
    let mut out = Vec::new();
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| SzipError::Format(format!("corrupt compressed manifest: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_frame_layout() {
        let framed = frame(b"<meta></meta>", b"PK\x05\x06archive").unwrap();
        let len = u32::from_le_bytes(framed[..4].try_into().unwrap()) as usize;
        assert!(framed.ends_with(b"PK\x05\x06archive"));
        assert_eq!(framed.len(), 4 + len + 11);
    }

    #[test]
    fn test_unframe_returns_archive_untouched() {
        let framed = frame(b"manifest text", b"zip bytes").unwrap();
        let (manifest, archive) = unframe(&framed).unwrap();
        assert_eq!(manifest, b"manifest text");
        assert_eq!(archive, b"zip bytes");
    }

    #[test]
    fn test_unframe_empty_archive() {
        let framed = frame(b"m", b"").unwrap();
        let (_, archive) = unframe(&framed).unwrap();
        assert!(archive.is_empty());
    }

    #[test]
    fn test_unframe_short_buffer() {
        let err = unframe(&[1, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_unframe_length_exceeds_buffer() {
        let mut framed = vec![0xff, 0xff, 0x00, 0x00];
        framed.extend_from_slice(b"tiny");
        let err = unframe(&framed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_unframe_corrupt_manifest() {
        let mut framed = vec![4, 0, 0, 0];
        framed.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        framed.extend_from_slice(b"archive");
        let err = unframe(&framed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_reader_bounds() {
        let mut reader = FrameReader::new(&[1, 2, 3]);
        assert_eq!(reader.read_exact(2).unwrap(), &[1, 2]);
        assert!(reader.read_u32_le().is_err());
        assert_eq!(reader.remaining(), 1);
    }
}
