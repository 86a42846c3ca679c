//! Lossless compression of decoded page rasters
//!
//! A compressed page is the source of truth once it exists: the decoded
//! raster is only a disposable copy of it.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::error::CodecError;
use super::types::Pixmap;

pub struct PixelCodec;

impl PixelCodec {
    pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }

    /// Inflate `bytes`, failing unless exactly `expected_len` bytes come out.
    pub fn decompress(bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(expected_len);
        // One byte of slack so an overlong stream is detected instead of truncated
        ZlibDecoder::new(bytes)
            .take(expected_len as u64 + 1)
            .read_to_end(&mut out)?;

        if out.len() != expected_len {
            return Err(CodecError::LengthMismatch {
                expected: expected_len,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

/// Compressed form of a page raster. Immutable once built.
pub struct CompressedPixmap {
    width: u32,
    height: u32,
    raw_len: usize,
    bytes: Box<[u8]>,
}

impl CompressedPixmap {
    pub fn from_pixmap(pixmap: &Pixmap) -> Result<Self, CodecError> {
        let bytes = PixelCodec::compress(&pixmap.pixels)?;
        Ok(Self {
            width: pixmap.width,
            height: pixmap.height,
            raw_len: pixmap.byte_len(),
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Decompress into a fresh raster of the original dimensions.
    pub fn decode(&self) -> Result<Pixmap, CodecError> {
        let pixels = PixelCodec::decompress(&self.bytes, self.raw_len)?;
        Ok(Pixmap {
            width: self.width,
            height: self.height,
            pixels,
        })
    }

    /// Compressed size in bytes
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self) {
        for byte in self.bytes.iter_mut().skip(2) {
            *byte ^= 0x5A;
        }
    }
}

impl std::fmt::Debug for CompressedPixmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedPixmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("raw_len", &self.raw_len)
            .field("compressed_len", &self.bytes.len())
            .finish()
    }
}
