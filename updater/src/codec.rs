//! Compression.
//!
//! The updater treats the compressor as an external library with a fixed
//! contract:
//!
//! - `compress` writes into `dst` and returns the number of bytes produced.
//!   It fails if the output does not fit in `dst`.  Zero is never a valid
//!   length.
//! - `decompress` is handed exactly the bytes a previous `compress` produced,
//!   and fails on corrupted or truncated input, or output that would not fit
//!   in `dst`.
//!
//! Codecs keep no state between calls.

use crate::{Error, Result};

pub trait Codec {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;
}

/// LZ4 block format, with no framing.  The compressed length has to be
/// carried alongside the data.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4;

impl Codec for Lz4 {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        match lz4_flex::block::compress_into(src, dst) {
            Ok(0) | Err(_) => Err(Error::Compression),
            Ok(len) => Ok(len),
        }
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        if src.is_empty() {
            return Err(Error::Decompression);
        }
        lz4_flex::block::decompress_into(src, dst).map_err(|_| Error::Decompression)
    }
}
