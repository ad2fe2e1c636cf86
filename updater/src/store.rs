//! The image store.
//!
//! Holds the resident image and the two buffers an update cycle works
//! through.  The store guarantees that decompression only ever reads what a
//! successful compression wrote in this session, and that nothing reaches the
//! programmer unless it matches the image byte for byte.

use heapless::Vec;

use crate::codec::Codec;
use crate::layout::compress_bound;
use crate::{Error, Result};

/// Room to compress and decompress an image.  `N` is the image capacity, `W`
/// the working space given to the compressor, which must be at least
/// `compress_bound(N)`.
///
/// These are large, and on a target belong in a static: `new` is const, and
/// an empty workspace is all zeros, so it lands in `.bss` and is never
/// built on the stack.
pub struct Workspace<const N: usize, const W: usize> {
    /// Empty unless it holds the complete output of the last compression.
    compressed: Vec<u8, W>,
    decompressed: Vec<u8, N>,
}

impl<const N: usize, const W: usize> Workspace<N, W> {
    pub const fn new() -> Self {
        Workspace {
            compressed: Vec::new(),
            decompressed: Vec::new(),
        }
    }
}

impl<const N: usize, const W: usize> Default for Workspace<N, W> {
    fn default() -> Self {
        Self::new()
    }
}

/// The image, and the workspace it is compressed and decompressed in.
/// Compressed output longer than `N` is still a failure.
pub struct ImageStore<'a, const N: usize, const W: usize> {
    image: &'a [u8],
    work: &'a mut Workspace<N, W>,
}

/// Decompressed data that has been checked against the image.  Only the store
/// can make one, so the programmer can't be handed anything unverified.
pub struct Verified<'s> {
    data: &'s [u8],
}

impl<'s> Verified<'s> {
    pub fn as_bytes(&self) -> &'s [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a, const N: usize, const W: usize> ImageStore<'a, N, W> {
    const WORKSPACE_FITS: () = assert!(W >= compress_bound(N), "compression workspace too small");

    /// Take over a workspace for the image.  Anything the workspace held
    /// from before is discarded.
    pub fn new(image: &'a [u8], work: &'a mut Workspace<N, W>) -> Result<Self> {
        #[allow(clippy::let_unit_value)]
        let () = Self::WORKSPACE_FITS;

        if image.len() > N {
            return Err(Error::ImageTooLarge);
        }
        work.compressed.clear();
        work.decompressed.clear();
        Ok(ImageStore { image, work })
    }

    pub fn image(&self) -> &'a [u8] {
        self.image
    }

    /// Is there compressed data waiting to be decompressed?
    pub fn is_compressed(&self) -> bool {
        !self.work.compressed.is_empty()
    }

    pub fn compressed_len(&self) -> usize {
        self.work.compressed.len()
    }

    /// Compress the image, replacing anything compressed before.  On failure
    /// the compressed buffer is left empty.
    pub fn compress<C: Codec>(&mut self, codec: &C) -> Result<usize> {
        self.work.compressed.clear();
        self.work.compressed
            .resize(W, 0)
            .map_err(|_| Error::Compression)?;

        match codec.compress(self.image, &mut self.work.compressed) {
            Ok(len) if len > 0 && len <= N => {
                self.work.compressed.truncate(len);
                Ok(len)
            }
            _ => {
                self.work.compressed.clear();
                Err(Error::Compression)
            }
        }
    }

    /// Decompress what the last compression produced, and check it against
    /// the image.  Success consumes the compressed data.  Failure keeps it, so
    /// the operation can be retried.
    pub fn decompress<C: Codec>(&mut self, codec: &C) -> Result<Verified<'_>> {
        if self.work.compressed.is_empty() {
            return Err(Error::NotCompressed);
        }

        self.work.decompressed.clear();
        self.work.decompressed
            .resize(N, 0)
            .map_err(|_| Error::Decompression)?;

        let len = match codec.decompress(&self.work.compressed, &mut self.work.decompressed) {
            Ok(len) => len,
            Err(e) => {
                self.work.decompressed.clear();
                return Err(e);
            }
        };

        // The round trip is what decides success, not the codec.
        if len != self.image.len() || &self.work.decompressed[..len] != self.image {
            self.work.decompressed.clear();
            return Err(Error::Mismatch);
        }
        self.work.decompressed.truncate(len);
        self.work.compressed.clear();

        Ok(Verified { data: &self.work.decompressed })
    }
}
