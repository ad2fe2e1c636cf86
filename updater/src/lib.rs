//! Compressed self-update for flash microcontrollers.
//!
//! The resident application image is compressed, decompressed again, checked
//! byte for byte against the source image, and then programmed page by page into
//! an application slot, followed by a descriptor that records its length and
//! hash.  After a software reset, the slot is validated and the image is
//! executed in place.
//!
//! The pieces, from the bottom up:
//!
//! - [`codec`]: the compressor contract, and its LZ4 implementation.
//! - [`store`]: the image and its two working buffers.
//! - [`program`]: page-wise erase and write of the slot.
//! - [`descriptor`]: the record marking a slot as holding a complete image.
//! - [`slot`]: reading a programmed slot back and validating it.
//! - [`launch`]: the boot-time resume and control transfer.
//! - [`command`]: the single character command loop sequencing all of the above.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[macro_use]
mod macros;

pub mod codec;
pub mod command;
pub mod descriptor;
pub mod launch;
pub mod layout;
pub mod program;
pub mod slot;
pub mod store;

pub use codec::{Codec, Lz4};
pub use command::{run, Command, Console, Outcome, State, Updater};
pub use descriptor::Descriptor;
pub use launch::{launch, resume, ResetReason, System};
pub use program::{program, ProgramReport, StorageOp};
pub use slot::{BootTarget, ResetVector, Slot};
pub use store::{ImageStore, Verified, Workspace};

pub type Result<T> = core::result::Result<T, Error>;

// Use the error kind to avoid this depending on the particular flash.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A flash read failed.
    Flash(storage::Error),
    /// The compressed image would not fit in the image capacity.
    Compression,
    /// The compressed data could not be decompressed.
    Decompression,
    /// Decompression was asked for before a successful compression.
    NotCompressed,
    /// Decompression worked, but the result is not the image.
    Mismatch,
    /// An erase or write of the slot failed.  Fatal: the slot holds a partial
    /// image.
    Storage {
        page: usize,
        op: StorageOp,
        cause: storage::Error,
    },
    /// The flash geometry does not suit the image.
    Geometry,
    /// The image is larger than the store was built for.
    ImageTooLarge,
    /// The slot does not hold a valid image.
    InvalidImage,
    /// A previous storage failure stopped the updater.
    Halted,
}

impl Error {
    /// Fatal errors stop the updater, rather than returning to the command
    /// loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Halted)
    }
}

/// Convert the flash error into our error type.
impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Flash(e)
    }
}
