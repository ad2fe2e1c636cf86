//! Image descriptor
//!
//! A slot is only bootable if it ends with a descriptor: a small record giving
//! the image length, the page geometry it was programmed with, and a SHA-256
//! of the image.  The descriptor sits in the last bytes of the last page of the
//! slot, so it can be found without knowing anything about the image.
//!
//! The last page is erased before any image page is touched, and the
//! descriptor is written only after the final image page, so an interrupted
//! or failed update always leaves a slot without a descriptor.
//!
//! +------------------+
//! | image page 0     |  <- vector table
//! | ...              |
//! | image page n-1   |  (tail padded with 0xff)
//! | (unused)         |
//! | last page        |  0xff ... descriptor
//! +------------------+

use core::mem::size_of;

use asraw::{AsMutRaw, AsRaw};
use sha2::{Digest, Sha256};
use storage::{Flash, ERASED};

use crate::layout::{page_count, MAX_PAGE_SIZE};
use crate::program::StorageOp;
use crate::{Error, Result};

/// Marks a descriptor.  "LZUP" when read as little endian bytes.
pub const DESCRIPTOR_MAGIC: u32 = 0x5055_5a4c;

/// The result of a SHA256 hash, appropriate for stack allocation.
pub type Hash256 = [u8; 32];

/// Stored in flash as a C struct.  There is no padding.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct Descriptor {
    magic: u32,
    /// Size of the image, in bytes.
    image_size: u32,
    /// Page size the image was programmed with.
    page_size: u32,
    /// Number of pages holding the image.
    page_count: u32,
    /// SHA-256 of the `image_size` bytes at the start of the slot.
    hash: Hash256,
}

impl AsRaw for Descriptor {}
unsafe impl AsMutRaw for Descriptor {}

impl Descriptor {
    /// Describe an image about to be programmed with the given page size.
    pub fn for_image(image: &[u8], page_size: usize) -> Descriptor {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(Sha256::digest(image).as_slice());
        Descriptor {
            magic: DESCRIPTOR_MAGIC,
            image_size: image.len() as u32,
            page_size: page_size as u32,
            page_count: page_count(image.len(), page_size) as u32,
            hash,
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size as usize
    }

    pub fn page_size(&self) -> usize {
        self.page_size as usize
    }

    pub fn page_count(&self) -> usize {
        self.page_count as usize
    }

    pub fn hash(&self) -> &Hash256 {
        &self.hash
    }

    /// Is this a descriptor at all, and is it consistent with a slot of the
    /// given capacity?  This does not check the hash.
    pub fn is_plausible(&self, capacity: usize) -> bool {
        let page_size = self.page_size();
        if self.magic != DESCRIPTOR_MAGIC || page_size == 0 || self.image_size == 0 {
            return false;
        }
        if self.page_count() != page_count(self.image_size(), page_size) {
            return false;
        }
        // The image pages must end before the page holding the descriptor.
        match self.page_count().checked_add(1).and_then(|n| n.checked_mul(page_size)) {
            Some(end) => end <= capacity,
            None => false,
        }
    }
}

/// Offset of the descriptor in a slot.
pub fn offset(capacity: usize) -> usize {
    capacity - size_of::<Descriptor>()
}

/// Index and offset of the last page of the slot.
fn last_page<F: Flash>(flash: &F) -> Result<(usize, usize)> {
    let page_size = flash.erase_size();
    if page_size == 0 || flash.capacity() < page_size {
        return Err(Error::Geometry);
    }
    let index = flash.capacity() / page_size - 1;
    Ok((index, index * page_size))
}

/// Erase the descriptor, marking the slot as not bootable.
pub fn revoke<F: Flash>(flash: &mut F) -> Result<()> {
    let (index, pos) = last_page(flash)?;
    flash
        .erase(pos, pos + flash.erase_size())
        .map_err(|cause| Error::Storage { page: index, op: StorageOp::Erase, cause })
}

/// Write the descriptor into the (already erased) last page.
pub fn commit<F: Flash>(flash: &mut F, descriptor: &Descriptor) -> Result<()> {
    let page_size = flash.erase_size();
    if page_size > MAX_PAGE_SIZE || page_size < size_of::<Descriptor>() {
        return Err(Error::Geometry);
    }
    let (index, pos) = last_page(flash)?;

    let mut page = [ERASED; MAX_PAGE_SIZE];
    let page = &mut page[..page_size];
    page[page_size - size_of::<Descriptor>()..].copy_from_slice(descriptor.as_raw());

    flash
        .write(pos, page)
        .map_err(|cause| Error::Storage { page: index, op: StorageOp::Write, cause })
}

#[cfg(test)]
mod tests {
    use super::*;
    use simflash::{Fault, Op, SimFlash};
    use storage::ReadFlash;

    #[test]
    fn layout() {
        assert_eq!(size_of::<Descriptor>(), 48);
        assert_eq!(&DESCRIPTOR_MAGIC.to_le_bytes(), b"LZUP");
    }

    #[test]
    fn describe() {
        let image = [0x42u8; 1000];
        let desc = Descriptor::for_image(&image, 512);
        assert_eq!(desc.image_size(), 1000);
        assert_eq!(desc.page_count(), 2);
        assert!(desc.is_plausible(3 * 512));
        // No room for the descriptor page.
        assert!(!desc.is_plausible(2 * 512));

        let other = Descriptor::for_image(&image[..999], 512);
        assert_ne!(desc.hash(), other.hash());

        assert!(!Descriptor::default().is_plausible(1 << 20));
        let mut bad = desc.clone();
        bad.page_count = 3;
        assert!(!bad.is_plausible(1 << 20));
    }

    #[test]
    fn commit_and_revoke() {
        let mut flash = SimFlash::new(1, 512, 512, 8).unwrap();
        let desc = Descriptor::for_image(&[1, 2, 3, 4, 5, 6, 7, 8], 512);

        revoke(&mut flash).unwrap();
        commit(&mut flash, &desc).unwrap();
        assert_eq!(
            flash.ops(),
            &[
                Op::Erase { from: 7 * 512, to: 8 * 512 },
                Op::Write { offset: 7 * 512, len: 512 },
            ]
        );

        let mut back = Descriptor::default();
        flash.read(offset(flash.capacity()), back.as_mut_raw()).unwrap();
        assert_eq!(back, desc);
        assert!(flash.is_erased(7 * 512, offset(flash.capacity())));

        revoke(&mut flash).unwrap();
        assert!(flash.is_erased(7 * 512, 8 * 512));
    }

    #[test]
    fn failures_are_storage_errors() {
        let mut flash = SimFlash::new(1, 512, 512, 8).unwrap();
        flash.inject(Fault::Erase(7 * 512));
        assert_eq!(
            revoke(&mut flash),
            Err(Error::Storage { page: 7, op: StorageOp::Erase, cause: storage::Error::Failed })
        );

        let mut flash = SimFlash::new(1, 512, 512, 8).unwrap();
        flash.inject(Fault::Write(8 * 512 - 1));
        let desc = Descriptor::for_image(&[0; 16], 512);
        assert_eq!(
            commit(&mut flash, &desc),
            Err(Error::Storage { page: 7, op: StorageOp::Write, cause: storage::Error::Failed })
        );
    }

    /// A flash reporting whatever geometry it is given, and refusing all
    /// operations.
    struct Shape {
        erase_size: usize,
        capacity: usize,
    }

    impl ReadFlash for Shape {
        fn read_size(&self) -> usize {
            1
        }
        fn read(&mut self, _offset: usize, _bytes: &mut [u8]) -> storage::Result<()> {
            Err(storage::Error::Failed)
        }
        fn capacity(&self) -> usize {
            self.capacity
        }
    }

    impl Flash for Shape {
        fn write_size(&self) -> usize {
            1
        }
        fn erase_size(&self) -> usize {
            self.erase_size
        }
        fn erase(&mut self, _from: usize, _to: usize) -> storage::Result<()> {
            Err(storage::Error::Failed)
        }
        fn write(&mut self, _offset: usize, _bytes: &[u8]) -> storage::Result<()> {
            Err(storage::Error::Failed)
        }
    }

    #[test]
    fn bad_geometry() {
        let desc = Descriptor::for_image(&[0; 16], 512);

        let mut zero = Shape { erase_size: 0, capacity: 4096 };
        assert_eq!(revoke(&mut zero), Err(Error::Geometry));
        assert_eq!(commit(&mut zero, &desc), Err(Error::Geometry));

        let mut short = Shape { erase_size: 512, capacity: 256 };
        assert_eq!(revoke(&mut short), Err(Error::Geometry));
        assert_eq!(commit(&mut short, &desc), Err(Error::Geometry));
    }
}
