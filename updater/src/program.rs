//! The programmer.
//!
//! Turns a verified image into page sized erase and write operations on the
//! slot.  Each page is erased immediately before it is written, pages go in
//! ascending order, and the first failure stops everything: a partially
//! written slot must never be continued or retried into.

use storage::{Flash, ERASED};

use crate::descriptor::{self, Descriptor};
use crate::layout::{slot_size, MAX_PAGE_SIZE};
use crate::store::Verified;
use crate::{Error, Result};

/// Which operation on a page failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageOp {
    Erase,
    Write,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramReport {
    /// Image pages erased and written.
    pub pages: usize,
    /// Image bytes programmed.
    pub bytes: usize,
}

/// Check that the flash can take an image of `len` bytes plus its
/// descriptor, and return the page size.
pub fn check_geometry<F: Flash>(flash: &F, len: usize) -> Result<usize> {
    let page_size = flash.erase_size();
    let write_size = flash.write_size();
    if page_size == 0 || write_size == 0 || page_size > MAX_PAGE_SIZE || page_size % write_size != 0 {
        return Err(Error::Geometry);
    }
    if slot_size(len, page_size) > flash.capacity() {
        return Err(Error::Geometry);
    }
    Ok(page_size)
}

/// Program the image pages, starting at the beginning of the slot.
pub fn program<F: Flash>(flash: &mut F, image: &Verified) -> Result<ProgramReport> {
    let data = image.as_bytes();
    let page_size = check_geometry(flash, data.len())?;

    let mut pages = 0;
    for (page, chunk) in data.chunks(page_size).enumerate() {
        let pos = page * page_size;

        if let Err(cause) = flash.erase(pos, pos + page_size) {
            error!("Erase of page {} failed", page);
            return Err(Error::Storage { page, op: StorageOp::Erase, cause });
        }

        let written = if chunk.len() == page_size {
            flash.write(pos, chunk)
        } else {
            // The final page of an image that isn't page aligned.  Only the
            // rest of the image is copied, the remainder stays erased.
            let mut last = [ERASED; MAX_PAGE_SIZE];
            last[..chunk.len()].copy_from_slice(chunk);
            flash.write(pos, &last[..page_size])
        };
        if let Err(cause) = written {
            error!("Write of page {} failed", page);
            return Err(Error::Storage { page, op: StorageOp::Write, cause });
        }

        pages += 1;
    }

    Ok(ProgramReport { pages, bytes: data.len() })
}

/// Replace the contents of the slot with the image: revoke the old
/// descriptor, program the image, then write the new descriptor.
pub fn install<F: Flash>(flash: &mut F, image: &Verified) -> Result<ProgramReport> {
    let page_size = check_geometry(flash, image.len())?;
    let descriptor = Descriptor::for_image(image.as_bytes(), page_size);

    descriptor::revoke(flash)?;
    let report = program(flash, image)?;
    descriptor::commit(flash, &descriptor)?;
    Ok(report)
}
