//! Programmed slot support
//!
//! Reads back what the programmer left in the application slot, decides
//! whether it is a complete image, and produces the target the launcher
//! jumps to.

use core::{cell::RefCell, mem::size_of};

use asraw::{AsMutRaw, AsRaw};
use sha2::{Digest, Sha256};
use storage::{MappedFlash, ReadFlash};

use crate::descriptor::{self, Descriptor, Hash256};
use crate::{Error, Result};

/// The Cortex-M reset vector, sits at the start of the vector table, and so
/// at the start of the image.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct ResetVector {
    pub msp: u32,
    pub reset: u32,
}

impl AsRaw for ResetVector {}
unsafe impl AsMutRaw for ResetVector {}

/// A slot holding a descriptor.  This does not indicate that the image itself
/// is valid, merely that a complete programming pass finished at some point.
/// This holds on to a RefCell to the flash to bind the data to a particular
/// flash.
pub struct Slot<'f, F> {
    flash: &'f RefCell<F>,
    pub descriptor: Descriptor,
    vector: ResetVector,
}

impl<'f, F: ReadFlash> Slot<'f, F> {
    pub fn from_flash(flash: &'f RefCell<F>) -> Result<Slot<'f, F>> {
        let capacity = flash.borrow().capacity();
        if capacity < size_of::<Descriptor>() {
            return Err(Error::InvalidImage);
        }

        let mut raw = [0u8; size_of::<Descriptor>()];
        flash.borrow_mut().read(descriptor::offset(capacity), &mut raw)?;
        let descriptor = Descriptor::from_raw(&raw).ok_or(Error::InvalidImage)?;
        if !descriptor.is_plausible(capacity) || descriptor.image_size() < size_of::<ResetVector>() {
            return Err(Error::InvalidImage);
        }

        let mut raw = [0u8; size_of::<ResetVector>()];
        flash.borrow_mut().read(0, &mut raw)?;
        let vector = ResetVector::from_raw(&raw).ok_or(Error::InvalidImage)?;

        Ok(Slot { flash, descriptor, vector })
    }

    pub fn vector(&self) -> ResetVector {
        self.vector
    }

    /// Validate the image: the vector table must look programmed, and the
    /// image must hash to what the descriptor recorded.
    pub fn validate(&self) -> Result<()> {
        // Blank flash reads as one of these, depending on the part.
        if self.vector.msp == 0 || self.vector.msp == u32::MAX {
            warn!("No stack pointer in vector table");
            return Err(Error::InvalidImage);
        }
        if self.calculate_sha256()? != *self.descriptor.hash() {
            warn!("Hash verification failure");
            return Err(Error::InvalidImage);
        }
        Ok(())
    }

    /// Compute the hash of the image portion of the slot.
    fn calculate_sha256(&self) -> Result<Hash256> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 128];
        let end = self.descriptor.image_size();
        let mut pos = 0;
        while pos < end {
            let todo = (end - pos).min(buffer.len());
            let buf = &mut buffer[0..todo];
            self.flash.borrow_mut().read(pos, buf)?;
            hasher.update(buf);
            pos += todo;
        }
        let mut result = [0u8; 32];
        result.copy_from_slice(hasher.finalize().as_slice());
        Ok(result)
    }
}

/// For mapped flash, the image can be executed in place.
impl<'f, F: ReadFlash + MappedFlash> Slot<'f, F> {
    /// Validate the image, and work out where to jump.  The entry point must
    /// be a thumb address inside the image.
    pub fn boot_target(&self) -> Result<BootTarget> {
        self.validate()?;

        let base = self.flash.borrow().get_base();
        let entry = (self.vector.reset & !1) as usize;
        let image = base..base + self.descriptor.image_size();
        if self.vector.reset & 1 == 0 || !image.contains(&entry) {
            warn!("Reset handler {:#x} outside of image", self.vector.reset);
            return Err(Error::InvalidImage);
        }

        Ok(BootTarget { base, vector: self.vector })
    }
}

/// Somewhere that has been checked to hold a bootable image.  These can only
/// be made by [`Slot::boot_target`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BootTarget {
    base: usize,
    vector: ResetVector,
}

impl BootTarget {
    /// Address of the vector table.
    pub fn base(&self) -> usize {
        self.base
    }

    /// The reset handler, the second word of the vector table.
    pub fn entry(&self) -> usize {
        self.vector.reset as usize
    }

    /// The initial stack pointer, the first word of the vector table.
    pub fn stack_pointer(&self) -> usize {
        self.vector.msp as usize
    }
}
