//! Storage types.
//!
//! A small replacement for the embedded-storage NOR traits.  The offsets here
//! are `usize` and relative to the start of a partition, and errors are a
//! single shared kind so that the updater does not depend on a particular
//! flash driver.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    NotAligned,
    OutOfBounds,
    /// Read of a location that has not been programmed, on devices that can
    /// detect it.
    NotWritten,
    /// Write to a location that has not been erased.
    NotErased,
    /// The device reported a failure of an erase or program command.
    Failed,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Value of a byte after erase, on every device we support.
pub const ERASED: u8 = 0xff;

/// Read only interface into flash.
pub trait ReadFlash {
    /// What is the read size (alignment and size multiple).
    fn read_size(&self) -> usize;
    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()>;
    fn capacity(&self) -> usize;
}

/// Flash that can be written to.
pub trait Flash: ReadFlash {
    /// Write size (alignment and size multiple).
    fn write_size(&self) -> usize;
    /// Erase size (alignment and size multiple).  This is the page.
    fn erase_size(&self) -> usize;

    /// Erase the range `from..to`.  Blocks until the device is done.
    fn erase(&mut self, from: usize, to: usize) -> Result<()>;
    /// Program previously erased flash.  Blocks until the device is done.
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Some kinds of flash can be mapped into memory.  This is needed for XIP
/// devices, and is what allows an image to be executed in place.
pub trait MappedFlash {
    /// Return the base address of this flash partition, as mapped into memory.
    fn get_base(&self) -> usize;
}

// Utilities taken from embedded-storage for validating arguments.
pub fn check_read<T: ReadFlash>(flash: &T, offset: usize, length: usize) -> Result<()> {
    check_slice(flash, flash.read_size(), offset, length)
}

pub fn check_erase<T: Flash>(flash: &T, from: usize, to: usize) -> Result<()> {
    if from > to || to > flash.capacity() {
        return Err(Error::OutOfBounds);
    }
    if from % flash.erase_size() != 0 || to % flash.erase_size() != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}

pub fn check_write<T: Flash>(flash: &T, offset: usize, length: usize) -> Result<()> {
    check_slice(flash, flash.write_size(), offset, length)
}

pub fn check_slice<T: ReadFlash>(
    flash: &T,
    align: usize,
    offset: usize,
    length: usize,
) -> Result<()> {
    if length > flash.capacity() || offset > flash.capacity() - length {
        return Err(Error::OutOfBounds);
    }
    if offset % align != 0 || length % align != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}
