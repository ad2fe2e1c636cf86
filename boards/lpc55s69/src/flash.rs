//! LPC55S6x flash driver.
//!
//! Replacement flash driver from the one in the hal.  This attempts to do a few
//! basic things:
//!
//! - Implement the `storage` ReadFlash, Flash and MappedFlash traits, for a
//!   partition of the internal flash.
//! - Implement a robust read that will return an error instead of busfaulting
//!   on unprogrammed data.
//! - Erase and program whole 512 byte pages, reporting controller failures.
//!
//! To use this driver, you should release the FLASH PAC from the hal's driver.
//!
//!     let flash = hal.flash.release();
//!     let fl = flash::LpcFlash::new(flash);

use core::cell::RefCell;

use hal::raw::FLASH;
use lpc55_hal as hal;
use storage::{Error, Flash, MappedFlash, ReadFlash, Result};

const LPC_FLASH_BASE: usize = 0;
const LPC_FLASH_SIZE: usize = 630 * 1024;

/// The erase and program unit of the controller.
pub const PAGE_SIZE: usize = 512;

/// Data is moved into the page register in rows of this many bytes.
const ROW_SIZE: usize = 16;

// Flash controller commands.
const CMD_ERASE_RANGE: u32 = 4;
const CMD_MARGIN_CHECK: u32 = 6;
const CMD_WRITE: u32 = 8;
const CMD_PROGRAM: u32 = 12;

pub struct LpcFlash {
    raw: RefCell<FLASH>,
}

// Flash for the entire device.
impl LpcFlash {
    pub fn new(raw: FLASH) -> LpcFlash {
        LpcFlash { raw: RefCell::new(raw) }
    }

    pub fn partition(&self, base: usize, length: usize) -> Result<LpcPartition<'_>> {
        LpcPartition::new(self, base, length)
    }
}

// A single flash partition.  References the parent.  Offsets given to the
// traits are relative to the start of the partition.
pub struct LpcPartition<'a> {
    flash: &'a LpcFlash,
    base: usize,
    length: usize,
}

impl<'a> LpcPartition<'a> {
    pub fn new(flash: &'a LpcFlash, base: usize, length: usize) -> Result<Self> {
        if length == 0 || base % PAGE_SIZE != 0 || length % PAGE_SIZE != 0 {
            return Err(Error::NotAligned);
        }
        // No overflow check on the device range, as these are consts.
        let end = base.checked_add(length).ok_or(Error::OutOfBounds)?;
        if base < LPC_FLASH_BASE || end > LPC_FLASH_BASE + LPC_FLASH_SIZE {
            return Err(Error::OutOfBounds);
        }

        Ok(LpcPartition { flash, base, length })
    }
}

impl<'a> ReadFlash for LpcPartition<'a> {
    // We allow arbitrary alignment of reads.
    fn read_size(&self) -> usize {
        1
    }

    fn capacity(&self) -> usize {
        self.length
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        storage::check_read(self, offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        let addr = self.base + offset;

        // Validate that the entire range has been written.  Reading an erased
        // page would fault.
        let end = addr + buf.len();
        let mut bpage = addr & !(PAGE_SIZE - 1);
        let raw = self.flash.raw.borrow();
        while bpage < end {
            if !read_check(&raw, bpage as u32) {
                return Err(Error::NotWritten);
            }
            bpage += PAGE_SIZE;
        }

        // Copy the data.
        let slice = unsafe { core::slice::from_raw_parts(addr as *const u8, buf.len()) };
        buf.copy_from_slice(slice);

        Ok(())
    }
}

impl<'a> Flash for LpcPartition<'a> {
    fn write_size(&self) -> usize {
        PAGE_SIZE
    }

    fn erase_size(&self) -> usize {
        PAGE_SIZE
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<()> {
        storage::check_erase(self, from, to)?;
        if from == to {
            return Ok(());
        }
        let start = (self.base + from) as u32;
        let stop = (self.base + to - 1) as u32;

        let raw = self.flash.raw.borrow();
        raw.starta.write(|w| unsafe { w.bits(start >> 4) });
        raw.stopa.write(|w| unsafe { w.bits(stop >> 4) });
        run_command(&raw, CMD_ERASE_RANGE)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        storage::check_write(self, offset, bytes.len())?;
        let raw = self.flash.raw.borrow();

        for (index, page) in bytes.chunks(PAGE_SIZE).enumerate() {
            let page_addr = (self.base + offset + index * PAGE_SIZE) as u32;

            // Fill the page register a row at a time, then program it.
            for (row, data) in page.chunks(ROW_SIZE).enumerate() {
                for (word, chunk) in data.chunks(4).enumerate() {
                    let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    raw.dataw[word].write(|w| unsafe { w.bits(value) });
                }
                let row_addr = page_addr + (row * ROW_SIZE) as u32;
                raw.starta.write(|w| unsafe { w.bits(row_addr >> 4) });
                run_command(&raw, CMD_WRITE)?;
            }

            raw.starta.write(|w| unsafe { w.bits(page_addr >> 4) });
            run_command(&raw, CMD_PROGRAM)?;
        }
        Ok(())
    }
}

impl<'a> MappedFlash for LpcPartition<'a> {
    fn get_base(&self) -> usize {
        LPC_FLASH_BASE + self.base
    }
}

fn clear_status(flash: &FLASH) {
    flash
        .int_clr_status
        .write(|w| w.done().set_bit().err().set_bit().fail().set_bit().ecc_err().set_bit());
}

/// Issue a command, and wait for it.  Blocks, with no timeout: a controller
/// that never finishes hangs the system.
fn run_command(flash: &FLASH, cmd: u32) -> Result<()> {
    clear_status(flash);
    flash.cmd.write(|w| unsafe { w.bits(cmd) });
    while flash.int_status.read().done().bit_is_clear() {}

    let status = flash.int_status.read();
    let good = status.fail().bit_is_clear() && status.err().bit_is_clear();
    clear_status(flash);

    if good {
        Ok(())
    } else {
        Err(Error::Failed)
    }
}

fn read_check(flash: &FLASH, addr: u32) -> bool {
    flash.starta.write(|w| unsafe { w.bits(addr >> 4) });
    flash.stopa.write(|w| unsafe { w.bits(addr >> 4) });
    run_command(flash, CMD_MARGIN_CHECK).is_ok()
}
