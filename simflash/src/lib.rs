//! Simulated flash
//!
//! The NOR-type flashes used in microcontrollers differ quite a bit in terms
//! of capabilities provided.  This simulator attempts to capture the parts of
//! that diversity the updater cares about:
//!
//! - Erase sets a whole erase unit (page) to 0xff.
//! - A write unit can only be programmed once between erases.  Writing it
//!   again is an error, rather than the silent AND that real parts do, because
//!   that is always a bug in the caller.
//! - Erase and write must be aligned to, and a multiple of, their sizes.
//!
//! On top of that, every erase and write issued through the `Flash` trait is
//! recorded, and failures can be injected for a given page, so tests can check
//! the order of operations and the behavior when the device fails.

use anyhow::anyhow;
use storage::{Flash, MappedFlash, ReadFlash};

pub mod gen;
pub mod styles;

pub type Result<T> = anyhow::Result<T>;

/// A single operation issued to the flash, in order.  Failed operations are
/// recorded as well.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Op {
    Erase { from: usize, to: usize },
    Write { offset: usize, len: usize },
}

/// An injected device failure.  The operation fails if it touches the given
/// offset.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Fault {
    Erase(usize),
    Write(usize),
}

pub struct SimFlash {
    read_size: usize,
    write_size: usize,
    erase_size: usize,
    data: Vec<u8>,
    /// One entry per write unit, true once programmed since the last erase.
    written: Vec<bool>,
    /// Address this partition pretends to be mapped at.
    base: usize,
    ops: Vec<Op>,
    faults: Vec<Fault>,
}

impl SimFlash {
    pub fn new(
        read_size: usize,
        write_size: usize,
        erase_size: usize,
        sectors: usize,
    ) -> Result<SimFlash> {
        if !read_size.is_power_of_two()
            || !write_size.is_power_of_two()
            || !erase_size.is_power_of_two()
        {
            return Err(anyhow!("Flash sizes must be powers of two"));
        }
        if erase_size % write_size != 0 || write_size % read_size != 0 {
            return Err(anyhow!(
                "Erase size {} must be a multiple of write size {}",
                erase_size,
                write_size
            ));
        }
        if sectors == 0 {
            return Err(anyhow!("Flash must have at least one sector"));
        }
        let capacity = erase_size * sectors;
        Ok(SimFlash {
            read_size,
            write_size,
            erase_size,
            data: vec![storage::ERASED; capacity],
            written: vec![false; capacity / write_size],
            base: 0,
            ops: Vec::new(),
            faults: Vec::new(),
        })
    }

    /// Set the address this partition appears at in the memory map.
    pub fn with_base(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    /// Place data directly into the flash, as a debugger would.  The data is
    /// padded out to the write size, and the pages it covers are erased first.
    /// Nothing is recorded in the operation log.
    pub fn install(&mut self, data: &[u8], offset: usize) -> Result<()> {
        if offset % self.erase_size != 0 {
            return Err(anyhow!("Install offset 0x{:x} is not page aligned", offset));
        }
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| anyhow!("Install of {} bytes at 0x{:x} does not fit", data.len(), offset))?;
        let page_end = end.next_multiple_of(self.erase_size);
        self.raw_erase(offset, page_end);

        let padded_end = end.next_multiple_of(self.write_size);
        self.data[offset..end].copy_from_slice(data);
        for unit in offset / self.write_size..padded_end / self.write_size {
            self.written[unit] = true;
        }
        Ok(())
    }

    /// Make a future operation fail.
    pub fn inject(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    /// The operations issued so far.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// The raw contents of the whole partition.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Is every byte in the range in the erased state?
    pub fn is_erased(&self, from: usize, to: usize) -> bool {
        self.data[from..to].iter().all(|b| *b == storage::ERASED)
    }

    /// Flip bits at a location, as corruption of the stored image would.
    pub fn corrupt(&mut self, offset: usize, mask: u8) {
        self.data[offset] ^= mask;
    }

    fn raw_erase(&mut self, from: usize, to: usize) {
        self.data[from..to].fill(storage::ERASED);
        for unit in from / self.write_size..to / self.write_size {
            self.written[unit] = false;
        }
    }

    fn faulted(&self, op: Op) -> bool {
        self.faults.iter().any(|fault| match (fault, op) {
            (Fault::Erase(at), Op::Erase { from, to }) => (from..to).contains(at),
            (Fault::Write(at), Op::Write { offset, len }) => (offset..offset + len).contains(at),
            _ => false,
        })
    }
}

impl ReadFlash for SimFlash {
    fn read_size(&self) -> usize {
        self.read_size
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> storage::Result<()> {
        storage::check_read(self, offset, bytes.len())?;
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Flash for SimFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase_size(&self) -> usize {
        self.erase_size
    }

    fn erase(&mut self, from: usize, to: usize) -> storage::Result<()> {
        storage::check_erase(self, from, to)?;
        let op = Op::Erase { from, to };
        self.ops.push(op);
        if self.faulted(op) {
            return Err(storage::Error::Failed);
        }
        self.raw_erase(from, to);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> storage::Result<()> {
        storage::check_write(self, offset, bytes.len())?;
        let op = Op::Write { offset, len: bytes.len() };
        self.ops.push(op);
        if self.faulted(op) {
            return Err(storage::Error::Failed);
        }
        let units = offset / self.write_size..(offset + bytes.len()) / self.write_size;
        if units.clone().any(|unit| self.written[unit]) {
            return Err(storage::Error::NotErased);
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        for unit in units {
            self.written[unit] = true;
        }
        Ok(())
    }
}

impl MappedFlash for SimFlash {
    fn get_base(&self) -> usize {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged() -> SimFlash {
        SimFlash::new(1, 512, 512, 8).unwrap()
    }

    #[test]
    fn starts_erased() {
        let mut flash = paged();
        let mut buf = [0u8; 16];
        flash.read(100, &mut buf).unwrap();
        assert_eq!(buf, [0xff; 16]);
        assert!(flash.is_erased(0, 8 * 512));
    }

    #[test]
    fn write_needs_erase() {
        let mut flash = paged();
        let page = [0x5au8; 512];
        flash.write(512, &page).unwrap();
        assert_eq!(flash.write(512, &page), Err(storage::Error::NotErased));

        flash.erase(512, 1024).unwrap();
        flash.write(512, &page).unwrap();
        assert_eq!(&flash.contents()[512..1024], &page[..]);
        assert_eq!(
            flash.ops(),
            &[
                Op::Write { offset: 512, len: 512 },
                Op::Write { offset: 512, len: 512 },
                Op::Erase { from: 512, to: 1024 },
                Op::Write { offset: 512, len: 512 },
            ]
        );
    }

    #[test]
    fn alignment() {
        let mut flash = paged();
        assert_eq!(flash.write(0, &[0u8; 100]), Err(storage::Error::NotAligned));
        assert_eq!(flash.erase(0, 100), Err(storage::Error::NotAligned));
        assert_eq!(flash.erase(0, 9 * 512), Err(storage::Error::OutOfBounds));
        // Rejected arguments never reach the device.
        assert!(flash.ops().is_empty());
    }

    #[test]
    fn small_write_units() {
        let mut flash = SimFlash::new(1, 8, 4096, 2).unwrap();
        flash.write(0, &[1u8; 8]).unwrap();
        flash.write(8, &[2u8; 8]).unwrap();
        assert_eq!(flash.write(0, &[3u8; 16]), Err(storage::Error::NotErased));
    }

    #[test]
    fn injected_faults() {
        let mut flash = paged();
        flash.inject(Fault::Erase(1024));
        flash.inject(Fault::Write(2048 + 17));

        flash.erase(0, 512).unwrap();
        assert_eq!(flash.erase(1024, 1536), Err(storage::Error::Failed));
        flash.erase(2048, 2560).unwrap();
        assert_eq!(flash.write(2048, &[0u8; 512]), Err(storage::Error::Failed));
        // The failed write left the page alone.
        assert!(flash.is_erased(2048, 2560));
        assert_eq!(flash.ops().len(), 4);
    }

    #[test]
    fn install() {
        let mut flash = paged();
        flash.install(&[0x11; 700], 512).unwrap();
        assert_eq!(&flash.contents()[512..1212], &[0x11; 700][..]);
        assert!(flash.is_erased(1212, 1536));
        assert!(flash.ops().is_empty());
        // Installed pages count as written.
        assert_eq!(flash.write(512, &[0u8; 512]), Err(storage::Error::NotErased));

        assert!(flash.install(&[0; 10], 100).is_err());
        assert!(flash.install(&[0; 8 * 512], 512).is_err());
    }

    #[test]
    fn bad_geometry() {
        assert!(SimFlash::new(1, 512, 256, 4).is_err());
        assert!(SimFlash::new(1, 6, 4096, 4).is_err());
        assert!(SimFlash::new(1, 8, 4096, 0).is_err());
    }
}
