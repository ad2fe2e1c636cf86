//! Flash styles
//!
//! Various microcontrollers have various types of flash memories available to
//! them.  Each layout here describes the application slot of one of them.

use crate::Result;
use crate::SimFlash;

/// The configuration of a single flash area.
pub struct AreaLayout {
    pub read_size: usize,
    pub write_size: usize,
    pub erase_size: usize,
    pub sectors: usize,
    /// Where the area appears in the memory map.
    pub base: usize,
}

impl AreaLayout {
    pub fn build(&self) -> Result<SimFlash> {
        Ok(SimFlash::new(
            self.read_size,
            self.write_size,
            self.erase_size,
            self.sectors,
        )?
        .with_base(self.base))
    }

    pub fn capacity(&self) -> usize {
        self.erase_size * self.sectors
    }
}

/// Page-style devices.  Based on the LPC55S69, where the application slot
/// starts at 128k.
pub static LPC_SLOT: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 512,
    erase_size: 512,
    sectors: 128 * 2,
    base: 0x2_0000,
};

/// PSoC 6 style.  512 byte rows, which are also the unit of erase.  The
/// application lives in the second half of the 1M main flash.
pub static PSOC6_SLOT: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 512,
    erase_size: 512,
    sectors: 2 * 128,
    base: 0x1008_0000,
};

/// K64-style.
/// These devices have small uniform sectors, and a small write size.
pub static K64_SLOT: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 8,
    erase_size: 4 * 1024,
    sectors: 128 / 4 + 1,
    base: 0x2_0000,
};

/// STM32F4-style.
/// A small number of relatively large sectors.  The sectors are larger than
/// the updater's page buffer, so this layout is not supported, and is used to
/// check that it is rejected.
pub static STM32F_SLOT: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 8,
    erase_size: 128 * 1024,
    sectors: 2,
    base: 0x0802_0000,
};

/// All of the supported layouts.
pub static ALL_SLOTS: [&AreaLayout; 3] = [&LPC_SLOT, &PSOC6_SLOT, &K64_SLOT];

/// An iterator that builds each of the supported flash devices.
pub fn all_flashes() -> impl Iterator<Item = Result<SimFlash>> {
    ALL_SLOTS.iter().map(|layout| layout.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{Flash, MappedFlash, ReadFlash};

    #[test]
    fn layouts_build() {
        for layout in ALL_SLOTS.iter().copied().chain(std::iter::once(&STM32F_SLOT)) {
            let flash = layout.build().unwrap();
            assert_eq!(flash.capacity(), layout.capacity());
            assert_eq!(flash.erase_size(), layout.erase_size);
            assert_eq!(flash.get_base(), layout.base);
        }
        assert_eq!(all_flashes().count(), 3);
    }
}
