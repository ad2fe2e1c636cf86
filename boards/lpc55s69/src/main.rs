#![no_main]
#![no_std]

#[cfg(feature = "semihosting")]
extern crate panic_semihosting;

#[cfg(feature = "rtt")]
use defmt_rtt as _;
#[cfg(feature = "rtt")]
use panic_probe as _;

use core::cell::RefCell;

use cortex_m_rt::entry;
use embedded_alloc::LlffHeap as Heap;
use lpc55_hal as hal;
use updater::{layout, ImageStore, Lz4, Updater, Workspace};

#[cfg(feature = "semihosting")]
use cortex_m_semihosting::hprintln;

mod flash;
mod system;

use flash::LpcFlash;
use system::{Lpc55System, SemihostConsole};

include!(concat!(env!("OUT_DIR"), "/app_image.rs"));

/// The application, as built to run from the slot.
static APP_IMAGE: &[u8; IMAGE_SIZE] = include_bytes!(concat!(env!("OUT_DIR"), "/app.bin"));

/// The slot the application is decompressed into, and runs from.
const SLOT_BASE: usize = 0x2_0000;
const SLOT_SIZE: usize = 0x2_0000;

const COMPRESS_CAPACITY: usize = layout::compress_bound(IMAGE_SIZE);

const _: () = assert!(
    layout::slot_size(IMAGE_SIZE, flash::PAGE_SIZE) <= SLOT_SIZE,
    "application does not fit in the slot"
);

// lz4_flex allocates its hash table on every compression.
#[global_allocator]
static HEAP: Heap = Heap::empty();
const HEAP_SIZE: usize = layout::COMPRESS_HEAP;

#[entry]
fn main() -> ! {
    // Both are in .bss; the entry macro hands them out as `&'static mut`.
    static mut HEAP_MEM: [u8; HEAP_SIZE] = [0; HEAP_SIZE];
    static mut WORK: Workspace<IMAGE_SIZE, COMPRESS_CAPACITY> = Workspace::new();

    unsafe { HEAP.init(HEAP_MEM.as_mut_ptr() as usize, HEAP_SIZE) }

    let hal = hal::new();
    let mut system = Lpc55System::new();

    let flash = LpcFlash::new(hal.flash.release());
    let slot = match flash.partition(SLOT_BASE, SLOT_SIZE) {
        Ok(slot) => RefCell::new(slot),
        Err(_) => {
            #[cfg(feature = "rtt")]
            defmt::error!("Slot does not fit in flash");
            updater::System::halt(&mut system);
        }
    };

    // A software reset is the execute command, or the application resetting
    // itself.  Either way, go back to the programmed image.
    if let Err(e) = updater::resume(&mut system, &slot) {
        #[cfg(feature = "rtt")]
        defmt::warn!("Not resuming: {:?}", e);
        #[cfg(feature = "semihosting")]
        hprintln!("Not resuming: {:?}", e);
        let _ = e;
    }

    #[cfg(feature = "semihosting")]
    hprintln!("Image: {} bytes, slot at {:#x}", IMAGE_SIZE, SLOT_BASE);

    // The size of the array is the limit, so this can't fail.
    let mut store = match ImageStore::new(APP_IMAGE, WORK) {
        Ok(store) => store,
        Err(_) => updater::System::halt(&mut system),
    };

    let mut updater = Updater::new(&mut store, Lz4, &slot);
    updater::run(&mut system, &mut SemihostConsole, &mut updater)
}
