//! Reset, halt, and control transfer on the LPC55S69, plus the semihosting
//! command console.

use lpc55_hal as hal;
use updater::{BootTarget, Console, ResetReason, System};

#[cfg(feature = "semihosting")]
use cortex_m_semihosting::hprintln;

// Reset cause bits the boot ROM leaves in PMC AOREG1.
const AOREG1_POR: u32 = 1 << 4;
const AOREG1_PADRESET: u32 = 1 << 5;
const AOREG1_BODRESET: u32 = 1 << 6;
const AOREG1_SYSTEMRESET: u32 = 1 << 7;
const AOREG1_WDTRESET: u32 = 1 << 8;
const AOREG1_SWRRESET: u32 = 1 << 9;
const AOREG1_CAUSES: u32 = 0x3ff0;

pub struct Lpc55System {
    reason: ResetReason,
}

impl Lpc55System {
    /// Read, and clear, the cause of the last reset.  The bits are sticky, and
    /// would otherwise accumulate across resets.
    pub fn new() -> Lpc55System {
        let pmc = unsafe { &*hal::raw::PMC::ptr() };
        let cause = pmc.aoreg1.read().bits();
        pmc.aoreg1.modify(|r, w| unsafe { w.bits(r.bits() & !AOREG1_CAUSES) });

        let reason = if cause & (AOREG1_POR | AOREG1_BODRESET) != 0 {
            ResetReason::PowerOn
        } else if cause & AOREG1_PADRESET != 0 {
            ResetReason::External
        } else if cause & AOREG1_WDTRESET != 0 {
            ResetReason::Watchdog
        } else if cause & (AOREG1_SYSTEMRESET | AOREG1_SWRRESET) != 0 {
            ResetReason::Software
        } else {
            ResetReason::Other
        };
        Lpc55System { reason }
    }
}

impl System for Lpc55System {
    fn reset_reason(&self) -> ResetReason {
        self.reason
    }

    fn reset(&mut self) -> ! {
        cortex_m::peripheral::SCB::sys_reset()
    }

    fn halt(&mut self) -> ! {
        #[cfg(feature = "semihosting")]
        hprintln!("Halted: flash programming failed");
        loop {
            cortex_m::asm::wfi();
        }
    }

    // Chain the image, which has been validated.
    unsafe fn jump(&mut self, target: &BootTarget) -> ! {
        let base = target.base() as u32;
        #[cfg(feature = "semihosting")]
        hprintln!("chain {:x} entry {:x}", base, target.entry());

        #[allow(unused_mut)]
        let mut p = cortex_m::Peripherals::steal();
        p.SCB.vtor.write(base);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        cortex_m::asm::bootload(base as *const u32)
    }
}

/// Command characters typed into the debugger console.
pub struct SemihostConsole;

impl Console for SemihostConsole {
    fn read_byte(&mut self) -> Option<u8> {
        // SYS_READC blocks until the host has a character.
        let c = unsafe { cortex_m_semihosting::syscall!(READC) };
        u8::try_from(c).ok()
    }
}
