//! Boot-time resume and control transfer.
//!
//! After a software reset, and before anything else is brought up, the slot
//! is checked and, if it holds a valid image, executed.  Any other reset falls
//! through to the command loop.

use core::cell::RefCell;

use storage::{MappedFlash, ReadFlash};

use crate::slot::{BootTarget, Slot};
use crate::Result;

/// Why the part last came out of reset.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetReason {
    PowerOn,
    /// Requested by software, which is how the execute command restarts.
    Software,
    Watchdog,
    /// Reset pin.
    External,
    Other,
}

/// What the updater needs from the part it runs on.
pub trait System {
    fn reset_reason(&self) -> ResetReason;

    /// Request a system reset.
    fn reset(&mut self) -> !;

    /// Stop, after a fatal error, until something outside resets the part.
    fn halt(&mut self) -> !;

    /// Transfer control to the image.
    ///
    /// # Safety
    ///
    /// The target must hold an executable image for this part.  A
    /// [`BootTarget`] can only come from a validated slot, which is what
    /// [`launch`] relies on.
    unsafe fn jump(&mut self, target: &BootTarget) -> !;
}

/// Execute a validated image.  Never returns.
pub fn launch<S: System>(system: &mut S, target: &BootTarget) -> ! {
    info!(
        "Launching image at {:#x}, entry {:#x}",
        target.base(),
        target.entry()
    );
    // Safety: targets are only made from slots that passed validation.
    unsafe { system.jump(target) }
}

/// Resume the programmed image if this is a software reset.
///
/// Returns `Ok(())` if there was no reason to resume, and an error if there
/// was, but the slot does not hold a valid image.  Does not return at all if
/// the image is launched.
pub fn resume<S, F>(system: &mut S, flash: &RefCell<F>) -> Result<()>
where
    S: System,
    F: ReadFlash + MappedFlash,
{
    let reason = system.reset_reason();
    if reason != ResetReason::Software {
        return Ok(());
    }

    let slot = Slot::from_flash(flash)?;
    let target = slot.boot_target()?;
    launch(system, &target)
}
