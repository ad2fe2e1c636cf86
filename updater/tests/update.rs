// Full update cycles against simulated flash.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

use simflash::{gen::GenBuilder, styles, Fault, SimFlash};
use updater::layout::{COMPRESS_CAPACITY, IMAGE_SIZE};
use updater::{
    resume, run, BootTarget, Console, Error, ImageStore, Lz4, Outcome, ResetReason, State, System,
    Updater, Workspace,
};

type Store<'a> = ImageStore<'a, IMAGE_SIZE, COMPRESS_CAPACITY>;

/// How the system left the code under test.
#[derive(Debug, PartialEq)]
enum Exit {
    Jump { base: usize, entry: usize },
    Reset,
    Halt,
}

struct TestSystem {
    reason: ResetReason,
}

impl System for TestSystem {
    fn reset_reason(&self) -> ResetReason {
        self.reason
    }
    fn reset(&mut self) -> ! {
        std::panic::panic_any(Exit::Reset)
    }
    fn halt(&mut self) -> ! {
        std::panic::panic_any(Exit::Halt)
    }
    unsafe fn jump(&mut self, target: &BootTarget) -> ! {
        std::panic::panic_any(Exit::Jump { base: target.base(), entry: target.entry() })
    }
}

/// Replays characters, then reports nothing more.  Once empty the loop would
/// spin forever, so every test has to end in an exit.
struct Script(VecDeque<u8>);

impl Console for Script {
    fn read_byte(&mut self) -> Option<u8> {
        match self.0.pop_front() {
            Some(byte) => Some(byte),
            None => panic!("Script ran out"),
        }
    }
}

fn exit_of<T>(f: impl FnOnce() -> T) -> Result<T, Exit> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| *payload.downcast::<Exit>().unwrap())
}

fn boot(reason: ResetReason, flash: &RefCell<SimFlash>) -> Result<updater::Result<()>, Exit> {
    let mut system = TestSystem { reason };
    exit_of(|| resume(&mut system, flash))
}

#[test]
fn update_and_execute() {
    for layout in styles::ALL_SLOTS {
        let img = GenBuilder::default().base(layout.base).seed(3).build().unwrap();
        let mut work = Workspace::new();
        let mut store = Store::new(&img.data, &mut work).unwrap();
        let flash = RefCell::new(layout.build().unwrap());

        // Cold boot, nothing programmed.
        assert_eq!(boot(ResetReason::PowerOn, &flash), Ok(Ok(())));

        let mut updater = Updater::new(&mut store, Lz4, &flash);
        let outcome = updater.step(b'c').unwrap();
        match outcome {
            Some(Outcome::Compressed { bytes }) => assert!(bytes < IMAGE_SIZE),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(updater.step(b'd'), Ok(Some(Outcome::Programmed(_)))));
        assert_eq!(updater.step(b'e'), Ok(Some(Outcome::Reset)));

        assert_eq!(&flash.borrow().contents()[..IMAGE_SIZE], &img.data[..]);

        // The reset from the execute command comes back as a software reset.
        assert_eq!(
            boot(ResetReason::Software, &flash),
            Err(Exit::Jump { base: layout.base, entry: img.entry() as usize })
        );
        // Power cycling goes back to the updater.
        assert_eq!(boot(ResetReason::PowerOn, &flash), Ok(Ok(())));
    }
}

#[test]
fn run_loop_resets() {
    let layout = &styles::LPC_SLOT;
    let img = GenBuilder::default().base(layout.base).build().unwrap();
    let mut work = Workspace::new();
    let mut store = Store::new(&img.data, &mut work).unwrap();
    let flash = RefCell::new(layout.build().unwrap());
    let mut updater = Updater::new(&mut store, Lz4, &flash);

    let mut system = TestSystem { reason: ResetReason::PowerOn };
    // Premature decompress, stray characters, then the real sequence.
    let mut console = Script(b"d\r\nxcde".iter().copied().collect());
    let exit = exit_of(|| run(&mut system, &mut console, &mut updater));
    assert_eq!(exit.err(), Some(Exit::Reset));
    assert_eq!(updater.state(), State::Programmed);

    assert_eq!(
        boot(ResetReason::Software, &flash),
        Err(Exit::Jump { base: layout.base, entry: img.entry() as usize })
    );
}

#[test]
fn run_loop_halts_on_storage_failure() {
    let layout = &styles::LPC_SLOT;
    let img = GenBuilder::default().base(layout.base).build().unwrap();
    let mut work = Workspace::new();
    let mut store = Store::new(&img.data, &mut work).unwrap();
    let mut sim = layout.build().unwrap();
    sim.inject(Fault::Write(40 * 512));
    let flash = RefCell::new(sim);
    let mut updater = Updater::new(&mut store, Lz4, &flash);

    let mut system = TestSystem { reason: ResetReason::PowerOn };
    let mut console = Script(b"cde".iter().copied().collect());
    let exit = exit_of(|| run(&mut system, &mut console, &mut updater));
    assert_eq!(exit.err(), Some(Exit::Halt));
    assert_eq!(updater.state(), State::Halted);

    // The execute command was never reached, and the slot is not bootable.
    assert_eq!(
        boot(ResetReason::Software, &flash),
        Ok(Err(Error::InvalidImage))
    );
}

#[test]
fn failed_update_revokes_old_image() {
    let layout = &styles::LPC_SLOT;
    let old = GenBuilder::default().base(layout.base).seed(10).build().unwrap();
    let new = GenBuilder::default().base(layout.base).seed(11).build().unwrap();
    let flash = RefCell::new(layout.build().unwrap());

    let mut work = Workspace::new();
    let mut store = Store::new(&old.data, &mut work).unwrap();
    let mut updater = Updater::new(&mut store, Lz4, &flash);
    updater.step(b'c').unwrap();
    updater.step(b'd').unwrap();
    assert!(matches!(boot(ResetReason::Software, &flash), Err(Exit::Jump { .. })));

    // A second update dies half way through.
    flash.borrow_mut().inject(Fault::Erase(45 * 512));
    let mut work = Workspace::new();
    let mut store = Store::new(&new.data, &mut work).unwrap();
    let mut updater = Updater::new(&mut store, Lz4, &flash);
    updater.step(b'c').unwrap();
    assert!(updater.step(b'd').unwrap_err().is_fatal());

    // Neither the old nor the partial new image can be started.
    assert_eq!(
        boot(ResetReason::Software, &flash),
        Ok(Err(Error::InvalidImage))
    );
}

#[test]
fn round_trip_many_images() {
    for seed in 0..8 {
        let size = IMAGE_SIZE - seed * 1531;
        let img = GenBuilder::default().size(size).seed(seed).build().unwrap();
        let mut work = Workspace::new();
        let mut store = Store::new(&img.data, &mut work).unwrap();
        store.compress(&Lz4).unwrap();
        let verified = store.decompress(&Lz4).unwrap();
        assert_eq!(verified.as_bytes(), &img.data[..]);
    }
}
