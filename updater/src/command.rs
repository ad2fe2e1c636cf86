//! The command loop.
//!
//! One character selects an action:
//!
//! - `c`: compress the image.
//! - `d`: decompress it, check it against the image, and program the slot.
//! - `e`: reset, so that the programmed image is resumed on the way back up.
//!
//! Anything else is ignored.  Commands are processed one at a time, to
//! completion, including the flash operations.
//!
//! ```text
//!         c              d (verified, programmed)
//!  Idle ------> Compressed ----------------------> Programmed
//!   ^  <------     |  ^                                 |
//!   | c failed     |  | d failed                        | c
//!   |              +--+                                 v
//!   |                                               Compressed
//!   |
//!   +-- any storage failure, from anywhere --> Halted (terminal)
//! ```

use core::cell::RefCell;

use storage::Flash;

use crate::codec::Codec;
use crate::launch::System;
use crate::program::{install, ProgramReport};
use crate::store::ImageStore;
use crate::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Compress,
    Decompress,
    Execute,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            b'c' => Some(Command::Compress),
            b'd' => Some(Command::Decompress),
            b'e' => Some(Command::Execute),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    /// Compressed data is waiting to be decompressed.
    Compressed,
    /// The slot holds the verified image.
    Programmed,
    /// Storage failed.  Nothing more will be done until an external reset.
    Halted,
}

/// What a successful command did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Compressed { bytes: usize },
    Programmed(ProgramReport),
    /// The caller should reset the system.
    Reset,
}

/// Source of command characters.
pub trait Console {
    /// The next character, if one has arrived.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Sequences the image store, the codec and the slot.
pub struct Updater<'u, 'a, F, C, const N: usize, const W: usize> {
    store: &'u mut ImageStore<'a, N, W>,
    codec: C,
    flash: &'u RefCell<F>,
    state: State,
}

impl<'u, 'a, F, C, const N: usize, const W: usize> Updater<'u, 'a, F, C, N, W>
where
    F: Flash,
    C: Codec,
{
    pub fn new(store: &'u mut ImageStore<'a, N, W>, codec: C, flash: &'u RefCell<F>) -> Self {
        Updater {
            store,
            codec,
            flash,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Process one input character.  Characters that are not commands give
    /// `Ok(None)`.
    pub fn step(&mut self, byte: u8) -> Result<Option<Outcome>> {
        match Command::from_byte(byte) {
            Some(command) => self.handle(command).map(Some),
            None => Ok(None),
        }
    }

    pub fn handle(&mut self, command: Command) -> Result<Outcome> {
        if self.state == State::Halted {
            return Err(Error::Halted);
        }
        match command {
            Command::Compress => self.compress(),
            Command::Decompress => self.decompress(),
            Command::Execute => Ok(Outcome::Reset),
        }
    }

    fn compress(&mut self) -> Result<Outcome> {
        info!("Compressing {} byte image", self.store.image().len());
        match self.store.compress(&self.codec) {
            Ok(bytes) => {
                info!("Compressed to {} bytes", bytes);
                self.state = State::Compressed;
                Ok(Outcome::Compressed { bytes })
            }
            Err(e) => {
                warn!("Compression failed");
                self.state = State::Idle;
                Err(e)
            }
        }
    }

    fn decompress(&mut self) -> Result<Outcome> {
        let image = match self.store.decompress(&self.codec) {
            Ok(image) => image,
            Err(Error::Mismatch) => {
                warn!("Decompressed image differs from the source image");
                return Err(Error::Mismatch);
            }
            Err(e) => {
                warn!("Decompression failed: {:?}", e);
                return Err(e);
            }
        };
        info!("Decompressed image matches the source image");

        // The compressed data is consumed at this point, whatever happens.
        let result = install(&mut *self.flash.borrow_mut(), &image);
        match result {
            Ok(report) => {
                info!("Programmed {} pages", report.pages);
                self.state = State::Programmed;
                Ok(Outcome::Programmed(report))
            }
            Err(e) if e.is_fatal() => {
                error!("Flash programming failed: {:?}", e);
                self.state = State::Halted;
                Err(e)
            }
            Err(e) => {
                warn!("Unable to program: {:?}", e);
                self.state = State::Idle;
                Err(e)
            }
        }
    }
}

/// Print the available commands.
pub fn banner() {
    info!("Compressed image update");
    info!("Available commands");
    info!("c : Compress the application image");
    info!("d : Decompress the application image and store it in flash");
    info!("e : Execute the decompressed application image");
}

/// Run the command loop forever.  Only leaves by reset, either requested by
/// the execute command, or after a storage failure halts the system.
pub fn run<S, K, F, C, const N: usize, const W: usize>(
    system: &mut S,
    console: &mut K,
    updater: &mut Updater<'_, '_, F, C, N, W>,
) -> !
where
    S: System,
    K: Console,
    F: Flash,
    C: Codec,
{
    banner();
    loop {
        let Some(byte) = console.read_byte() else {
            continue;
        };
        match updater.step(byte) {
            Ok(Some(Outcome::Reset)) => {
                info!("Resetting to execute");
                system.reset();
            }
            Ok(_) => (),
            Err(e) if e.is_fatal() => {
                error!("Halting: {:?}", e);
                system.halt();
            }
            // Already reported; wait for the operator.
            Err(_) => (),
        }
    }
}
