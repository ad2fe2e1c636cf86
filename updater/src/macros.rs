//! Logging.
//!
//! On the device, messages go to `defmt` when that feature is enabled.  On the
//! host they go to the console.  With neither, they vanish, but the arguments
//! are still evaluated so that nothing becomes unused.

#[cfg(feature = "defmt")]
macro_rules! info {
    ($($arg:tt)+) => { defmt::info!($($arg)+) };
}

#[cfg(feature = "defmt")]
macro_rules! warn {
    ($($arg:tt)+) => { defmt::warn!($($arg)+) };
}

#[cfg(feature = "defmt")]
macro_rules! error {
    ($($arg:tt)+) => { defmt::error!($($arg)+) };
}

#[cfg(all(feature = "std", not(feature = "defmt")))]
macro_rules! info {
    ($($arg:tt)+) => { std::println!($($arg)+) };
}

#[cfg(all(feature = "std", not(feature = "defmt")))]
macro_rules! warn {
    ($($arg:tt)+) => { std::eprintln!($($arg)+) };
}

#[cfg(all(feature = "std", not(feature = "defmt")))]
macro_rules! error {
    ($($arg:tt)+) => { std::eprintln!($($arg)+) };
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}
