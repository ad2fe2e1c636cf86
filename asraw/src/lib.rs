//! AsRaw provides a safe way to view a record as its bytes, and an unsafe
//! way to have this as a mutable view.  This is how fixed records (such as the
//! image descriptor) are moved in and out of flash without a serializer.
//! Generally, this is safe and meaningful for structures that are repr(C) and
//! have no padding.  `as_mut_raw` is only safe in this case.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::{mem, slice};

pub trait AsRaw: Sized {
    fn as_raw(&self) -> &[u8] {
        unsafe {
            slice::from_raw_parts(self as *const _ as *const u8, mem::size_of::<Self>())
        }
    }
}

/// Provide a mutable view into a record.  This is an unsafe trait, because, in
/// general, it isn't safe to interpret arbitrary bytes as another type.
/// However, if the struct is `repr(C)`, and all types used are valid for all
/// possible values, this will be safe.
pub unsafe trait AsMutRaw: Sized {
    fn as_mut_raw(&mut self) -> &mut [u8] {
        unsafe {
            slice::from_raw_parts_mut(self as *mut _ as *mut u8, mem::size_of::<Self>())
        }
    }

    /// Build a record from the front of `bytes`.  Returns None if there are
    /// not enough bytes.
    fn from_raw(bytes: &[u8]) -> Option<Self>
    where
        Self: Default,
    {
        let mut value = Self::default();
        let raw = value.as_mut_raw();
        let src = bytes.get(..raw.len())?;
        raw.copy_from_slice(src);
        Some(value)
    }
}
