//! Sizes shared by the updater and the boards.
//!
//! The reference image is 45728 bytes, programmed into a slot of 512 byte
//! pages.  The board crates use these, with the real image size generated at
//! build time, and check the combination with const assertions.

/// Size of the reference application image.
pub const IMAGE_SIZE: usize = 45_728;

/// Flash page size of the reference part.
pub const PAGE_SIZE: usize = 512;

/// Pages taken by the reference image.
pub const PAGE_COUNT: usize = page_count(IMAGE_SIZE, PAGE_SIZE);

/// Largest erase unit the programmer will buffer.
pub const MAX_PAGE_SIZE: usize = 4096;

/// Number of whole pages needed to hold `len` bytes.
pub const fn page_count(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size)
}

/// Space the LZ4 block encoder needs to be given to compress `len` bytes.
/// It refuses outright to work in anything smaller than its worst case
/// expansion, even when the real output would fit.
pub const fn compress_bound(len: usize) -> usize {
    len + len / 10 + 21
}

/// Working space for compressing the reference image.
pub const COMPRESS_CAPACITY: usize = compress_bound(IMAGE_SIZE);

/// Heap a target must give the LZ4 encoder.  Each compression allocates a
/// hash table: 8 KiB for inputs under 64 KiB, 16 KiB above.  The rest is
/// slack for the allocator.
pub const COMPRESS_HEAP: usize = 32 * 1024;

/// Bytes of slot needed for an image of `len` bytes: its pages plus one page
/// for the descriptor.
pub const fn slot_size(len: usize, page_size: usize) -> usize {
    (page_count(len, page_size) + 1) * page_size
}
