//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

/// Granularity of every block payload handed out by the heap.
pub const WORD: usize = 4;

/// It aligns `to_be_aligned` using `aligment`, which must be a power of two.
///
/// This method is used to align arena commits to be a multiple of the page size
/// and block payloads to be a multiple of [`WORD`].
pub fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Rounds `size` up to the next multiple of 4. Returns `None` on overflow.
#[inline]
pub fn align4(size: usize) -> Option<usize> {
    size.checked_add(WORD - 1).map(|s| s & !(WORD - 1))
}
