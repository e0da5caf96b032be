//! Backing memory of a heap.
//!
//! An [`Arena`] is a single contiguous range of bytes that only grows. The heap
//! never sees where those bytes come from: a reserved virtual mapping, the real
//! program break, or a plain buffer owned by the arena itself.
//!
//! ```text
//!  base                                   base + len        base + capacity
//!   |                                          |                   |
//!   v                                          v                   v
//!   +-------+---------+-------+----------------+-------------------+
//!   | Block | Payload | Block |    Payload     |   not owned yet   |
//!   +-------+---------+-------+----------------+-------------------+
//!                                              ^
//!                                              +-- break, moved by `grow`
//! ```

use std::ptr::NonNull;

use log::{debug, warn};

use crate::{
    error::{HeapError, Result},
    kernel,
    utils::align,
};

/// A contiguous region of memory that can be extended at its high end.
pub trait Arena {
    /// First byte of the arena. It must not move for the lifetime of the arena.
    fn base(&self) -> NonNull<u8>;

    /// Number of bytes currently owned, starting at [`Arena::base`].
    fn len(&self) -> usize;

    /// Extends the arena by `increment` bytes. On success returns the previous
    /// length, which is the offset where the new bytes start.
    fn grow(&mut self, increment: usize) -> Result<usize>;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arena backed by a virtual address range reserved up front.
///
/// Pages are committed lazily as the break moves forward, so reserving a large
/// capacity is cheap. The reservation is returned to the kernel on drop.
pub struct MappedArena {
    base: NonNull<u8>,
    /// Bytes reserved, multiple of the page size.
    capacity: usize,
    /// Bytes committed (readable and writable), multiple of the page size.
    committed: usize,
    /// Current break, relative to `base`.
    len: usize,
}

impl MappedArena {
    /// Reserves `capacity` bytes (rounded up to the page size) of address space.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HeapError::Reserve { capacity });
        }

        let capacity = align(capacity, kernel::page_size());
        let base = unsafe { kernel::reserve_memory(capacity) }
            .ok_or(HeapError::Reserve { capacity })?;

        debug!("reserved arena {base:p} of {capacity} bytes");

        Ok(Self {
            base,
            capacity,
            committed: 0,
            len: 0,
        })
    }

    /// Bytes reserved for this arena.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Arena for MappedArena {
    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }

    fn grow(&mut self, increment: usize) -> Result<usize> {
        let out_of_memory = HeapError::OutOfMemory { requested: increment };

        let new_len = self.len.checked_add(increment).ok_or(out_of_memory.clone())?;
        if new_len > self.capacity {
            warn!("arena {:p} exhausted: {} + {increment} > {}", self.base, self.len, self.capacity);
            return Err(out_of_memory);
        }

        if new_len > self.committed {
            let target = align(new_len, kernel::page_size()).min(self.capacity);

            unsafe {
                let start = self.base.add(self.committed);

                if !kernel::commit_memory(start, target - self.committed) {
                    warn!("kernel refused to commit {} bytes at {start:p}", target - self.committed);
                    return Err(out_of_memory);
                }
            }

            self.committed = target;
        }

        let prev = self.len;
        self.len = new_len;

        Ok(prev)
    }
}

impl Drop for MappedArena {
    fn drop(&mut self) {
        unsafe { kernel::return_memory(self.base, self.capacity) }
    }
}

/// Arena that grows the real data segment of the process with `sbrk`.
///
/// The arena assumes it is the only one moving the break. If anything else
/// moved it between two growths the heap would no longer be contiguous, so
/// that is treated as a fatal error.
#[cfg(unix)]
pub struct SbrkArena {
    base: NonNull<u8>,
    len: usize,
}

#[cfg(unix)]
impl SbrkArena {
    /// Starts an empty arena at the current program break.
    pub fn new() -> Self {
        let brk = unsafe { kernel::program_break() };

        Self {
            base: NonNull::new(brk).unwrap_or(NonNull::dangling()),
            len: 0,
        }
    }
}

#[cfg(unix)]
impl Default for SbrkArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Arena for SbrkArena {
    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }

    fn grow(&mut self, increment: usize) -> Result<usize> {
        let expected = self.base.as_ptr().wrapping_add(self.len);

        unsafe {
            let observed = kernel::program_break();
            assert_eq!(observed, expected, "program break moved outside of the heap");

            let Some(prev) = kernel::move_break(increment) else {
                warn!("sbrk refused to grow by {increment} bytes");
                return Err(HeapError::OutOfMemory { requested: increment });
            };
            assert_eq!(prev.as_ptr(), expected, "program break moved outside of the heap");
        }

        let prev = self.len;
        self.len += increment;

        Ok(prev)
    }
}

/// Arena over a fixed buffer allocated once when the arena is created.
///
/// It never talks to the kernel after construction, which makes it handy for
/// tests and for embedding a heap inside another allocation.
pub struct FixedArena {
    memory: NonNull<u8>,
    capacity: usize,
    len: usize,
}

impl FixedArena {
    pub fn new(capacity: usize) -> Self {
        let memory = Box::into_raw(vec![0u8; capacity].into_boxed_slice());

        Self {
            // Box never hands out null, even for an empty slice.
            memory: NonNull::new(memory.cast::<u8>()).unwrap_or(NonNull::dangling()),
            capacity,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Arena for FixedArena {
    fn base(&self) -> NonNull<u8> {
        self.memory
    }

    fn len(&self) -> usize {
        self.len
    }

    fn grow(&mut self, increment: usize) -> Result<usize> {
        match self.len.checked_add(increment) {
            Some(new_len) if new_len <= self.capacity => {
                let prev = self.len;
                self.len = new_len;
                Ok(prev)
            }
            _ => Err(HeapError::OutOfMemory { requested: increment }),
        }
    }
}

impl Drop for FixedArena {
    fn drop(&mut self) {
        unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(self.memory.as_ptr(), self.capacity);
            drop(Box::from_raw(slice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn fixed_arena_grows_until_capacity() {
        let mut arena = FixedArena::new(64);

        assert!(arena.is_empty());
        assert_eq!(arena.grow(40), Ok(0));
        assert_eq!(arena.grow(24), Ok(40));
        assert_eq!(arena.len(), 64);
        assert_eq!(arena.grow(1), Err(HeapError::OutOfMemory { requested: 1 }));
        assert_eq!(arena.len(), 64);
    }

    #[test]
    fn mapped_arena_commits_pages_lazily() {
        let page = kernel::page_size();
        let mut arena = MappedArena::with_capacity(page * 3).unwrap();

        assert_eq!(arena.capacity(), page * 3);
        assert_eq!(arena.grow(10), Ok(0));
        assert_eq!(arena.committed, page);

        assert_eq!(arena.grow(page), Ok(10));
        assert_eq!(arena.committed, page * 2);

        unsafe {
            let last = arena.base().add(arena.len() - 1);
            last.as_ptr().write(7);
            assert_eq!(last.as_ptr().read(), 7);
        }

        assert!(arena.grow(page * 2).is_err());
        assert_eq!(arena.len(), page + 10);
    }

    #[test]
    fn mapped_arena_rejects_empty_reservation() {
        assert_eq!(
            MappedArena::with_capacity(0).err(),
            Some(HeapError::Reserve { capacity: 0 })
        );
    }

    #[cfg(unix)]
    #[test]
    #[ignore = "moves the real program break, which the test harness shares"]
    fn sbrk_arena_extends_the_break() {
        let mut arena = SbrkArena::new();

        assert_eq!(arena.grow(128), Ok(0));
        assert_eq!(arena.grow(64), Ok(128));

        unsafe {
            let brk = kernel::program_break();
            assert_eq!(brk, arena.base().as_ptr().add(192));
        }
    }

    #[cfg(unix)]
    #[test]
    #[should_panic(expected = "program break moved")]
    fn foreign_break_move_is_fatal() {
        let mut arena = SbrkArena::new();
        let _ = arena.grow(128);

        let _ = unsafe { kernel::move_break(4096) };

        let _ = arena.grow(64);
    }
}
