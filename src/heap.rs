use std::ptr::{self, NonNull};

use log::{debug, trace, warn};

use crate::{
    arena::{Arena, MappedArena},
    block::{BLOCK_HEADER_SIZE, Block, BlockRef},
    config::HeapConfig,
    error::{HeapError, Result},
    list::{Link, List},
    placement::Placement,
    stats::Stats,
    utils::align4,
};

/// A general purpose heap over a single growable [`Arena`].
///
/// Every block, free or used, is tracked in one address ordered list. New
/// requests are served from free blocks chosen by the configured
/// [`Placement`]; only when none fits is the arena extended.
///
/// ```text
///          Heap
///   +-----------------+
///   | blocks (head) --+--> +------+------+    +------+----+    +------+------+
///   | cursor ---------+--> | Used |      | <> | Free |    | <> | Used |      |
///   | arena           |    +------+------+    +------+----+    +------+------+
///   +-----------------+    ^ arena base                                      ^ break
/// ```
///
/// The heap is single threaded: every operation takes `&mut self`.
pub struct Heap<A: Arena = MappedArena> {
    pub(crate) arena: A,
    pub(crate) blocks: List,
    /// Last block handed out. Next fit resumes its search right after it.
    pub(crate) cursor: Link,
    placement: Placement,
    pub(crate) stats: Stats,
    report_on_drop: bool,
}

/// Public view of a block, as returned by [`Heap::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block header from the arena base.
    pub offset: usize,
    /// Payload size in bytes.
    pub size: usize,
    pub free: bool,
}

impl Heap<MappedArena> {
    /// Heap with the default [`HeapConfig`].
    pub fn new() -> Result<Self> {
        Self::from_config(&HeapConfig::default())
    }

    /// Heap configured through the `FITALLOC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&HeapConfig::from_env()?)
    }

    pub fn from_config(config: &HeapConfig) -> Result<Self> {
        let arena = MappedArena::with_capacity(config.arena_capacity)?;

        let mut heap = Self::with_arena(arena, config.placement);
        heap.report_on_drop = config.report_on_drop;

        Ok(heap)
    }
}

impl<A: Arena> Heap<A> {
    /// Builds an empty heap on top of `arena`, which must not be used by anyone
    /// else. Anything already inside the arena is left alone.
    pub fn with_arena(arena: A, placement: Placement) -> Self {
        Self {
            arena,
            blocks: List::new(),
            cursor: None,
            placement,
            stats: Stats::default(),
            report_on_drop: true,
        }
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Snapshot of the lifecycle counters.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn arena(&self) -> &A {
        &self.arena
    }

    /// Bytes taken from the arena so far, headers included.
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    /// Whether [`Stats`] get printed to standard error when the heap is dropped.
    pub fn set_report_on_drop(&mut self, report: bool) {
        self.report_on_drop = report;
    }

    /// Every block of the heap, in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.blocks.iter(&self.arena).map(|(at, block)| BlockInfo {
            offset: at.offset(),
            size: block.size,
            free: block.is_free,
        })
    }

    /// Returns the address of a block of at least `size` bytes.
    ///
    /// The granted size is `size` rounded up to a multiple of 4. A zero size is
    /// rejected without touching the heap.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.stats.requested = self.stats.requested.saturating_add(size);

        if size == 0 {
            trace!("[fitalloc] allocate(0) -> rejected");
            return Err(HeapError::ZeroSize);
        }

        let requested = size;
        let size = align4(size).ok_or(HeapError::OutOfMemory { requested })?;

        let node = match self.placement.find(&self.arena, &self.blocks, self.cursor, size) {
            Some(node) => {
                if Block::load(&self.arena, node).size > BLOCK_HEADER_SIZE + size {
                    self.split(node, size);
                }

                self.stats.reuses += 1;
                node
            }
            None => self.grow(size)?,
        };

        let mut block = Block::load(&self.arena, node);
        block.is_free = false;
        block.store(&mut self.arena, node);

        self.cursor = Some(node);
        self.stats.mallocs += 1;

        let addr = node.payload(&self.arena);
        trace!("[fitalloc] allocate({requested}) -> {addr:p} ({} bytes)", block.size);

        Ok(addr)
    }

    /// Gives the block at `ptr` back to the heap, merging it with free neighbours.
    /// A null pointer is ignored.
    ///
    /// # Panics
    ///
    /// If the block is already free.
    pub fn release(&mut self, ptr: *mut u8) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }

        let node = self.block_of(ptr).inspect_err(|_| {
            assert!(!self.was_absorbed(ptr), "double free of {ptr:p}");
        })?;

        let mut block = Block::load(&self.arena, node);
        assert!(!block.is_free, "double free of {ptr:p}");
        block.is_free = true;
        block.store(&mut self.arena, node);

        let node = self.coalesce(node);

        if self.cursor == Some(node) {
            self.cursor = Block::load(&self.arena, node).next;
        }

        self.stats.frees += 1;
        trace!("[fitalloc] release({ptr:p})");

        Ok(())
    }

    /// Allocates room for `count` elements of `size` bytes, all set to zero.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Result<NonNull<u8>> {
        let total = count
            .checked_mul(size)
            .ok_or(HeapError::SizeOverflow { count, size })?;

        let addr = self.allocate(total)?;
        let granted = self.usable_size(addr.as_ptr())?;

        unsafe { ptr::write_bytes(addr.as_ptr(), 0, granted) };

        Ok(addr)
    }

    /// Resizes the block at `ptr` to `size` bytes, keeping its contents up to
    /// the smaller of both sizes.
    ///
    /// A null `ptr` behaves as [`Heap::allocate`]. A zero `size` releases the
    /// block and returns `None`. The block stays where it is whenever it
    /// already fits or can absorb a free successor; otherwise it is moved.
    ///
    /// # Panics
    ///
    /// If the block at `ptr` is free.
    pub fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Result<Option<NonNull<u8>>> {
        if ptr.is_null() {
            return self.allocate(size).map(Some);
        }

        let node = self.block_of(ptr).inspect_err(|_| {
            assert!(!self.was_absorbed(ptr), "reallocate of free block {ptr:p}");
        })?;
        let block = Block::load(&self.arena, node);
        assert!(!block.is_free, "reallocate of free block {ptr:p}");

        if size == 0 {
            self.release(ptr)?;
            return Ok(None);
        }

        let requested = size;
        let size = align4(size).ok_or(HeapError::OutOfMemory { requested })?;

        if block.size >= size {
            if block.size > BLOCK_HEADER_SIZE + size {
                let rest = self.split(node, size);
                self.merge_with_next(rest);
            }

            trace!("[fitalloc] reallocate({ptr:p}, {requested}) -> in place");
            return Ok(Some(node.payload(&self.arena)));
        }

        if let Some(next) = block.next {
            let next_block = Block::load(&self.arena, next);

            if next_block.is_free && block.size + next_block.span() >= size {
                self.merge_with_next(node);

                if Block::load(&self.arena, node).size > BLOCK_HEADER_SIZE + size {
                    self.split(node, size);
                }

                trace!("[fitalloc] reallocate({ptr:p}, {requested}) -> grown into next block");
                return Ok(Some(node.payload(&self.arena)));
            }
        }

        let moved = self.allocate(requested).inspect_err(|err| {
            warn!("[fitalloc] reallocate({ptr:p}, {requested}) failed: {err}");
        })?;

        // The old block is still in use, so both payloads are disjoint.
        unsafe { ptr::copy_nonoverlapping(ptr.cast_const(), moved.as_ptr(), block.size) };
        self.release(ptr)?;

        trace!("[fitalloc] reallocate({ptr:p}, {requested}) -> moved to {moved:p}");

        Ok(Some(moved))
    }

    /// Payload size granted to the live allocation at `ptr`.
    pub fn usable_size(&self, ptr: *const u8) -> Result<usize> {
        let node = self.block_of(ptr)?;
        let block = Block::load(&self.arena, node);

        if block.is_free {
            return Err(HeapError::InvalidAddress { addr: ptr as usize });
        }

        Ok(block.size)
    }

    /// Extends the arena with a new used block of `size` bytes at the end of
    /// the block list.
    fn grow(&mut self, size: usize) -> Result<BlockRef> {
        let increment = BLOCK_HEADER_SIZE
            .checked_add(size)
            .ok_or(HeapError::OutOfMemory { requested: size })?;

        let offset = self.arena.grow(increment).inspect_err(|err| {
            warn!("[fitalloc] could not grow the arena by {increment} bytes: {err}");
        })?;

        let node = BlockRef::new(offset);
        debug_assert_eq!(
            self.blocks
                .last()
                .map_or(0, |tail| tail.offset() + Block::load(&self.arena, tail).span()),
            offset,
            "arena is not contiguous with the last block"
        );

        self.blocks.append(&mut self.arena, node, size);

        self.stats.grows += 1;
        self.stats.blocks += 1;
        self.stats.max_heap += increment;
        debug_assert_eq!(self.stats.blocks, self.blocks.len());

        debug!("[fitalloc] grew arena by {increment} bytes, block at {offset:#x}");

        Ok(node)
    }

    /// Validates `ptr` and returns the block it is the payload of.
    fn block_of(&self, ptr: *const u8) -> Result<BlockRef> {
        BlockRef::from_payload(&self.arena, ptr)
            .filter(|&node| self.blocks.is_linked(&self.arena, node))
            .ok_or_else(|| {
                warn!("[fitalloc] {ptr:p} is not a block of this heap");
                HeapError::InvalidAddress { addr: ptr as usize }
            })
    }

    /// Tells whether `ptr` is the payload of a block that was released and
    /// then merged into the free block in front of it.
    fn was_absorbed(&self, ptr: *const u8) -> bool {
        let Some(node) = BlockRef::from_payload(&self.arena, ptr) else {
            return false;
        };
        let stale = Block::load(&self.arena, node);

        stale.is_free
            && stale.prev.is_some_and(|prev| {
                prev < node
                    && self.blocks.is_linked(&self.arena, prev)
                    && node.offset() < prev.offset() + Block::load(&self.arena, prev).span()
            })
    }

    /// Statistics report printed when the heap is dropped, if enabled.
    pub(crate) fn report(&self) -> Option<String> {
        self.report_on_drop.then(|| format!("\n{}", self.stats))
    }
}

impl<A: Arena> Drop for Heap<A> {
    fn drop(&mut self) {
        if let Some(report) = self.report() {
            eprint!("{report}");
        }
    }
}
