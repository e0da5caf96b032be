//! Splitting and coalescing of blocks.
//!
//! ```text
//!  split(node, size)
//!  +--------+-------------------------------+        +--------+------+--------+----------+
//!  | Header |            payload            |  --->  | Header | size | Header |   rest   |
//!  +--------+-------------------------------+        +--------+------+--------+----------+
//!
//!  coalesce(node)
//!  +--------+------+--------+------+--------+------+        +--------+--------------------------+
//!  |  Free  |      |  node  |      |  Free  |      |  --->  |  Free  |                          |
//!  +--------+------+--------+------+--------+------+        +--------+--------------------------+
//! ```

use log::debug;

use crate::{
    arena::Arena,
    block::{BLOCK_HEADER_SIZE, Block, BlockRef},
    heap::Heap,
};

impl<A: Arena> Heap<A> {
    /// Shrinks `node` to `size` bytes and turns the rest of its payload into a
    /// new free block linked right after it. Returns the new block.
    ///
    /// Callers make sure `node` is bigger than `BLOCK_HEADER_SIZE + size`, so the
    /// remainder always has room for its header.
    pub(crate) fn split(&mut self, node: BlockRef, size: usize) -> BlockRef {
        let mut block = Block::load(&self.arena, node);
        debug_assert!(block.size > BLOCK_HEADER_SIZE + size);

        let rest_at = BlockRef::new(node.payload_offset() + size);
        let rest = Block {
            size: block.size - BLOCK_HEADER_SIZE - size,
            prev: None,
            next: None,
            is_free: true,
        };

        block.size = size;
        block.store(&mut self.arena, node);
        self.blocks.insert_after(&mut self.arena, node, rest_at, rest);

        self.stats.splits += 1;
        self.stats.blocks += 1;

        debug!("split block {:#x}: {size} + {} left at {:#x}", node.offset(), rest.size, rest_at.offset());

        rest_at
    }

    /// Merges `node` with its free neighbours. Returns the block that survives,
    /// which is the previous one when that was free.
    pub(crate) fn coalesce(&mut self, mut node: BlockRef) -> BlockRef {
        self.merge_with_prev(&mut node);
        self.merge_with_next(node);

        node
    }

    /// Tries to merge the given block `node` with the previous one
    /// on the list. This can be performed if that previous block is free.
    pub(crate) fn merge_with_prev(&mut self, node: &mut BlockRef) -> bool {
        let block = Block::load(&self.arena, *node);

        let Some(prev) = block.prev else {
            return false;
        };
        if !Block::load(&self.arena, prev).is_free {
            return false;
        }

        // Unlinking first leaves `prev.next` pointing past `node`.
        self.blocks.remove(&mut self.arena, *node);

        let mut prev_block = Block::load(&self.arena, prev);
        prev_block.size += block.span();
        prev_block.store(&mut self.arena, prev);

        self.absorbed(*node, prev);
        *node = prev;

        true
    }

    /// Tries to merge the given block `node` with the next one on the
    /// list. This can be performed if that next block is free. `node` keeps
    /// its own occupancy.
    pub(crate) fn merge_with_next(&mut self, node: BlockRef) -> bool {
        let Some(next) = Block::load(&self.arena, node).next else {
            return false;
        };

        let next_block = Block::load(&self.arena, next);
        if !next_block.is_free {
            return false;
        }

        self.blocks.remove(&mut self.arena, next);

        let mut block = Block::load(&self.arena, node);
        block.size += next_block.span();
        block.store(&mut self.arena, node);

        self.absorbed(next, node);

        true
    }

    /// Bookkeeping for a block header that just stopped existing.
    fn absorbed(&mut self, gone: BlockRef, survivor: BlockRef) {
        self.stats.coalesces += 1;
        self.stats.blocks -= 1;

        if self.cursor == Some(gone) {
            self.cursor = Some(survivor);
        }

        debug!("coalesced block {:#x} into {:#x}", gone.offset(), survivor.offset());
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        arena::FixedArena,
        block::{BLOCK_HEADER_SIZE, Block, BlockRef},
        heap::Heap,
        placement::Placement,
    };

    use test_log::test;

    fn heap() -> Heap<FixedArena> {
        Heap::with_arena(FixedArena::new(4096), Placement::FirstFit)
    }

    fn node_of(heap: &Heap<FixedArena>, ptr: *mut u8) -> BlockRef {
        BlockRef::from_payload(&heap.arena, ptr).unwrap()
    }

    #[test]
    fn split_conserves_bytes() {
        let mut heap = heap();
        let a = heap.allocate(200).unwrap().as_ptr();
        let node = node_of(&heap, a);
        let before = Block::load(&heap.arena, node).span();

        let rest = heap.split(node, 52);

        let left = Block::load(&heap.arena, node);
        let right = Block::load(&heap.arena, rest);
        assert_eq!(left.span() + right.span(), before);
        assert_eq!(right.size, 200 - BLOCK_HEADER_SIZE - 52);
        assert!(right.is_free);
        assert_eq!(left.next, Some(rest));
        assert_eq!(right.prev, Some(node));
        assert_eq!(heap.stats().splits, 1);
        assert_eq!(heap.stats().blocks, 2);
    }

    #[test]
    fn three_way_coalesce() {
        let mut heap = heap();
        let a = heap.allocate(16).unwrap().as_ptr();
        let b = heap.allocate(16).unwrap().as_ptr();
        let c = heap.allocate(16).unwrap().as_ptr();
        let _guard = heap.allocate(16).unwrap();

        heap.release(a).unwrap();
        heap.release(c).unwrap();
        assert_eq!(heap.stats().coalesces, 0);

        heap.release(b).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.coalesces, 2);
        assert_eq!(stats.blocks, 2);

        let first = Block::load(&heap.arena, BlockRef::new(0));
        assert!(first.is_free);
        assert_eq!(first.size, 16 * 3 + BLOCK_HEADER_SIZE * 2);
    }

    #[test]
    fn cursor_follows_absorbed_block() {
        let mut heap = heap();
        let a = heap.allocate(16).unwrap().as_ptr();
        let b = heap.allocate(16).unwrap().as_ptr();
        let b_node = node_of(&heap, b);
        let a_node = node_of(&heap, a);

        heap.cursor = Some(b_node);
        heap.release(a).unwrap();

        let mut node = b_node;
        let mut block = Block::load(&heap.arena, node);
        block.is_free = true;
        block.store(&mut heap.arena, node);

        assert!(heap.merge_with_prev(&mut node));
        assert_eq!(node, a_node);
        assert_eq!(heap.cursor, Some(a_node));
    }
}
