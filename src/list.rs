use crate::{
    arena::Arena,
    block::{BLOCK_HEADER_SIZE, Block, BlockRef},
};

/// Handle of a neighbouring block, `None` at either end of the list.
pub(crate) type Link = Option<BlockRef>;

/// Block directory: a doubly linked list of every [`Block`] in the arena,
/// free and used alike, kept in ascending address order.
///
/// ```text
///   head                                                       tail
///    |                                                           |
///    v                                                           v
/// +------+---------+    +------+----+    +------+--------------+
/// | Used | payload | <> | Free |    | <> | Used |   payload    |
/// +------+---------+    +------+----+    +------+--------------+
/// ```
///
/// The nodes themselves live inside the arena, so the list only remembers
/// both ends. Every operation takes the arena the headers are stored in.
pub(crate) struct List {
    head: Link,
    tail: Link,
    len: usize,
}

pub(crate) struct Iter<'a, A: Arena> {
    arena: &'a A,
    current: Link,
    remaining: usize,
}

impl List {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Link {
        self.tail
    }

    /// Appends a new used block of `size` bytes whose header goes at `at`.
    ///
    /// `at` must be the first byte after the current tail's payload (or the
    /// arena base for an empty list) so the address order is preserved.
    pub fn append<A: Arena>(&mut self, arena: &mut A, at: BlockRef, size: usize) {
        Block {
            size,
            prev: self.tail,
            next: None,
            is_free: false,
        }
        .store(arena, at);

        if let Some(tail) = self.tail {
            let mut block = Block::load(arena, tail);
            block.next = Some(at);
            block.store(arena, tail);
        } else {
            self.head = Some(at);
        }

        self.tail = Some(at);
        self.len += 1;
    }

    /// Links `block`, stored at `at`, right after `node`. The links of `block`
    /// are overwritten.
    pub fn insert_after<A: Arena>(&mut self, arena: &mut A, node: BlockRef, at: BlockRef, mut block: Block) {
        let mut current = Block::load(arena, node);

        block.prev = Some(node);
        block.next = current.next;
        block.store(arena, at);

        match current.next {
            Some(next) => {
                let mut next_block = Block::load(arena, next);
                next_block.prev = Some(at);
                next_block.store(arena, next);
            }
            None => self.tail = Some(at),
        }

        current.next = Some(at);
        current.store(arena, node);

        self.len += 1;
    }

    /// Unlinks `node` from the list. Its header is left in place but nothing
    /// points at it anymore.
    pub fn remove<A: Arena>(&mut self, arena: &mut A, node: BlockRef) {
        let block = Block::load(arena, node);

        match block.prev {
            Some(prev) => {
                let mut prev_block = Block::load(arena, prev);
                prev_block.next = block.next;
                prev_block.store(arena, prev);
            }
            None => self.head = block.next,
        }

        match block.next {
            Some(next) => {
                let mut next_block = Block::load(arena, next);
                next_block.prev = block.prev;
                next_block.store(arena, next);
            }
            None => self.tail = block.prev,
        }

        self.len -= 1;
    }

    /// Tells whether `node` is linked into this list, judging by its
    /// neighbours pointing back at it.
    pub fn is_linked<A: Arena>(&self, arena: &A, node: BlockRef) -> bool {
        let fits = |at: BlockRef| {
            at.offset()
                .checked_add(BLOCK_HEADER_SIZE)
                .is_some_and(|end| end <= arena.len())
        };

        if !fits(node) {
            return false;
        }

        let block = Block::load(arena, node);
        if block.size > arena.len() - node.payload_offset() {
            return false;
        }

        let prev_ok = match block.prev {
            Some(prev) => prev < node && Block::load(arena, prev).next == Some(node),
            None => self.head == Some(node),
        };
        let next_ok = match block.next {
            Some(next) => next > node && fits(next) && Block::load(arena, next).prev == Some(node),
            None => self.tail == Some(node),
        };

        prev_ok && next_ok
    }

    pub fn iter<'a, A: Arena>(&self, arena: &'a A) -> Iter<'a, A> {
        Iter {
            arena,
            current: self.head,
            remaining: self.len,
        }
    }
}

impl<'a, A: Arena> Iterator for Iter<'a, A> {
    type Item = (BlockRef, Block);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        let block = Block::load(self.arena, node);

        self.current = block.next;
        self.remaining -= 1;

        Some((node, block))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FixedArena;

    use test_log::test;

    fn grown(arena: &mut FixedArena, list: &mut List, size: usize) -> BlockRef {
        let at = BlockRef::new(arena.grow(BLOCK_HEADER_SIZE + size).unwrap());
        list.append(arena, at, size);
        at
    }

    #[test]
    fn new_list_is_empty() {
        let arena = FixedArena::new(0);
        let list = List::new();

        assert_eq!(list.len(), 0);
        assert_eq!(list.first(), None);
        assert!(list.iter(&arena).next().is_none());
    }

    #[test]
    fn append_keeps_address_order() {
        let mut arena = FixedArena::new(1024);
        let mut list = List::new();

        let a = grown(&mut arena, &mut list, 16);
        let b = grown(&mut arena, &mut list, 8);
        let c = grown(&mut arena, &mut list, 40);

        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(c));

        let order: Vec<_> = list.iter(&arena).map(|(at, _)| at).collect();
        assert_eq!(order, vec![a, b, c]);

        let b_block = Block::load(&arena, b);
        assert_eq!(b_block.prev, Some(a));
        assert_eq!(b_block.next, Some(c));
        assert!(!b_block.is_free);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut arena = FixedArena::new(1024);
        let mut list = List::new();

        let a = grown(&mut arena, &mut list, 16);
        let b = grown(&mut arena, &mut list, 16);
        let c = grown(&mut arena, &mut list, 16);

        list.remove(&mut arena, b);
        assert_eq!(list.len(), 2);
        assert_eq!(Block::load(&arena, a).next, Some(c));
        assert_eq!(Block::load(&arena, c).prev, Some(a));
        assert!(!list.is_linked(&arena, b));

        list.remove(&mut arena, c);
        assert_eq!(list.last(), Some(a));
        list.remove(&mut arena, a);
        assert_eq!(list.len(), 0);
        assert_eq!(list.first(), None);
    }

    #[test]
    fn insert_after_tail_moves_tail() {
        let mut arena = FixedArena::new(1024);
        let mut list = List::new();

        let a = grown(&mut arena, &mut list, 64);
        let at = BlockRef::new(a.offset() + BLOCK_HEADER_SIZE + 16);
        let block = Block {
            size: 64 - 16 - BLOCK_HEADER_SIZE,
            prev: None,
            next: None,
            is_free: true,
        };

        list.insert_after(&mut arena, a, at, block);

        assert_eq!(list.last(), Some(at));
        assert!(list.is_linked(&arena, a));
        assert!(list.is_linked(&arena, at));
        assert_eq!(Block::load(&arena, at).prev, Some(a));
    }
}
