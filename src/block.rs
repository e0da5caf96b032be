use std::ptr::{self, NonNull};

use crate::{arena::Arena, list::Link, utils::WORD};

/// Header size of a block. Every block in the arena starts with one of these
/// and its payload comes right after it.
pub const BLOCK_HEADER_SIZE: usize = 32;

/// Value stored in place of a missing link.
const NIL: u64 = u64::MAX;

/// Handle of a block: the offset of its header from the arena base.
///
/// Handles are only ever produced by the heap itself or validated by
/// [`BlockRef::from_payload`], so they always point at a header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(usize);

/// This is the structure of a block. The fields of the block are it's metadata,
/// content is placed after this header.
///
/// ```text
/// +---------------------+ <------+
/// |      size (u64)     |        |
/// +---------------------+        |
/// |      prev (u64)     |        |
/// +---------------------+        | -> Header (BLOCK_HEADER_SIZE)
/// |      next (u64)     |        |
/// +---------------------+        |
/// | is_free (1b) + pad  |        |
/// +---------------------+ <------+
/// |       Content       |        |
/// |         ...         |        | -> Addressable content (`size` bytes)
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Headers sit at any multiple of 4 inside the arena, so they are encoded
/// byte by byte instead of being read as a Rust struct in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Block {
    /// Payload size of the block, a multiple of 4.
    pub size: usize,
    /// Previous block in address order.
    pub prev: Link,
    /// Next block in address order.
    pub next: Link,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
}

impl BlockRef {
    #[inline]
    pub(crate) const fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// Offset of the header from the arena base.
    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }

    /// Offset of the first payload byte from the arena base.
    #[inline]
    pub(crate) fn payload_offset(self) -> usize {
        self.0 + BLOCK_HEADER_SIZE
    }

    /// Address handed to the user for this block.
    #[inline]
    pub(crate) fn payload<A: Arena>(self, arena: &A) -> NonNull<u8> {
        assert!(self.payload_offset() <= arena.len(), "block {:#x} outside the arena", self.0);

        unsafe { arena.base().add(self.payload_offset()) }
    }

    /// Recovers the block that owns the payload at `addr`.
    ///
    /// Only checks that the header would be inside the arena and on a
    /// 4-byte boundary; whether a block actually lives there is up to the
    /// caller to confirm.
    pub(crate) fn from_payload<A: Arena>(arena: &A, addr: *const u8) -> Option<Self> {
        let base = arena.base().as_ptr() as usize;
        let offset = (addr as usize).checked_sub(base)?.checked_sub(BLOCK_HEADER_SIZE)?;

        if offset % WORD != 0 || offset + BLOCK_HEADER_SIZE > arena.len() {
            return None;
        }

        Some(Self(offset))
    }
}

impl Block {
    /// Reads the header stored at `at`.
    pub(crate) fn load<A: Arena>(arena: &A, at: BlockRef) -> Self {
        let mut raw = [0u8; BLOCK_HEADER_SIZE];

        assert!(at.0 + BLOCK_HEADER_SIZE <= arena.len(), "header {:#x} outside the arena", at.0);
        unsafe {
            let src = arena.base().add(at.0);
            ptr::copy_nonoverlapping(src.as_ptr(), raw.as_mut_ptr(), BLOCK_HEADER_SIZE);
        }

        Self::decode(&raw)
    }

    /// Writes this header at `at`.
    pub(crate) fn store<A: Arena>(&self, arena: &mut A, at: BlockRef) {
        let raw = self.encode();

        assert!(at.0 + BLOCK_HEADER_SIZE <= arena.len(), "header {:#x} outside the arena", at.0);
        unsafe {
            let dst = arena.base().add(at.0);
            ptr::copy_nonoverlapping(raw.as_ptr(), dst.as_ptr(), BLOCK_HEADER_SIZE);
        }
    }

    /// Total bytes spanned by the block, header included.
    #[inline]
    pub(crate) fn span(&self) -> usize {
        BLOCK_HEADER_SIZE + self.size
    }

    fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let link = |link: Link| link.map_or(NIL, |b| b.0 as u64);

        let mut raw = [0u8; BLOCK_HEADER_SIZE];
        raw[0..8].copy_from_slice(&(self.size as u64).to_ne_bytes());
        raw[8..16].copy_from_slice(&link(self.prev).to_ne_bytes());
        raw[16..24].copy_from_slice(&link(self.next).to_ne_bytes());
        raw[24] = self.is_free as u8;

        raw
    }

    fn decode(raw: &[u8; BLOCK_HEADER_SIZE]) -> Self {
        let word = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw[at..at + 8]);
            u64::from_ne_bytes(bytes)
        };
        let link = |value: u64| (value != NIL).then(|| BlockRef(value as usize));

        Self {
            size: word(0) as usize,
            prev: link(word(8)),
            next: link(word(16)),
            is_free: raw[24] != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FixedArena;

    #[test]
    fn header_survives_unaligned_offsets() {
        let mut arena = FixedArena::new(256);
        arena.grow(256).unwrap();

        let block = Block {
            size: 100,
            prev: Some(BlockRef::new(4)),
            next: None,
            is_free: true,
        };
        block.store(&mut arena, BlockRef::new(36));

        assert_eq!(Block::load(&arena, BlockRef::new(36)), block);
        assert_eq!(block.span(), 132);
    }

    #[test]
    fn payload_maps_back_to_its_block() {
        let mut arena = FixedArena::new(128);
        arena.grow(128).unwrap();

        let at = BlockRef::new(8);
        let payload = at.payload(&arena);

        assert_eq!(BlockRef::from_payload(&arena, payload.as_ptr()), Some(at));
    }

    #[test]
    fn foreign_payloads_are_rejected() {
        let mut arena = FixedArena::new(128);
        arena.grow(64).unwrap();
        let base = arena.base().as_ptr();

        // Before the first header could fit.
        assert_eq!(BlockRef::from_payload(&arena, base), None);
        // Not a multiple of 4.
        assert_eq!(BlockRef::from_payload(&arena, base.wrapping_add(BLOCK_HEADER_SIZE + 2)), None);
        // Header past the break.
        assert_eq!(BlockRef::from_payload(&arena, base.wrapping_add(100)), None);
        assert_eq!(BlockRef::from_payload(&arena, std::ptr::null()), None);
    }
}
