use std::{fmt, str::FromStr};

use crate::{
    arena::Arena,
    block::{Block, BlockRef},
    error::HeapError,
    list::{Link, List},
};

/// Algorithm used to pick a free [`Block`] for a new request.
///
/// All of them walk the whole block list (free and used blocks are
/// interleaved there) and return `None` when nothing fits, which makes
/// the heap grow the arena instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Placement {
    /// First free block big enough, scanning from the lowest address.
    #[default]
    FirstFit,
    /// Smallest free block big enough. Ties go to the lowest address.
    BestFit,
    /// Largest free block, as long as it is big enough. Ties go to the lowest address.
    WorstFit,
    /// Like first fit, but resuming right after the last allocated block and
    /// wrapping around at the end of the list.
    NextFit,
}

impl Placement {
    pub const ALL: [Placement; 4] = [
        Placement::FirstFit,
        Placement::BestFit,
        Placement::WorstFit,
        Placement::NextFit,
    ];

    /// Returns a free block of at least `size` bytes, if any.
    ///
    /// `cursor` is only read by [`Placement::NextFit`]: it is the block the
    /// previous allocation landed on.
    pub(crate) fn find<A: Arena>(self, arena: &A, blocks: &List, cursor: Link, size: usize) -> Link {
        let fits = |block: &Block| block.is_free && block.size >= size;

        match self {
            Placement::FirstFit => blocks
                .iter(arena)
                .find(|(_, block)| fits(block))
                .map(|(at, _)| at),

            Placement::BestFit => {
                let mut best: Option<(BlockRef, usize)> = None;

                for (at, block) in blocks.iter(arena).filter(|(_, block)| fits(block)) {
                    if best.is_none_or(|(_, best_size)| block.size < best_size) {
                        best = Some((at, block.size));
                    }
                }

                best.map(|(at, _)| at)
            }

            Placement::WorstFit => {
                let mut worst: Option<(BlockRef, usize)> = None;

                for (at, block) in blocks.iter(arena).filter(|(_, block)| fits(block)) {
                    if worst.is_none_or(|(_, worst_size)| block.size > worst_size) {
                        worst = Some((at, block.size));
                    }
                }

                worst.map(|(at, _)| at)
            }

            Placement::NextFit => next_fit(arena, blocks, cursor, size),
        }
    }
}

/// Circular scan starting after `cursor`. Every block is visited at most once,
/// the cursor itself being the last one.
fn next_fit<A: Arena>(arena: &A, blocks: &List, cursor: Link, size: usize) -> Link {
    let start = cursor
        .and_then(|at| Block::load(arena, at).next)
        .or(blocks.first())?;

    let mut current = start;
    loop {
        let block = Block::load(arena, current);

        if block.is_free && block.size >= size {
            return Some(current);
        }

        // Wrap around at the end of the list.
        current = block.next.or(blocks.first())?;

        if current == start {
            return None;
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Placement::FirstFit => "first-fit",
            Placement::BestFit => "best-fit",
            Placement::WorstFit => "worst-fit",
            Placement::NextFit => "next-fit",
        };

        f.pad(name)
    }
}

impl FromStr for Placement {
    type Err = HeapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = name
            .strip_suffix("-fit")
            .or_else(|| name.strip_suffix("_fit"))
            .unwrap_or(&name);

        match name {
            "first" => Ok(Placement::FirstFit),
            "best" => Ok(Placement::BestFit),
            "worst" => Ok(Placement::WorstFit),
            "next" => Ok(Placement::NextFit),
            _ => Err(HeapError::UnknownPlacement(s.to_owned())),
        }
    }
}
