//! # fitalloc
//!
//! A `malloc` style heap over a single contiguous arena that only grows.
//!
//! Every region of the arena, allocated or not, starts with a block header.
//! Headers are chained in address order, so a block always knows its physical
//! neighbours:
//!
//! ```text
//! +--------+---------+--------+------+--------+-----------------+
//! | Header | payload | Header | free | Header |     payload     |   ...   -> break
//! +--------+---------+--------+------+--------+-----------------+
//!     |                 ^  |             ^ |
//!     +-----------------+  +-------------+ +---> next ...
//! ```
//!
//! * Allocating looks for a free block with the configured [`Placement`]
//!   policy, splitting it when it is larger than needed. When nothing fits, a
//!   new block is carved at the end of the arena.
//! * Releasing marks the block free and merges it with free neighbours.
//! * Nothing is returned to the operating system until the heap is dropped.
//!
//! ```rust
//! use fitalloc::{FixedArena, Heap, Placement};
//!
//! let mut heap = Heap::with_arena(FixedArena::new(4096), Placement::BestFit);
//! heap.set_report_on_drop(false);
//!
//! let a = heap.allocate(100).unwrap();
//! let b = heap.zero_allocate(4, 8).unwrap();
//! let a = heap.reallocate(a.as_ptr(), 300).unwrap().unwrap();
//!
//! heap.release(a.as_ptr()).unwrap();
//! heap.release(b.as_ptr()).unwrap();
//!
//! assert_eq!(heap.stats().frees, 2);
//! ```
//!
//! The heap is single threaded. Share it between threads only behind a lock
//! covering the whole heap.

mod arena;
mod block;
mod config;
mod error;
mod heap;
mod kernel;
mod list;
mod placement;
mod region;
mod stats;
mod utils;

#[cfg(unix)]
pub use arena::SbrkArena;
pub use arena::{Arena, FixedArena, MappedArena};
pub use block::BLOCK_HEADER_SIZE;
pub use config::{CAPACITY_VAR, DEFAULT_CAPACITY, HeapConfig, PLACEMENT_VAR, REPORT_VAR};
pub use error::{HeapError, Result};
pub use heap::{BlockInfo, Heap};
pub use placement::Placement;
pub use stats::Stats;
