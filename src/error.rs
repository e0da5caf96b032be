use thiserror::Error;

/// Errors surfaced by the heap and its arenas.
///
/// Only recoverable conditions live here. Double releases and a moved program
/// break are contract violations and abort through `panic!` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("zero-sized allocation requested")]
    ZeroSize,

    #[error("out of memory (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("allocation size overflows: {count} * {size}")]
    SizeOverflow { count: usize, size: usize },

    #[error("address {addr:#x} does not belong to a block of this heap")]
    InvalidAddress { addr: usize },

    #[error("could not reserve an arena of {capacity} bytes")]
    Reserve { capacity: usize },

    #[error("unknown placement policy: {0:?}")]
    UnknownPlacement(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },
}

pub type Result<T> = core::result::Result<T, HeapError>;
