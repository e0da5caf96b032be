use std::env;

use crate::{
    error::{HeapError, Result},
    placement::Placement,
};

/// Environment variable holding the placement policy name.
pub const PLACEMENT_VAR: &str = "FITALLOC_PLACEMENT";
/// Environment variable holding the arena reservation, in bytes.
pub const CAPACITY_VAR: &str = "FITALLOC_CAPACITY";
/// Environment variable toggling the statistics report on drop.
pub const REPORT_VAR: &str = "FITALLOC_REPORT";

/// Address space reserved for a heap when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 64 * 1024 * 1024;

/// Settings used to build a [`crate::Heap`] over a [`crate::MappedArena`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    pub placement: Placement,
    /// Upper bound of the arena. Growth past it fails with out of memory.
    pub arena_capacity: usize,
    /// Print [`crate::Stats`] to standard error when the heap is dropped.
    pub report_on_drop: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            placement: Placement::default(),
            arena_capacity: DEFAULT_CAPACITY,
            report_on_drop: true,
        }
    }
}

impl HeapConfig {
    /// Defaults overridden by the `FITALLOC_*` environment variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`HeapConfig::from_env`] but reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(PLACEMENT_VAR) {
            config.placement = value.parse()?;
        }

        if let Some(value) = lookup(CAPACITY_VAR) {
            config.arena_capacity = match value.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => return Err(HeapError::InvalidConfig { key: CAPACITY_VAR, value }),
            };
        }

        if let Some(value) = lookup(REPORT_VAR) {
            config.report_on_drop = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(HeapError::InvalidConfig { key: REPORT_VAR, value }),
            };
        }

        Ok(config)
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn arena_capacity(mut self, capacity: usize) -> Self {
        self.arena_capacity = capacity;
        self
    }

    pub fn report_on_drop(mut self, report: bool) -> Self {
        self.report_on_drop = report;
        self
    }
}
