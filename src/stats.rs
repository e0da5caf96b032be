use std::fmt;

/// Lifecycle counters of a heap.
///
/// The [`fmt::Display`] output is the report printed when the heap goes away:
///
/// ```text
/// heap management statistics
/// mallocs:	3
/// frees:	1
/// ...
/// max heap:	1248
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Successful allocations, including the ones done on behalf of
    /// zero-allocate and reallocate.
    pub mallocs: usize,
    /// Blocks released.
    pub frees: usize,
    /// Allocations served by an existing free block.
    pub reuses: usize,
    /// Times the arena was extended.
    pub grows: usize,
    pub splits: usize,
    pub coalesces: usize,
    /// Blocks currently in the directory, free or not.
    pub blocks: usize,
    /// Sum of every size asked to `allocate`, before rounding.
    pub requested: usize,
    /// Bytes taken from the arena, headers included. Never decreases.
    pub max_heap: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "heap management statistics")?;
        writeln!(f, "mallocs:\t{}", self.mallocs)?;
        writeln!(f, "frees:\t{}", self.frees)?;
        writeln!(f, "reuses:\t{}", self.reuses)?;
        writeln!(f, "grows:\t{}", self.grows)?;
        writeln!(f, "splits:\t{}", self.splits)?;
        writeln!(f, "coalesces:\t{}", self.coalesces)?;
        writeln!(f, "blocks:\t{}", self.blocks)?;
        writeln!(f, "requested:\t{}", self.requested)?;
        writeln!(f, "max heap:\t{}", self.max_heap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_format() {
        let stats = Stats {
            mallocs: 3,
            frees: 2,
            reuses: 1,
            grows: 2,
            splits: 1,
            coalesces: 1,
            blocks: 2,
            requested: 150,
            max_heap: 232,
        };

        let expected = "heap management statistics\n\
                        mallocs:\t3\n\
                        frees:\t2\n\
                        reuses:\t1\n\
                        grows:\t2\n\
                        splits:\t1\n\
                        coalesces:\t1\n\
                        blocks:\t2\n\
                        requested:\t150\n\
                        max heap:\t232\n";

        assert_eq!(stats.to_string(), expected);
    }
}
