/// Tunables for the merge pipeline (spec.md §4.1, §6, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    /// Minimum length of an unaligned run (soft/hard clip or indel) that
    /// causes the CIGAR splitter to cut out a standalone flanking block
    /// instead of folding it into the shared aligned region.
    pub cutoff: usize,
    /// Seed for the deterministic block-id generator.
    pub id_seed: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            cutoff: 500,
            id_seed: 0,
        }
    }
}
