use crate::graphs::block::BlockId;
use crate::utils::sequence::Strand;

/// One side of an alignment hit: the block being aligned against, and the
/// aligned sub-range within that block's consensus frame (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqSpan {
    pub name: BlockId,
    pub len: usize,
    pub start: usize,
    pub end: usize,
}

/// A normalized pairwise alignment record, already parsed from whatever
/// upstream aligner/PAF format produced it (spec.md §1, §6). `qry.name` and
/// `ref.name` are the ids of the two original blocks being merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub qry: SeqSpan,
    pub reference: SeqSpan,
    /// Standard CIGAR string: `M`/`I`/`D`/`S`/`H`, lengths >= 1.
    pub cigar: String,
    pub orientation: Strand,
    /// Bases already in query-aligned orientation.
    pub qry_seq: Vec<u8>,
    pub ref_seq: Vec<u8>,
    /// `(lo, hi)` interval in the query block's consensus frame.
    pub qry_cluster: (usize, usize),
    /// `(lo, hi)` interval in the reference block's consensus frame.
    pub ref_cluster: (usize, usize),
}
