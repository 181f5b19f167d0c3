use std::collections::BTreeMap;
use std::str::FromStr;

use rayon::prelude::*;
use rust_htslib::bam::record::{Cigar, CigarString};

use crate::reads::cigar_utils::CigarUtils;
use crate::utils::errors::PangraphError;

/// Sorted anchors + deltas translating an original isolate coordinate into
/// the consensus frame of the sub-block it was cut from (spec.md §4.1, §6).
///
/// `consensus_pos = isolate_pos + deltas[searchsorted_right(anchors, isolate_pos)]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordMap {
    pub anchors: Vec<i64>,
    pub deltas: Vec<i64>,
}

impl CoordMap {
    /// `np.searchsorted(anchors, p, side='right')`: the number of anchors
    /// that are `<= p`.
    pub fn searchsorted_right(&self, p: i64) -> usize {
        self.anchors.partition_point(|&a| a <= p)
    }

    pub fn translate(&self, isolate_pos: i64) -> i64 {
        let idx = self.searchsorted_right(isolate_pos);
        isolate_pos + self.deltas[idx]
    }

    /// Re-express this coordinate map so that `translate` accepts isolate
    /// positions offset by `offset` (e.g. to move from alignment-local
    /// coordinates to the original block's absolute consensus-frame
    /// coordinates), while leaving the consensus-frame output unchanged.
    fn shifted(&self, offset: i64) -> CoordMap {
        CoordMap {
            anchors: self.anchors.iter().map(|a| a + offset).collect(),
            deltas: self.deltas.iter().map(|d| d - offset).collect(),
        }
    }
}

/// One aligned interval or unaligned flank produced by the splitter.
#[derive(Debug, Clone)]
pub struct SubBlock {
    pub consensus: Vec<u8>,
    pub qry_muts: BTreeMap<usize, u8>,
    pub qry_coordmap: CoordMap,
    pub ref_muts: BTreeMap<usize, u8>,
    pub ref_coordmap: CoordMap,
}

/// The three parallel, equal-length sequences the splitter produces
/// (spec.md §4.1 "Output").
#[derive(Debug, Clone, Default)]
pub struct SplitOutput {
    pub qrys: Vec<Option<(usize, usize)>>,
    pub refs: Vec<Option<(usize, usize)>>,
    pub blocks: Vec<SubBlock>,
}

impl SplitOutput {
    /// Shift every query-side interval/coordmap by `qry_offset` and every
    /// reference-side one by `ref_offset`, moving from alignment-local
    /// coordinates (as produced by [`split`]) into the original blocks'
    /// absolute consensus-frame coordinates the caller's mutation tables
    /// are keyed in (spec.md §4.2.1).
    pub fn shift(&mut self, qry_offset: i64, ref_offset: i64) {
        for q in self.qrys.iter_mut() {
            if let Some((l, r)) = q {
                *q = Some(((*l as i64 + qry_offset) as usize, (*r as i64 + qry_offset) as usize));
            }
        }
        for r in self.refs.iter_mut() {
            if let Some((l, rr)) = r {
                *r = Some(((*l as i64 + ref_offset) as usize, (*rr as i64 + ref_offset) as usize));
            }
        }
        for b in self.blocks.iter_mut() {
            b.qry_coordmap = b.qry_coordmap.shifted(qry_offset);
            b.ref_coordmap = b.ref_coordmap.shifted(ref_offset);
        }
    }
}

struct SplitState {
    cutoff: usize,
    rq: usize,
    rr: usize,
    lq: usize,
    lr: usize,
    q_muts: BTreeMap<usize, u8>,
    r_muts: BTreeMap<usize, u8>,
    blkseq: Vec<u8>,
    qry_anchors: Vec<i64>,
    qry_deltas: Vec<i64>,
    ref_anchors: Vec<i64>,
    ref_deltas: Vec<i64>,
    out: SplitOutput,
}

impl SplitState {
    fn new(cutoff: usize) -> Self {
        SplitState {
            cutoff,
            rq: 0,
            rr: 0,
            lq: 0,
            lr: 0,
            q_muts: BTreeMap::new(),
            r_muts: BTreeMap::new(),
            blkseq: Vec::new(),
            qry_anchors: vec![0],
            qry_deltas: vec![0],
            ref_anchors: vec![0],
            ref_deltas: vec![0],
            out: SplitOutput::default(),
        }
    }

    fn blkpos(&self) -> usize {
        self.blkseq.len()
    }

    fn record_breakpoint(&mut self) {
        let blkpos = self.blkpos() as i64;
        self.ref_anchors.push(self.rr as i64);
        self.ref_deltas.push(blkpos - self.rr as i64);
        self.qry_anchors.push(self.rq as i64);
        self.qry_deltas.push(blkpos - self.rq as i64);
    }

    /// Flush the pending sub-block, then reset pending state for the next
    /// one. Emits a slot into all three output arrays only when the pending
    /// consensus is non-empty and at least one side has a non-empty
    /// interval; otherwise the call is a pure reset (spec.md §4.1).
    fn push(&mut self, qval: Option<(usize, usize)>, rval: Option<(usize, usize)>) {
        let q_present = matches!(qval, Some((l, r)) if l < r);
        let r_present = matches!(rval, Some((l, r)) if l < r);

        if !self.blkseq.is_empty() && (q_present || r_present) {
            self.out.qrys.push(if q_present { qval } else { None });
            self.out.refs.push(if r_present { rval } else { None });
            self.out.blocks.push(SubBlock {
                consensus: std::mem::take(&mut self.blkseq),
                qry_muts: std::mem::take(&mut self.q_muts),
                qry_coordmap: CoordMap {
                    anchors: std::mem::take(&mut self.qry_anchors),
                    deltas: std::mem::take(&mut self.qry_deltas),
                },
                ref_muts: std::mem::take(&mut self.r_muts),
                ref_coordmap: CoordMap {
                    anchors: std::mem::take(&mut self.ref_anchors),
                    deltas: std::mem::take(&mut self.ref_deltas),
                },
            });
        }

        self.blkseq.clear();
        self.q_muts.clear();
        self.r_muts.clear();
        self.qry_anchors = vec![self.rq as i64];
        self.qry_deltas = vec![-(self.rq as i64)];
        self.ref_anchors = vec![self.rr as i64];
        self.ref_deltas = vec![-(self.rr as i64)];
    }

    fn handle_match(&mut self, len: usize, qry_seq: &[u8], ref_seq: &[u8]) {
        let rs = &ref_seq[self.rr..self.rr + len];
        let qs = &qry_seq[self.rq..self.rq + len];
        let blkpos = self.blkpos();

        let diffs: Vec<usize> = (0..len).into_par_iter().filter(|&i| rs[i] != qs[i]).collect();
        for i in diffs {
            self.q_muts.insert(i + blkpos, qs[i]);
        }
        self.blkseq.extend_from_slice(rs);

        self.rq += len;
        self.rr += len;
        self.record_breakpoint();
    }

    fn handle_deletion(&mut self, len: usize, ref_seq: &[u8]) {
        if len >= self.cutoff {
            self.push(Some((self.lq, self.rq)), Some((self.lr, self.rr)));

            self.blkseq = ref_seq[self.rr..self.rr + len].to_vec();
            self.rr += len;
            self.record_breakpoint();

            self.push(None, Some((self.rr - len, self.rr)));
            self.lr = self.rr;
            self.lq = self.rq;
        } else {
            let blkpos = self.blkpos();
            for i in 0..len {
                self.q_muts.insert(i + blkpos, b'-');
            }
            self.blkseq.extend_from_slice(&ref_seq[self.rr..self.rr + len]);
            self.rr += len;
            self.record_breakpoint();
        }
    }

    fn handle_insertion(&mut self, len: usize, qry_seq: &[u8]) {
        if len >= self.cutoff {
            self.push(Some((self.lq, self.rq)), Some((self.lr, self.rr)));

            self.blkseq = qry_seq[self.rq..self.rq + len].to_vec();
            self.rq += len;
            self.record_breakpoint();

            self.push(Some((self.rq - len, self.rq)), None);
            self.lq = self.rq;
            self.lr = self.rr;
        } else {
            let blkpos = self.blkpos();
            for i in 0..len {
                self.r_muts.insert(i + blkpos, b'-');
            }
            self.blkseq.extend_from_slice(&qry_seq[self.rq..self.rq + len]);
            self.rq += len;
            self.record_breakpoint();
        }
    }

    fn handle_soft_clip(&mut self, len: usize, qry_seq: &[u8]) {
        if len >= self.cutoff {
            self.push(Some((self.lq, self.rq)), Some((self.lr, self.rr)));

            self.blkseq = qry_seq[self.rq..self.rq + len].to_vec();
            self.rq += len;
            self.record_breakpoint();

            self.push(Some((self.rq - len, self.rq)), None);
            self.lq = self.rq;
            self.lr = self.rr;
        } else {
            self.rq += len;
            self.record_breakpoint();
        }
    }
}

/// Convert an alignment hit's CIGAR plus its query/reference sequences into
/// the ordered sub-block decomposition described in spec.md §4.1.
///
/// `qry_seq`/`ref_seq` are expected to already be sliced to the aligned
/// region, in query-aligned orientation, as guaranteed by the `Hit` record
/// (spec.md §6). `cutoff` (default 500) is the minimum unaligned run length
/// that forces a standalone flanking block.
pub fn split(cigar: &str, qry_seq: &[u8], ref_seq: &[u8], cutoff: usize) -> Result<SplitOutput, PangraphError> {
    let cigar = CigarString::from_str(cigar)
        .map_err(|e| PangraphError::MalformedCigar(format!("{}: {}", cigar, e)))?;

    let mut state = SplitState::new(cutoff);

    for op in cigar.iter() {
        let len = op.len() as usize;
        if len == 0 {
            return Err(PangraphError::EmptyCigarOp(format!("{:?}", op)));
        }

        match op {
            Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) => {
                state.handle_match(len, qry_seq, ref_seq)
            }
            Cigar::Del(_) => state.handle_deletion(len, ref_seq),
            Cigar::Ins(_) => state.handle_insertion(len, qry_seq),
            Cigar::SoftClip(_) => state.handle_soft_clip(len, qry_seq),
            ref op if CigarUtils::is_clipping(op) => { /* hard clip: consumes neither qry_seq nor ref_seq bytes */ }
            other => {
                return Err(PangraphError::MalformedCigar(format!(
                    "unsupported operator {:?}",
                    other
                )))
            }
        }
    }

    state.push(Some((state.lq, state.rq)), Some((state.lr, state.rr)));

    debug_assert_eq!(state.out.qrys.len(), state.out.refs.len());
    debug_assert_eq!(state.out.qrys.len(), state.out.blocks.len());

    Ok(state.out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_match_block_identity() {
        let qry = b"AAACCCGGGTTT";
        let refs = b"AAACCCGGGTTT";
        let out = split("12M", qry, refs, 500).unwrap();
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.qrys[0], Some((0, 12)));
        assert_eq!(out.refs[0], Some((0, 12)));
        assert_eq!(out.blocks[0].consensus, refs.to_vec());
        assert!(out.blocks[0].qry_muts.is_empty());
        assert!(out.blocks[0].ref_muts.is_empty());
    }

    #[test]
    fn single_substitution_recorded_on_query_side() {
        let refs = b"AAACCCGGG";
        let qry = b"AAACGCGGG";
        let out = split("9M", qry, refs, 500).unwrap();
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].qry_muts.get(&4), Some(&b'G'));
        assert_eq!(out.blocks[0].consensus, refs.to_vec());
    }

    #[test]
    fn large_deletion_splits_into_three_blocks() {
        let refs = [b"AAAAA".as_slice(), &b"N".repeat(600), b"TTTTT"].concat();
        let qry = b"AAAAATTTTT";
        let out = split("5M600D5M", qry, &refs, 500).unwrap();
        assert_eq!(out.blocks.len(), 3);
        assert_eq!(out.qrys[0], Some((0, 5)));
        assert_eq!(out.refs[0], Some((0, 5)));
        assert_eq!(out.qrys[1], None);
        assert_eq!(out.refs[1], Some((5, 605)));
        assert_eq!(out.blocks[1].consensus.len(), 600);
        assert_eq!(out.qrys[2], Some((5, 10)));
        assert_eq!(out.refs[2], Some((605, 610)));
    }

    #[test]
    fn small_indel_does_not_split() {
        let refs = b"AAAAATTTTT";
        let qry = b"AAAAAGGTTTTT";
        let out = split("5M2I5M", qry, refs, 500).unwrap();
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].ref_muts.get(&5), Some(&b'-'));
        assert_eq!(out.blocks[0].ref_muts.get(&6), Some(&b'-'));
    }

    #[test]
    fn hard_clip_does_not_consume_query_bytes() {
        let refs = b"AAACCCGGG";
        let qry = b"AAACCCGGG";
        let out = split("2H9M", qry, refs, 500).unwrap();
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].consensus, refs.to_vec());
    }

    #[test]
    fn malformed_cigar_rejected() {
        assert!(split("5Z", b"AAAAA", b"AAAAA", 500).is_err());
    }

    #[test]
    fn zero_length_op_rejected() {
        assert!(split("0M5M", b"AAAAA", b"AAAAA", 500).is_err());
    }

    #[test]
    fn coordmap_translates_positions() {
        let refs = b"AAACCCGGG";
        let qry = b"AAACGCGGG";
        let out = split("9M", qry, refs, 500).unwrap();
        let cm = &out.blocks[0].qry_coordmap;
        for p in 0..9i64 {
            assert_eq!(cm.translate(p), p);
        }
    }
}
