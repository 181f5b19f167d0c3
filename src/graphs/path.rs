use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use crate::graphs::block::{Block, BlockId, VisitTag};
use crate::graphs::node::{BlockHandle, Node};
use crate::utils::errors::PangraphError;
use crate::utils::sequence::{self, Strand};

/// The ordered, oriented traversal of blocks reconstructing one input
/// genome (spec.md §3, §4.3). `position[i]` is the cumulative ungapped
/// length of `nodes[0..i]`, so `position.len() == nodes.len() + 1`.
#[derive(Debug, Clone)]
pub struct Path {
    pub name: String,
    pub nodes: Vec<Node>,
    pub offset: usize,
    pub circular: bool,
    pub position: Vec<usize>,
}

impl Path {
    pub fn new(name: &str, nodes: Vec<Node>, circular: bool) -> Result<Path, PangraphError> {
        let mut path = Path {
            name: name.to_string(),
            nodes,
            offset: 0,
            circular,
            position: Vec::new(),
        };
        path.recompute_position()?;
        Ok(path)
    }

    fn recompute_position(&mut self) -> Result<(), PangraphError> {
        let mut pos = Vec::with_capacity(self.nodes.len() + 1);
        pos.push(0usize);
        let mut acc = 0usize;
        for node in &self.nodes {
            acc += node.length(&self.name)?;
            pos.push(acc);
        }
        self.position = pos;
        Ok(())
    }

    pub fn total_length(&self) -> usize {
        *self.position.last().unwrap_or(&0)
    }

    /// Reconstruct the original genome: concatenate each node's extracted
    /// sequence (reverse-complemented on the minus strand), then rotate
    /// left by `offset` (spec.md §4.3, invariant 6).
    pub fn sequence(&self) -> Result<String, PangraphError> {
        let mut seq = Vec::new();
        for node in &self.nodes {
            let frag = node.block.borrow().extract(&self.name, node.visit, true)?;
            let bytes = frag.into_bytes();
            if node.strand == Strand::Minus {
                seq.extend(sequence::reverse_complement(&bytes));
            } else {
                seq.extend(bytes);
            }
        }
        let n = seq.len();
        if n > 0 {
            seq.rotate_left(self.offset % n);
        }
        Ok(sequence::as_string(&seq))
    }

    /// Drop every node whose visit reconstructs empty for this path,
    /// deleting the corresponding key from the underlying block. Once a
    /// block no longer carries this isolate at all, any further node in
    /// this path referencing the same block id is dropped too (pathological
    /// duplicates left behind by an earlier split) (spec.md §4.3).
    pub fn remove_empty_visits(&mut self) -> Result<(), PangraphError> {
        let mut skip_ids: HashSet<BlockId> = HashSet::new();
        let mut kept = Vec::with_capacity(self.nodes.len());

        for node in self.nodes.drain(..) {
            let id = node.block_id();
            if skip_ids.contains(&id) {
                continue;
            }

            let empty = node.block.borrow().is_empty(&self.name, node.visit);
            if empty {
                let mut blk = node.block.borrow_mut();
                blk.muts.shift_remove(&(self.name.clone(), node.visit));
                if !blk.has(&self.name) {
                    skip_ids.insert(id);
                }
                continue;
            }

            kept.push(node);
        }

        self.nodes = kept;
        self.recompute_position()
    }

    pub fn position_of(&self, block_id: &BlockId, visit: usize) -> Option<(usize, usize)> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.block_id() == *block_id && node.visit == visit {
                return Some((self.position[i], self.position[i + 1]));
            }
        }
        None
    }

    pub fn orientation_of(&self, block_id: &BlockId, visit: usize) -> Option<Strand> {
        self.nodes
            .iter()
            .find(|n| n.block_id() == *block_id && n.visit == visit)
            .map(|n| n.strand)
    }

    /// Circular half-open range query over node boundaries: the ordered
    /// list of whole nodes whose interval intersects `[start, stop)` mod
    /// `total_length()`. Negative `start` or `stop > total_length()` is only
    /// accepted on a circular path with more than one node (spec.md §4.3).
    pub fn range(&self, start: i64, stop: i64) -> Result<Vec<Node>, PangraphError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }
        let total = self.total_length() as i64;
        let needs_wrap = start < 0 || stop > total;
        if needs_wrap && !(self.circular && self.nodes.len() > 1) {
            return Err(PangraphError::WrapOnLinearPath(format!(
                "range({}, {}) requires wraparound on path {} (circular={}, nodes={})",
                start, stop, self.name, self.circular, self.nodes.len()
            )));
        }

        let norm = |x: i64| -> i64 { ((x % total) + total) % total };
        let s = norm(start);
        let span = if stop >= start { stop - start } else { stop - start + total };
        let span = span.clamp(0, total);
        if span == 0 {
            return Ok(Vec::new());
        }

        let start_idx = self
            .position
            .partition_point(|&a| (a as i64) <= s)
            .saturating_sub(1)
            .min(self.nodes.len() - 1);

        let mut out = Vec::new();
        let mut covered = 0i64;
        let mut i = start_idx;
        while covered < span {
            out.push(self.nodes[i].clone());
            covered += self.position[i + 1] as i64 - self.position[i] as i64;
            i = (i + 1) % self.nodes.len();
        }
        Ok(out)
    }

    fn index_of_block(&self, block_id: &BlockId) -> Option<usize> {
        self.nodes.iter().position(|n| n.block_id() == *block_id)
    }

    /// Fold this path's own sequence across `nodes[begin..=end]` into
    /// `new_block` under a fresh visit, returning the assigned visit number
    /// (spec.md §4.3 `merge`).
    fn fold_run_into(&self, begin: usize, end: usize, new_block: &mut Block) -> Result<usize, PangraphError> {
        let mut seq = Vec::new();
        for node in &self.nodes[begin..=end] {
            let frag = node.block.borrow().extract(&self.name, node.visit, false)?;
            let bytes = frag.into_bytes();
            if node.strand == Strand::Minus {
                seq.extend(sequence::reverse_complement(&bytes));
            } else {
                seq.extend(bytes);
            }
        }
        Self::diff_into(new_block, &self.name, seq)
    }

    /// Wrapped version of [`fold_run_into`] for the circular wrap case,
    /// folding `nodes[begin..] ++ nodes[..=end]`.
    fn fold_wrapped_into(&self, begin: usize, end: usize, new_block: &mut Block) -> Result<usize, PangraphError> {
        let mut seq = Vec::new();
        let tail = self.nodes[begin..].iter().chain(self.nodes[..=end].iter());
        for node in tail {
            let frag = node.block.borrow().extract(&self.name, node.visit, false)?;
            let bytes = frag.into_bytes();
            if node.strand == Strand::Minus {
                seq.extend(sequence::reverse_complement(&bytes));
            } else {
                seq.extend(bytes);
            }
        }
        Self::diff_into(new_block, &self.name, seq)
    }

    fn diff_into(new_block: &mut Block, isolate: &str, seq: Vec<u8>) -> Result<usize, PangraphError> {
        if seq.len() != new_block.consensus.len() {
            return Err(PangraphError::InconsistentBookkeeping(format!(
                "isolate {} run reconstructs to {} bases, new block {} expects {}",
                isolate, seq.len(), new_block.id, new_block.consensus.len()
            )));
        }
        let mut muts = BTreeMap::new();
        for (i, (&a, &b)) in seq.iter().zip(new_block.consensus.iter()).enumerate() {
            if a != b {
                muts.insert(i, a);
            }
        }
        let tag = new_block.push(isolate, muts);
        Ok(tag.1)
    }

    /// Collapse the node run spanned by `start_key`/`stop_key` -- both
    /// `(block_id, strand)` pairs taken from the merged hit -- into a
    /// single node over `new_block` (spec.md §4.3 `merge`). Returns `false`
    /// without mutating the path when this path doesn't reference both
    /// endpoints.
    pub fn merge(
        &mut self,
        start_key: (BlockId, Strand),
        stop_key: (BlockId, Strand),
        new_block: BlockHandle,
    ) -> Result<bool, PangraphError> {
        let i = match self.index_of_block(&start_key.0) {
            Some(i) => i,
            None => return Ok(false),
        };
        let j = match self.index_of_block(&stop_key.0) {
            Some(j) => j,
            None => return Ok(false),
        };

        let (begin, end, strand) = if self.nodes[i].strand == start_key.1 {
            (i, j, Strand::Plus)
        } else {
            (j, i, Strand::Minus)
        };

        if begin <= end {
            let visit = {
                let mut blk = new_block.borrow_mut();
                self.fold_run_into(begin, end, &mut blk)?
            };
            let node = Node::new(new_block, visit, strand);
            self.nodes.splice(begin..=end, std::iter::once(node));
        } else {
            if !self.circular {
                return Err(PangraphError::WrapOnLinearPath(format!(
                    "merge wrap [{}..{}] attempted on linear path {}",
                    begin, end, self.name
                )));
            }
            let suffix_len: usize = self.nodes[begin..]
                .iter()
                .map(|n| n.length(&self.name))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .sum();

            let visit = {
                let mut blk = new_block.borrow_mut();
                self.fold_wrapped_into(begin, end, &mut blk)?
            };
            let node = Node::new(new_block, visit, strand);

            let mut rebuilt = Vec::with_capacity(self.nodes.len() - begin + end + 2);
            rebuilt.push(node);
            rebuilt.extend(self.nodes[end + 1..begin].iter().cloned());
            self.nodes = rebuilt;
            self.offset += suffix_len;
        }

        self.recompute_position()?;
        Ok(true)
    }

    /// Splice `new_blocks` (each with its own strand relative to the old
    /// node) in place of every node referencing `old_block_id`, composing
    /// strands and resolving visit numbers through `blk_map` (spec.md §4.3
    /// `replace`). Surfaces a [`PangraphError::NodeNotFound`] rather than
    /// silently dropping a node when a mapping is missing (spec.md §9(b)).
    pub fn replace(
        &mut self,
        old_block_id: &BlockId,
        new_blocks: &[(BlockHandle, Strand)],
        blk_map: &IndexMap<BlockId, IndexMap<BlockId, IndexMap<VisitTag, VisitTag>>>,
    ) -> Result<(), PangraphError> {
        let mut new_nodes = Vec::with_capacity(self.nodes.len());

        for node in self.nodes.drain(..) {
            if node.block_id() != *old_block_id {
                new_nodes.push(node);
                continue;
            }

            let old_tag: VisitTag = (self.name.clone(), node.visit);
            let mut substitutes = Vec::with_capacity(new_blocks.len());
            for (blk, node_strand) in new_blocks {
                let new_id = blk.borrow().id.clone();
                let new_tag = blk_map
                    .get(&new_id)
                    .and_then(|by_src| by_src.get(old_block_id))
                    .and_then(|tags| tags.get(&old_tag))
                    .ok_or_else(|| {
                        PangraphError::NodeNotFound(format!(
                            "no visit mapping for {:?} from block {} into new block {} on path {}",
                            old_tag, old_block_id, new_id, self.name
                        ))
                    })?;
                let strand = sequence::compose(node.strand, *node_strand);
                substitutes.push(Node::new(blk.clone(), new_tag.1, strand));
            }

            if node.strand == Strand::Minus {
                substitutes.reverse();
            }
            new_nodes.extend(substitutes);
        }

        self.nodes = new_nodes;
        self.recompute_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ids::IdGenerator;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn handle(b: Block) -> BlockHandle {
        Rc::new(RefCell::new(b))
    }

    #[test]
    fn single_node_path_reconstructs_sequence() {
        let mut g = IdGenerator::new(0);
        let b = Block::from_sequence(&mut g, "S1", "ACGTACGT");
        let node = Node::new(handle(b), 0, Strand::Plus);
        let path = Path::new("S1", vec![node], false).unwrap();
        assert_eq!(path.sequence().unwrap(), "ACGTACGT");
        assert_eq!(path.position, vec![0, 8]);
    }

    #[test]
    fn minus_strand_node_reconstructs_reverse_complement() {
        let mut g = IdGenerator::new(0);
        let b = Block::from_sequence(&mut g, "S2", "AAACCCGGG");
        let node = Node::new(handle(b), 0, Strand::Minus);
        let path = Path::new("S2", vec![node], false).unwrap();
        assert_eq!(path.sequence().unwrap(), "CCCGGGTTT");
    }

    #[test]
    fn remove_empty_visits_drops_node_and_mutation_key() {
        let mut g = IdGenerator::new(0);
        let mut b1 = Block::from_sequence(&mut g, "S1", "AAAA");
        b1.muts.clear();
        b1.push("S1", BTreeMap::new());
        let mut m = BTreeMap::new();
        for p in 0..4 {
            m.insert(p, b'-');
        }
        b1.push("S1", m);
        let h1 = handle(b1);

        let n0 = Node::new(h1.clone(), 0, Strand::Plus);
        let n1 = Node::new(h1.clone(), 1, Strand::Plus);
        let mut path = Path::new("S1", vec![n0, n1], false).unwrap();
        path.remove_empty_visits().unwrap();
        assert_eq!(path.nodes.len(), 1);
        assert!(!h1.borrow().muts.contains_key(&("S1".to_string(), 1)));
    }

    #[test]
    fn range_wraps_on_circular_path() {
        let mut g = IdGenerator::new(0);
        let b1 = Block::from_sequence(&mut g, "S1", "AAAAA");
        let b2 = Block::from_sequence(&mut g, "S1", "CCCCC");
        let n1 = Node::new(handle(b1), 0, Strand::Plus);
        let n2 = Node::new(handle(b2), 0, Strand::Plus);
        let path = Path::new("S1", vec![n1, n2], true).unwrap();

        assert!(path.range(-2, 3).is_ok());
        let out = path.range(-2, 3).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn range_rejects_wrap_on_linear_path() {
        let mut g = IdGenerator::new(0);
        let b1 = Block::from_sequence(&mut g, "S1", "AAAAA");
        let n1 = Node::new(handle(b1), 0, Strand::Plus);
        let path = Path::new("S1", vec![n1], false).unwrap();
        assert!(path.range(-1, 5).is_err());
    }
}
