use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::config::MergeConfig;
use crate::graphs::block::{Block, BlockId};
use crate::graphs::node::{BlockHandle, Node};
use crate::graphs::path::Path;
use crate::io::hit::Hit;
use crate::utils::errors::PangraphError;
use crate::utils::ids::IdGenerator;
use crate::utils::sequence::Strand;

/// The session-lifetime orchestrator: the block pool, the path set, and the
/// deterministic id generator that ties them together (spec.md §3, §4.4).
pub struct Graph {
    pub blocks: IndexMap<BlockId, BlockHandle>,
    pub paths: IndexMap<String, Path>,
    pub id_gen: IdGenerator,
    pub cfg: MergeConfig,
}

impl Graph {
    pub fn new(cfg: MergeConfig) -> Self {
        Graph {
            blocks: IndexMap::new(),
            paths: IndexMap::new(),
            id_gen: IdGenerator::new(cfg.id_seed),
            cfg,
        }
    }

    /// Register one input genome as a single block and a single-node path
    /// (spec.md §8 scenario 1).
    pub fn add_sequence(&mut self, name: &str, seq: &str, circular: bool) -> Result<(), PangraphError> {
        let block = Block::from_sequence(&mut self.id_gen, name, seq);
        let id = block.id.clone();
        let handle: BlockHandle = Rc::new(RefCell::new(block));
        self.blocks.insert(id, handle.clone());

        let node = Node::new(handle, 0, Strand::Plus);
        let path = Path::new(name, vec![node], circular)?;
        self.paths.insert(name.to_string(), path);
        Ok(())
    }

    pub fn sequence(&self, name: &str) -> Result<String, PangraphError> {
        self.paths
            .get(name)
            .ok_or_else(|| PangraphError::NodeNotFound(format!("no path named {}", name)))?
            .sequence()
    }

    /// Fold one alignment hit into the graph: split it into sub-blocks, fold
    /// in both sides' mutation tables, install the new blocks, rewrite every
    /// path that referenced either original block, then drop emptied visits
    /// and orphaned blocks (spec.md §2, §4.4).
    pub fn merge_hit(&mut self, hit: &Hit) -> Result<(), PangraphError> {
        let qry_id = hit.qry.name.clone();
        let ref_id = hit.reference.name.clone();

        let orig_qry_muts = self
            .blocks
            .get(&qry_id)
            .ok_or_else(|| PangraphError::NodeNotFound(format!("query block {} not in pool", qry_id)))?
            .borrow()
            .muts
            .clone();
        let orig_ref_muts = self
            .blocks
            .get(&ref_id)
            .ok_or_else(|| PangraphError::NodeNotFound(format!("reference block {} not in pool", ref_id)))?
            .borrow()
            .muts
            .clone();

        debug!("merging hit {} x {} ({} bp cigar)", qry_id, ref_id, hit.cigar.len());

        let result = Block::from_alignment(hit, &qry_id, &orig_qry_muts, &ref_id, &orig_ref_muts, &self.cfg, &mut self.id_gen)?;

        for b in result.new_blocks {
            self.blocks.insert(b.id.clone(), Rc::new(RefCell::new(b)));
        }

        let qry_subs: Vec<(BlockHandle, Strand)> = result
            .qry_blocks
            .iter()
            .map(|id| (self.blocks.get(id).expect("just inserted").clone(), hit.orientation))
            .collect();
        let ref_subs: Vec<(BlockHandle, Strand)> = result
            .ref_blocks
            .iter()
            .map(|id| (self.blocks.get(id).expect("just inserted").clone(), Strand::Plus))
            .collect();

        for path in self.paths.values_mut() {
            path.replace(&qry_id, &qry_subs, &result.blk_map)?;
            if ref_id != qry_id {
                path.replace(&ref_id, &ref_subs, &result.blk_map)?;
            }
        }

        self.blocks.shift_remove(&qry_id);
        if ref_id != qry_id {
            self.blocks.shift_remove(&ref_id);
        }

        for path in self.paths.values_mut() {
            path.remove_empty_visits()?;
        }

        self.drop_orphan_blocks();
        Ok(())
    }

    /// spec.md §8 "Orphan freedom": every block in the pool must be
    /// referenced by at least one node after cleanup.
    fn drop_orphan_blocks(&mut self) {
        let mut referenced: HashSet<BlockId> = HashSet::new();
        for path in self.paths.values() {
            for node in &path.nodes {
                referenced.insert(node.block_id());
            }
        }
        self.blocks.retain(|id, _| referenced.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sequence_graph() {
        let mut g = Graph::new(MergeConfig::default());
        g.add_sequence("S1", "ACGTACGT", false).unwrap();
        assert_eq!(g.blocks.len(), 1);
        assert_eq!(g.sequence("S1").unwrap(), "ACGTACGT");
        let path = &g.paths["S1"];
        assert_eq!(path.nodes.len(), 1);
        assert_eq!(path.total_length(), 8);
    }

    fn hit(
        qry_id: &str,
        ref_id: &str,
        cigar: &str,
        qry_seq: &str,
        ref_seq: &str,
        orientation: Strand,
        qry_cluster: (usize, usize),
        ref_cluster: (usize, usize),
    ) -> Hit {
        use crate::io::hit::SeqSpan;
        Hit {
            qry: SeqSpan {
                name: qry_id.to_string(),
                len: qry_seq.len(),
                start: qry_cluster.0,
                end: qry_cluster.1,
            },
            reference: SeqSpan {
                name: ref_id.to_string(),
                len: ref_seq.len(),
                start: ref_cluster.0,
                end: ref_cluster.1,
            },
            cigar: cigar.to_string(),
            orientation,
            qry_seq: qry_seq.as_bytes().to_vec(),
            ref_seq: ref_seq.as_bytes().to_vec(),
            qry_cluster,
            ref_cluster,
        }
    }

    #[test]
    fn identity_merge_produces_one_shared_block() {
        let mut g = Graph::new(MergeConfig::default());
        g.add_sequence("S1", "AAACCCGGGTTT", false).unwrap();
        g.add_sequence("S2", "AAACCCGGGTTT", false).unwrap();

        let qid = g.paths["S1"].nodes[0].block_id();
        let rid = g.paths["S2"].nodes[0].block_id();
        let h = hit(&qid, &rid, "12M", "AAACCCGGGTTT", "AAACCCGGGTTT", Strand::Plus, (0, 12), (0, 12));
        g.merge_hit(&h).unwrap();

        assert_eq!(g.blocks.len(), 1);
        let shared_id = g.paths["S1"].nodes[0].block_id();
        assert_eq!(g.paths["S2"].nodes[0].block_id(), shared_id);
        assert_eq!(g.blocks[&shared_id].borrow().depth(), 2);
        assert_eq!(g.sequence("S1").unwrap(), "AAACCCGGGTTT");
        assert_eq!(g.sequence("S2").unwrap(), "AAACCCGGGTTT");
    }

    #[test]
    fn single_substitution_merge_keeps_both_sequences_recoverable() {
        let mut g = Graph::new(MergeConfig::default());
        g.add_sequence("S1", "AAACCCGGG", false).unwrap();
        g.add_sequence("S2", "AAACGCGGG", false).unwrap();

        let qid = g.paths["S2"].nodes[0].block_id();
        let rid = g.paths["S1"].nodes[0].block_id();
        let h = hit(&qid, &rid, "9M", "AAACGCGGG", "AAACCCGGG", Strand::Plus, (0, 9), (0, 9));
        g.merge_hit(&h).unwrap();

        assert_eq!(g.blocks.len(), 1);
        assert_eq!(g.sequence("S1").unwrap(), "AAACCCGGG");
        assert_eq!(g.sequence("S2").unwrap(), "AAACGCGGG");
    }

    #[test]
    fn large_deletion_splits_into_three_blocks() {
        let mut g = Graph::new(MergeConfig::default());
        let s1 = format!("AAAAA{}TTTTT", "N".repeat(600));
        g.add_sequence("S1", &s1, false).unwrap();
        g.add_sequence("S2", "AAAAATTTTT", false).unwrap();

        let qid = g.paths["S2"].nodes[0].block_id();
        let rid = g.paths["S1"].nodes[0].block_id();
        let h = hit(&qid, &rid, "5M600D5M", "AAAAATTTTT", &s1, Strand::Plus, (0, 10), (0, 610));
        g.merge_hit(&h).unwrap();

        assert_eq!(g.blocks.len(), 3);
        assert_eq!(g.paths["S2"].nodes.len(), 2);
        assert_eq!(g.paths["S1"].nodes.len(), 3);
        assert_eq!(g.sequence("S1").unwrap(), s1);
        assert_eq!(g.sequence("S2").unwrap(), "AAAAATTTTT");
    }

    #[test]
    fn reverse_strand_merge_reconstructs_both_orientations() {
        let mut g = Graph::new(MergeConfig::default());
        g.add_sequence("S1", "AAACCCGGG", false).unwrap();
        g.add_sequence("S2", "CCCGGGTTT", false).unwrap();

        let qid = g.paths["S2"].nodes[0].block_id();
        let rid = g.paths["S1"].nodes[0].block_id();
        // S2 is the reverse complement of S1, so its query-aligned sequence is S1 itself.
        let h = hit(&qid, &rid, "9M", "AAACCCGGG", "AAACCCGGG", Strand::Minus, (0, 9), (0, 9));
        g.merge_hit(&h).unwrap();

        assert_eq!(g.blocks.len(), 1);
        assert_eq!(g.sequence("S1").unwrap(), "AAACCCGGG");
        assert_eq!(g.sequence("S2").unwrap(), "CCCGGGTTT");
        assert_eq!(g.paths["S2"].nodes[0].strand, Strand::Minus);
    }
}
