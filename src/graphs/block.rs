use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use log::trace;

use crate::config::MergeConfig;
use crate::io::hit::Hit;
use crate::reads::cigar_splitter;
use crate::utils::errors::PangraphError;
use crate::utils::ids::IdGenerator;
use crate::utils::sequence::{self, Strand};

pub type BlockId = String;

/// One isolate-visit key: `(isolate name, visit number)`.
pub type VisitTag = (String, usize);

/// The aligned-region entity (spec.md §3, §4.2): a consensus array over
/// `{A,C,G,T,N,-}` plus sparse per-isolate-visit mutation maps.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub consensus: Vec<u8>,
    pub muts: IndexMap<VisitTag, BTreeMap<usize, u8>>,
}

/// Everything `Block::from_alignment` hands back to the caller so it can
/// install the new blocks and rewrite affected paths (spec.md §4.2).
pub struct FromAlignmentResult {
    pub new_blocks: Vec<Block>,
    pub qry_blocks: Vec<BlockId>,
    pub ref_blocks: Vec<BlockId>,
    pub shared_blocks: Vec<BlockId>,
    /// `new_block_id -> source_original_block_id -> old_tag -> new_tag`.
    ///
    /// spec.md §4.2 describes this as `block-id -> name -> (name, new_visit#)`;
    /// we key by the *old visit tag* rather than bare isolate name because a
    /// single isolate can visit the same original block more than once
    /// (invariant 4 in spec.md §3), and by *source block id* because a merge
    /// combines two distinct original blocks whose tag sets may collide.
    pub blk_map: IndexMap<BlockId, IndexMap<BlockId, IndexMap<VisitTag, VisitTag>>>,
}

impl Block {
    pub fn from_sequence(id_gen: &mut IdGenerator, name: &str, seq: &str) -> Block {
        let mut muts = IndexMap::new();
        muts.insert((name.to_string(), 0), BTreeMap::new());
        Block {
            id: id_gen.next_id(),
            consensus: sequence::as_array(seq),
            muts,
        }
    }

    pub fn depth(&self) -> usize {
        self.muts.len()
    }

    /// The consensus with any literal gap characters stripped.
    pub fn sequence(&self) -> Vec<u8> {
        self.consensus.iter().copied().filter(|&b| b != b'-').collect()
    }

    pub fn length(&self) -> usize {
        self.sequence().len()
    }

    pub fn has(&self, iso: &str) -> bool {
        self.muts.keys().any(|(i, _)| i == iso)
    }

    /// Assign a fresh visit number: the smallest `n >= 0` such that
    /// `(iso, n)` is not already a key.
    pub fn push(&mut self, iso: &str, muts: BTreeMap<usize, u8>) -> VisitTag {
        let mut n = 0usize;
        while self.muts.contains_key(&(iso.to_string(), n)) {
            n += 1;
        }
        let tag = (iso.to_string(), n);
        self.muts.insert(tag.clone(), muts);
        tag
    }

    pub fn extract(&self, iso: &str, visit: usize, strip_gaps: bool) -> Result<String, PangraphError> {
        let tag = (iso.to_string(), visit);
        let m = self
            .muts
            .get(&tag)
            .ok_or_else(|| PangraphError::MissingVisit(format!("{}:{} not in block {}", iso, visit, self.id)))?;

        let mut tmp = self.consensus.clone();
        for (&p, &b) in m.iter() {
            if p >= tmp.len() {
                return Err(PangraphError::OutOfRangeMutation(format!(
                    "{}:{} position {} >= consensus length {} in block {}",
                    iso, visit, p, tmp.len(), self.id
                )));
            }
            tmp[p] = b;
        }

        if strip_gaps {
            tmp.retain(|&b| b != b'-');
        }

        if tmp.is_empty() {
            return Err(PangraphError::MissingVisit(format!(
                "{}:{} reconstructs to an empty sequence in block {}",
                iso, visit, self.id
            )));
        }

        Ok(sequence::as_string(&tmp))
    }

    pub fn length_of(&self, iso: &str, visit: usize) -> Result<usize, PangraphError> {
        let tag = (iso.to_string(), visit);
        let m = self
            .muts
            .get(&tag)
            .ok_or_else(|| PangraphError::MissingVisit(format!("{}:{} not in block {}", iso, visit, self.id)))?;
        let gaplen = m.values().filter(|&&b| b == b'-').count();
        Ok(self.consensus.len() - gaplen)
    }

    pub fn is_empty(&self, iso: &str, visit: usize) -> bool {
        let tag = (iso.to_string(), visit);
        match self.muts.get(&tag) {
            None => true,
            Some(m) => {
                let mut tmp = self.consensus.clone();
                for (&p, &b) in m.iter() {
                    if p < tmp.len() {
                        tmp[p] = b;
                    }
                }
                tmp.is_empty() || tmp.iter().all(|&b| b == b'-')
            }
        }
    }

    pub fn reverse_complement(&self, id_gen: &mut IdGenerator) -> Block {
        let rc = sequence::reverse_complement(&self.consensus);
        let l = self.consensus.len();
        let mut muts = IndexMap::new();
        for (tag, m) in self.muts.iter() {
            let nm: BTreeMap<usize, u8> = m
                .iter()
                .map(|(&p, &b)| (l - 1 - p, sequence::complement_base(b)))
                .collect();
            muts.insert(tag.clone(), nm);
        }
        Block {
            id: id_gen.next_id(),
            consensus: rc,
            muts,
        }
    }

    pub fn marginalize(&mut self, isolates: &HashSet<String>) {
        self.muts.retain(|(iso, _), _| isolates.contains(iso));
    }

    pub fn copy(&self, id_gen: &mut IdGenerator) -> Block {
        Block {
            id: id_gen.next_id(),
            consensus: self.consensus.clone(),
            muts: self.muts.clone(),
        }
    }

    /// `block[start:stop]` in ungapped coordinates (spec.md §4.2 `slice`).
    pub fn slice(&self, start: usize, stop: usize, id_gen: &mut IdGenerator) -> Result<Block, PangraphError> {
        let offsets: Vec<usize> = self
            .consensus
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != b'-')
            .map(|(i, _)| i)
            .collect();

        if start >= stop || stop > offsets.len() {
            return Err(PangraphError::OutOfRangeMutation(format!(
                "slice [{}, {}) out of range for block {} of ungapped length {}",
                start, stop, self.id, offsets.len()
            )));
        }

        let s = offsets[start];
        let e = offsets[stop - 1] + 1;

        let mut muts = IndexMap::new();
        for (tag, m) in self.muts.iter() {
            let nm: BTreeMap<usize, u8> = m
                .iter()
                .filter(|(&p, _)| p >= s && p < e)
                .map(|(&p, &c)| (p - s, c))
                .collect();
            muts.insert(tag.clone(), nm);
        }

        Ok(Block {
            id: id_gen.next_id(),
            consensus: self.consensus[s..e].to_vec(),
            muts,
        })
    }

    /// Concatenate blocks that share an identical mutation-key set,
    /// shifting each subsequent block's positions by the running offset.
    pub fn concatenate(blocks: &[Block], id_gen: &mut IdGenerator) -> Result<Block, PangraphError> {
        if blocks.is_empty() {
            return Err(PangraphError::MismatchedConcatenateKeys(
                "concatenate called with no blocks".to_string(),
            ));
        }

        let keyset: BTreeSet<VisitTag> = blocks[0].muts.keys().cloned().collect();
        for b in &blocks[1..] {
            let ks: BTreeSet<VisitTag> = b.muts.keys().cloned().collect();
            if ks != keyset {
                return Err(PangraphError::MismatchedConcatenateKeys(format!(
                    "block {} has a different mutation-key set than block {}",
                    b.id, blocks[0].id
                )));
            }
        }

        let mut muts: IndexMap<VisitTag, BTreeMap<usize, u8>> =
            blocks[0].muts.keys().map(|k| (k.clone(), BTreeMap::new())).collect();
        let mut consensus = Vec::new();
        let mut offset = 0usize;
        for b in blocks {
            for (tag, m) in b.muts.iter() {
                let entry = muts.get_mut(tag).expect("key sets verified equal above");
                for (&p, &c) in m.iter() {
                    entry.insert(p + offset, c);
                }
            }
            consensus.extend_from_slice(&b.consensus);
            offset += b.consensus.len();
        }

        Ok(Block {
            id: id_gen.next_id(),
            consensus,
            muts,
        })
    }

    /// Keep the consensus majority invariant (spec.md §4.2.2, §8): after
    /// this call no single `(position, base)` mutation is carried by more
    /// than half of the block's visits. Positions are processed in sorted
    /// order and at most one swap per position is performed, selecting the
    /// single strict-majority allele (ties broken by byte value) -- this
    /// resolves the open question in spec.md §9(c) about non-biallelic
    /// positions flipping more than once.
    pub fn update_consensus(&mut self) {
        let total = self.muts.len();
        if total == 0 {
            return;
        }

        let mut by_pos: BTreeMap<usize, HashMap<u8, Vec<VisitTag>>> = BTreeMap::new();
        for (tag, m) in self.muts.iter() {
            for (&p, &b) in m.iter() {
                by_pos.entry(p).or_default().entry(b).or_default().push(tag.clone());
            }
        }

        for (pos, alleles) in by_pos {
            let mut best: Option<(u8, usize)> = None;
            for (&base, tags) in alleles.iter() {
                let count = tags.len();
                if count * 2 <= total {
                    continue;
                }
                best = match best {
                    None => Some((base, count)),
                    Some((bb, bc)) if count > bc || (count == bc && base < bb) => Some((base, count)),
                    other => other,
                };
            }

            if let Some((new_base, _)) = best {
                let consensus_base = self.consensus[pos];
                let carriers: HashSet<VisitTag> = alleles[&new_base].iter().cloned().collect();
                self.consensus[pos] = new_base;

                for tag in &carriers {
                    self.muts.get_mut(tag).expect("tag collected from self.muts above").remove(&pos);
                }
                let all_tags: Vec<VisitTag> = self.muts.keys().cloned().collect();
                for tag in all_tags {
                    if !carriers.contains(&tag) {
                        self.muts.get_mut(&tag).unwrap().insert(pos, consensus_base);
                    }
                }
                trace!("update_consensus: block {} pos {} -> {}", self.id, pos, new_base as char);
            }
        }
    }

    /// Fold an alignment hit into newly split sub-blocks, translating each
    /// side's original mutation table through the sub-block's coordinate
    /// map (spec.md §4.2, §4.2.1).
    pub fn from_alignment(
        hit: &Hit,
        qry_block_id: &str,
        orig_qry_muts: &IndexMap<VisitTag, BTreeMap<usize, u8>>,
        ref_block_id: &str,
        orig_ref_muts: &IndexMap<VisitTag, BTreeMap<usize, u8>>,
        cfg: &MergeConfig,
        id_gen: &mut IdGenerator,
    ) -> Result<FromAlignmentResult, PangraphError> {
        let mut split_out = cigar_splitter::split(&hit.cigar, &hit.qry_seq, &hit.ref_seq, cfg.cutoff)?;
        split_out.shift(hit.qry_cluster.0 as i64, hit.ref_cluster.0 as i64);

        let mut new_blocks = Vec::with_capacity(split_out.blocks.len());
        let mut qry_blocks = Vec::new();
        let mut ref_blocks = Vec::new();
        let mut shared_blocks = Vec::new();
        let mut blk_map: IndexMap<BlockId, IndexMap<BlockId, IndexMap<VisitTag, VisitTag>>> = IndexMap::new();

        for (i, sub) in split_out.blocks.iter().enumerate() {
            let mut block = Block {
                id: id_gen.next_id(),
                consensus: sub.consensus.clone(),
                muts: IndexMap::new(),
            };
            let mut per_source: IndexMap<BlockId, IndexMap<VisitTag, VisitTag>> = IndexMap::new();

            if let Some(ival) = split_out.qrys[i] {
                let mapping = update_muts(&mut block, &sub.qry_muts, &sub.qry_coordmap, orig_qry_muts, ival)?;
                per_source.insert(qry_block_id.to_string(), mapping);
            }
            if let Some(ival) = split_out.refs[i] {
                let mapping = update_muts(&mut block, &sub.ref_muts, &sub.ref_coordmap, orig_ref_muts, ival)?;
                per_source.insert(ref_block_id.to_string(), mapping);
            }

            block.update_consensus();

            if split_out.qrys[i].is_some() {
                qry_blocks.push(block.id.clone());
            }
            if split_out.refs[i].is_some() {
                ref_blocks.push(block.id.clone());
            }
            if split_out.qrys[i].is_some() && split_out.refs[i].is_some() {
                shared_blocks.push(block.id.clone());
            }

            blk_map.insert(block.id.clone(), per_source);
            new_blocks.push(block);
        }

        if hit.orientation == Strand::Minus {
            qry_blocks.reverse();
        }

        Ok(FromAlignmentResult {
            new_blocks,
            qry_blocks,
            ref_blocks,
            shared_blocks,
            blk_map,
        })
    }
}

/// spec.md §4.2.1: fold one side's sub-block-local mutations (`xtramuts`)
/// together with the original block's per-isolate mutation table (`orig_muts`,
/// restricted to the sub-block's own interval `ival` and translated through
/// `coordmap`) into `block`, pushing a fresh visit for every isolate-visit
/// tag present on this side of the original block.
fn update_muts(
    block: &mut Block,
    xtramuts: &BTreeMap<usize, u8>,
    coordmap: &cigar_splitter::CoordMap,
    orig_muts: &IndexMap<VisitTag, BTreeMap<usize, u8>>,
    ival: (usize, usize),
) -> Result<IndexMap<VisitTag, VisitTag>, PangraphError> {
    let mut mapping = IndexMap::new();

    for (tag, muts) in orig_muts.iter() {
        let (iso, _old_visit) = tag;

        let opos: Vec<usize> = muts
            .keys()
            .copied()
            .filter(|&p| p >= ival.0 && p < ival.1)
            .collect();

        let mut newmuts: BTreeMap<usize, u8> = BTreeMap::new();
        for op in opos {
            let np = coordmap.translate(op as i64);
            if np < 0 || np as usize >= block.consensus.len() {
                return Err(PangraphError::OutOfRangeMutation(format!(
                    "translated position {} out of range for block {} (len {})",
                    np, block.id, block.consensus.len()
                )));
            }
            newmuts.insert(np as usize, *muts.get(&op).expect("key came from this map"));
        }

        for (&p, &n) in xtramuts.iter() {
            if newmuts.get(&p) == Some(&block.consensus[p]) {
                newmuts.remove(&p);
            } else {
                newmuts.insert(p, n);
            }
        }

        let new_tag = block.push(iso, newmuts);
        mapping.insert(tag.clone(), new_tag);
    }

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen() -> IdGenerator {
        IdGenerator::new(0)
    }

    #[test]
    fn from_sequence_builds_single_visit_block() {
        let mut g = gen();
        let b = Block::from_sequence(&mut g, "S1", "ACGTACGT");
        assert_eq!(b.length(), 8);
        assert_eq!(b.depth(), 1);
        assert_eq!(b.extract("S1", 0, true).unwrap(), "ACGTACGT");
    }

    #[test]
    fn push_assigns_smallest_unused_visit() {
        let mut g = gen();
        let mut b = Block::from_sequence(&mut g, "S1", "ACGT");
        let tag1 = b.push("S1", BTreeMap::new());
        assert_eq!(tag1, ("S1".to_string(), 1));
        b.muts.shift_remove(&("S1".to_string(), 0));
        let tag2 = b.push("S1", BTreeMap::new());
        assert_eq!(tag2, ("S1".to_string(), 0));
    }

    #[test]
    fn extract_overlays_mutations() {
        let mut g = gen();
        let mut b = Block::from_sequence(&mut g, "S1", "AAAA");
        let mut m = BTreeMap::new();
        m.insert(1, b'C');
        b.push("S2", m);
        assert_eq!(b.extract("S1", 0, true).unwrap(), "AAAA");
        assert_eq!(b.extract("S2", 0, true).unwrap(), "ACAA");
    }

    #[test]
    fn reverse_complement_is_involutive_on_sequence() {
        let mut g = gen();
        let mut b = Block::from_sequence(&mut g, "S1", "AAACCCGGG");
        let mut m = BTreeMap::new();
        m.insert(2, b'T');
        b.push("S2", m);

        let rc = b.reverse_complement(&mut g);
        let rc2 = rc.reverse_complement(&mut g);
        assert_eq!(rc2.extract("S1", 0, true).unwrap(), b.extract("S1", 0, true).unwrap());
        assert_eq!(rc2.extract("S2", 0, true).unwrap(), b.extract("S2", 0, true).unwrap());
    }

    #[test]
    fn slice_round_trips_against_extract() {
        let mut g = gen();
        let mut b = Block::from_sequence(&mut g, "S1", "AAACCCGGGTTT");
        let mut m = BTreeMap::new();
        m.insert(5, b'A');
        b.push("S2", m);

        let full = b.extract("S2", 0, true).unwrap();
        let sliced = b.slice(3, 9, &mut g).unwrap();
        assert_eq!(sliced.extract("S2", 0, true).unwrap(), &full[3..9]);
    }

    #[test]
    fn update_consensus_enforces_majority_bound() {
        let mut g = gen();
        let mut b = Block::from_sequence(&mut g, "S1", "AAACCCGGG");
        b.muts.clear();
        let mut m_g = BTreeMap::new();
        m_g.insert(4, b'G');
        b.push("S1", BTreeMap::new());
        b.push("S2", m_g);
        b.push("S3", BTreeMap::new());

        b.update_consensus();
        for (tag, m) in b.muts.iter() {
            if let Some(&base) = m.get(&4) {
                assert_ne!(base, b.consensus[4], "mutation at {:?} must differ from new consensus", tag);
            }
        }
        let carriers = b.muts.values().filter(|m| m.contains_key(&4)).count();
        assert!(carriers * 2 < b.muts.len());
    }

    #[test]
    fn concatenate_requires_matching_keys() {
        let mut g = gen();
        let b1 = Block::from_sequence(&mut g, "S1", "AAAA");
        let b2 = Block::from_sequence(&mut g, "S2", "CCCC");
        assert!(Block::concatenate(&[b1, b2], &mut g).is_err());
    }

    #[test]
    fn concatenate_shifts_positions() {
        let mut g = gen();
        let mut b1 = Block::from_sequence(&mut g, "S1", "AAAA");
        b1.muts.clear();
        let mut m1 = BTreeMap::new();
        m1.insert(1, b'C');
        b1.push("S1", m1);

        let mut b2 = Block::from_sequence(&mut g, "S1", "GGGG");
        b2.muts.clear();
        let mut m2 = BTreeMap::new();
        m2.insert(0, b'T');
        b2.push("S1", m2);

        let cat = Block::concatenate(&[b1, b2], &mut g).unwrap();
        assert_eq!(cat.extract("S1", 0, true).unwrap(), "ACAAGTGG");
    }

    /// spec.md §4.2.1 step 4: when a position is covered by both the
    /// translated original mutation table and the side-specific table, and
    /// the two disagree, the side-specific base must win -- not be silently
    /// dropped in favor of the stale original one.
    #[test]
    fn update_muts_overwrites_conflicting_original_mutation() {
        let mut g = gen();
        let mut block = Block {
            id: g.next_id(),
            consensus: sequence::as_array("AAAA"),
            muts: IndexMap::new(),
        };

        let mut orig_muts = IndexMap::new();
        let mut m = BTreeMap::new();
        m.insert(1, b'T');
        orig_muts.insert(("S1".to_string(), 0), m);

        let identity = cigar_splitter::CoordMap {
            anchors: vec![0],
            deltas: vec![0],
        };

        let mut xtramuts = BTreeMap::new();
        xtramuts.insert(1, b'G');

        let mapping = update_muts(&mut block, &xtramuts, &identity, &orig_muts, (0, 4)).unwrap();
        let new_tag = mapping[&("S1".to_string(), 0)].clone();
        assert_eq!(block.muts[&new_tag].get(&1), Some(&b'G'));
    }
}
