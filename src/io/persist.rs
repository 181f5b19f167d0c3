use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::MergeConfig;
use crate::graphs::block::{Block, BlockId, VisitTag};
use crate::graphs::graph::Graph;
use crate::graphs::node::{BlockHandle, Node};
use crate::graphs::path::Path;
use crate::utils::errors::PangraphError;
use crate::utils::ids::IdGenerator;
use crate::utils::sequence::{self, Strand};

/// Separator between isolate name and visit number in a packed mutation-map
/// key (spec.md §6).
const VISIT_SEP: &str = "?###?";

/// `{ "tree": { "graph": [...], "paths": [...] } }` (spec.md §6). spec.md
/// only spells out the block array's wrapper key; the path list is placed
/// alongside it under the same `tree` object since a persisted graph must
/// round-trip both to be useful to a caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedGraph {
    pub tree: TreeDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreeDto {
    pub graph: Vec<BlockDto>,
    #[serde(default)]
    pub paths: Vec<PathDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockDto {
    pub id: String,
    pub seq: String,
    pub muts: IndexMap<String, BTreeMap<usize, char>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: BlockId,
    pub num: usize,
    pub strand: i8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PathDto {
    pub name: String,
    pub offset: usize,
    pub circular: bool,
    pub nodes: Vec<NodeDto>,
}

fn pack_tag(tag: &VisitTag) -> String {
    format!("{}{}{}", tag.0, VISIT_SEP, tag.1)
}

fn unpack_tag(key: &str) -> Result<VisitTag, PangraphError> {
    let (iso, visit) = key
        .split_once(VISIT_SEP)
        .ok_or_else(|| PangraphError::InconsistentBookkeeping(format!("malformed packed visit key: {}", key)))?;
    let visit: usize = visit
        .parse()
        .map_err(|_| PangraphError::InconsistentBookkeeping(format!("non-numeric visit in packed key: {}", key)))?;
    Ok((iso.to_string(), visit))
}

pub fn block_to_dto(block: &Block) -> BlockDto {
    let mut muts = IndexMap::new();
    for (tag, m) in block.muts.iter() {
        let packed: BTreeMap<usize, char> = m.iter().map(|(&p, &b)| (p, b as char)).collect();
        muts.insert(pack_tag(tag), packed);
    }
    BlockDto {
        id: block.id.clone(),
        seq: sequence::as_string(&block.consensus),
        muts,
    }
}

pub fn dto_to_block(dto: BlockDto) -> Result<Block, PangraphError> {
    let mut muts = IndexMap::new();
    for (key, m) in dto.muts {
        let tag = unpack_tag(&key)?;
        let inner: BTreeMap<usize, u8> = m.into_iter().map(|(p, c)| (p, c as u8)).collect();
        muts.insert(tag, inner);
    }
    Ok(Block {
        id: dto.id,
        consensus: sequence::as_array(&dto.seq),
        muts,
    })
}

pub fn path_to_dto(path: &Path) -> PathDto {
    PathDto {
        name: path.name.clone(),
        offset: path.offset,
        circular: path.circular,
        nodes: path
            .nodes
            .iter()
            .map(|n| NodeDto {
                id: n.block_id(),
                num: n.visit,
                strand: n.strand.as_i8(),
            })
            .collect(),
    }
}

pub fn graph_to_json(graph: &Graph) -> Result<String, PangraphError> {
    let blocks: Vec<BlockDto> = graph.blocks.values().map(|b| block_to_dto(&b.borrow())).collect();
    let paths: Vec<PathDto> = graph.paths.values().map(path_to_dto).collect();
    let persisted = PersistedGraph {
        tree: TreeDto { graph: blocks, paths },
    };
    serde_json::to_string_pretty(&persisted)
        .map_err(|e| PangraphError::InconsistentBookkeeping(format!("failed to serialize graph: {}", e)))
}

pub fn graph_from_json(json: &str, cfg: MergeConfig) -> Result<Graph, PangraphError> {
    let persisted: PersistedGraph = serde_json::from_str(json)
        .map_err(|e| PangraphError::InconsistentBookkeeping(format!("failed to parse graph: {}", e)))?;

    let mut blocks: IndexMap<BlockId, BlockHandle> = IndexMap::new();
    for dto in persisted.tree.graph {
        let block = dto_to_block(dto)?;
        blocks.insert(block.id.clone(), Rc::new(RefCell::new(block)));
    }

    let mut paths = IndexMap::new();
    for pdto in persisted.tree.paths {
        let mut nodes = Vec::with_capacity(pdto.nodes.len());
        for ndto in &pdto.nodes {
            let handle = blocks.get(&ndto.id).ok_or_else(|| {
                PangraphError::NodeNotFound(format!("path {} references unknown block {}", pdto.name, ndto.id))
            })?;
            nodes.push(Node::new(handle.clone(), ndto.num, Strand::from_i8(ndto.strand)?));
        }
        let mut path = Path::new(&pdto.name, nodes, pdto.circular)?;
        path.offset = pdto.offset;
        paths.insert(pdto.name.clone(), path);
    }

    Ok(Graph {
        blocks,
        paths,
        id_gen: IdGenerator::new(cfg.id_seed),
        cfg,
    })
}
