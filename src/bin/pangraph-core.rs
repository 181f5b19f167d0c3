use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use serde::Deserialize;

use pangraph_core::config::MergeConfig;
use pangraph_core::graphs::graph::Graph;
use pangraph_core::io::hit::{Hit, SeqSpan};
use pangraph_core::io::persist;
use pangraph_core::utils::errors::PangraphError;
use pangraph_core::utils::sequence::Strand;

/// Fold a set of pre-computed alignment hits into a pan-genome block/path
/// graph and persist the result as JSON.
///
/// This binary is a thin driver over the core merge engine: the guide-tree
/// traversal order and the alignment step itself (minimap2 or equivalent)
/// are expected to have already run upstream, producing the ordered hit
/// list consumed here.
#[derive(Parser, Debug)]
#[command(name = "pangraph-core", version, about)]
struct Args {
    /// JSON document of input sequences and ordered alignment hits.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the persisted graph JSON. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Minimum length of an unaligned run that forces a standalone block.
    #[arg(long, default_value_t = MergeConfig::default().cutoff)]
    cutoff: usize,

    /// Seed for the deterministic block-id generator.
    #[arg(long, default_value_t = MergeConfig::default().id_seed)]
    id_seed: u64,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Deserialize)]
struct InputSequence {
    name: String,
    seq: String,
    #[serde(default)]
    circular: bool,
}

#[derive(Debug, Deserialize)]
struct InputSpan {
    name: String,
    len: usize,
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
struct InputHit {
    qry: InputSpan,
    #[serde(rename = "ref")]
    reference: InputSpan,
    cigar: String,
    orientation: i8,
    qry_seq: String,
    ref_seq: String,
    qry_cluster: (usize, usize),
    ref_cluster: (usize, usize),
}

#[derive(Debug, Deserialize)]
struct InputDocument {
    sequences: Vec<InputSequence>,
    #[serde(default)]
    hits: Vec<InputHit>,
}

impl TryFrom<InputHit> for Hit {
    type Error = PangraphError;

    fn try_from(h: InputHit) -> Result<Hit, PangraphError> {
        Ok(Hit {
            qry: SeqSpan {
                name: h.qry.name,
                len: h.qry.len,
                start: h.qry.start,
                end: h.qry.end,
            },
            reference: SeqSpan {
                name: h.reference.name,
                len: h.reference.len,
                start: h.reference.start,
                end: h.reference.end,
            },
            cigar: h.cigar,
            orientation: Strand::from_i8(h.orientation)?,
            qry_seq: h.qry_seq.into_bytes(),
            ref_seq: h.ref_seq.into_bytes(),
            qry_cluster: h.qry_cluster,
            ref_cluster: h.ref_cluster,
        })
    }
}

fn set_log_level(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new().filter_level(level).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_level(args.verbose);

    let cfg = MergeConfig {
        cutoff: args.cutoff,
        id_seed: args.id_seed,
    };

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading input document {}", args.input.display()))?;
    let doc: InputDocument = serde_json::from_str(&raw).context("parsing input document")?;

    let mut graph = Graph::new(cfg);
    for s in &doc.sequences {
        graph
            .add_sequence(&s.name, &s.seq, s.circular)
            .with_context(|| format!("adding sequence {}", s.name))?;
    }

    info!("loaded {} sequences, {} hits to apply", graph.paths.len(), doc.hits.len());

    for (i, h) in doc.hits.into_iter().enumerate() {
        let hit: Hit = h.try_into().with_context(|| format!("parsing hit {}", i))?;
        graph.merge_hit(&hit).with_context(|| format!("applying hit {}", i))?;
    }

    info!("graph has {} blocks, {} paths after merging", graph.blocks.len(), graph.paths.len());

    let json = persist::graph_to_json(&graph).context("serializing graph")?;
    match args.output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("writing output {}", path.display()))?;
        }
        None => println!("{}", json),
    }

    Ok(())
}
