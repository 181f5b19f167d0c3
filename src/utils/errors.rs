use std::fmt;

/// Fatal conditions raised by the core block/path merge engine.
///
/// Mirrors the `BirdToolError`-style error enum used throughout this
/// codebase: one variant per condition, each carrying a human-readable
/// message. Every condition listed here is a "must never occur in correct
/// use" assertion rather than a recoverable user error -- the caller is
/// expected to halt processing of the current hit and surface the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PangraphError {
    /// CIGAR string contained an operator outside `{M,I,D,S,H}`.
    MalformedCigar(String),
    /// CIGAR operator had length zero.
    EmptyCigarOp(String),
    /// A path references a block visit absent from the block's mutation map,
    /// or vice versa.
    InconsistentBookkeeping(String),
    /// A mutation position fell outside `[0, len(consensus))`.
    OutOfRangeMutation(String),
    /// `extract`/`length_of` was asked for an isolate-visit the block does
    /// not carry.
    MissingVisit(String),
    /// A wrap-around path merge (`begin > end`) was attempted on a linear
    /// (non-circular) path.
    WrapOnLinearPath(String),
    /// `Block::concatenate` was given blocks whose mutation-key sets differ.
    MismatchedConcatenateKeys(String),
    /// A block id named in a merge/replace could not be found in the path.
    NodeNotFound(String),
    /// A value from a persisted graph or input document was outside the
    /// range this crate's data model can represent (e.g. a strand/orientation
    /// value outside `{-1,0,1}`).
    MalformedInput(String),
}

impl fmt::Display for PangraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PangraphError::MalformedCigar(msg) => write!(f, "malformed CIGAR: {}", msg),
            PangraphError::EmptyCigarOp(msg) => write!(f, "zero-length CIGAR operator: {}", msg),
            PangraphError::InconsistentBookkeeping(msg) => {
                write!(f, "inconsistent block/path bookkeeping: {}", msg)
            }
            PangraphError::OutOfRangeMutation(msg) => {
                write!(f, "mutation position out of range: {}", msg)
            }
            PangraphError::MissingVisit(msg) => write!(f, "missing isolate visit: {}", msg),
            PangraphError::WrapOnLinearPath(msg) => {
                write!(f, "wrap-around merge on linear path: {}", msg)
            }
            PangraphError::MismatchedConcatenateKeys(msg) => {
                write!(f, "concatenate called with mismatched mutation keys: {}", msg)
            }
            PangraphError::NodeNotFound(msg) => write!(f, "node not found: {}", msg),
            PangraphError::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
        }
    }
}

impl std::error::Error for PangraphError {}

pub type Result<T> = std::result::Result<T, PangraphError>;
