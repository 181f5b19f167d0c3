use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::utils::errors::PangraphError;

/// Strand / orientation of a node or alignment. `Null` is reserved for
/// unset/uninitialized state and is never produced by the merge algorithm
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Plus,
    Minus,
    Null,
}

impl Strand {
    /// Malformed input (spec.md §7): a `strand`/`orientation` value outside
    /// `{-1,0,1}` is caller-visible fatal, not a panic -- this is reachable
    /// directly from parsing a persisted graph or an input document.
    pub fn from_i8(v: i8) -> Result<Strand, PangraphError> {
        match v {
            1 => Ok(Strand::Plus),
            -1 => Ok(Strand::Minus),
            0 => Ok(Strand::Null),
            other => Err(PangraphError::MalformedInput(format!(
                "invalid strand value {} (expected -1, 0, or 1)",
                other
            ))),
        }
    }

    pub fn as_i8(&self) -> i8 {
        match self {
            Strand::Plus => 1,
            Strand::Minus => -1,
            Strand::Null => 0,
        }
    }

    /// `complement(s)` flips Plus<->Minus and fixes Null, per spec.md §4.3.
    pub fn complement(&self) -> Strand {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
            Strand::Null => Strand::Null,
        }
    }
}

/// `compose(s, t) = Plus if s == t else Minus`.
///
/// Associative in the sense spec.md §8 tests: `compose(compose(a,b),c) ==
/// compose(a,compose(b,c))` and `compose(s, Plus) == s`.
pub fn compose(s: Strand, t: Strand) -> Strand {
    if s == t {
        Strand::Plus
    } else {
        Strand::Minus
    }
}

lazy_static! {
    /// Watson-Crick complement table, grounded on `pangraph.utils.wcpair`:
    /// only the four canonical bases pair; everything else (N, gap) maps to
    /// itself.
    static ref WC_PAIR: HashMap<u8, u8> = {
        let mut m = HashMap::new();
        m.insert(b'A', b'T');
        m.insert(b'T', b'A');
        m.insert(b'C', b'G');
        m.insert(b'G', b'C');
        m
    };
}

/// Complement a single base. Unrecognized symbols (`N`, `-`) are fixed
/// points, matching `pangraph.utils.wcpair.get(c, c)`.
pub fn complement_base(base: u8) -> u8 {
    *WC_PAIR.get(&base).unwrap_or(&base)
}

/// Reverse-complement a byte array over the `{A,C,G,T,N,-}` alphabet.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|b| complement_base(*b)).collect()
}

/// `as_array`: a `&str` into the consensus byte-array representation.
pub fn as_array(seq: &str) -> Vec<u8> {
    seq.as_bytes().to_vec()
}

/// `as_string`: the consensus byte-array representation back into a `String`.
pub fn as_string(seq: &[u8]) -> String {
    String::from_utf8_lossy(seq).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_flips_canonical_bases() {
        assert_eq!(complement_base(b'A'), b'T');
        assert_eq!(complement_base(b'C'), b'G');
        assert_eq!(complement_base(b'N'), b'N');
        assert_eq!(complement_base(b'-'), b'-');
    }

    #[test]
    fn reverse_complement_reverses_and_complements() {
        assert_eq!(reverse_complement(b"ACGT"), b"ACGT");
        assert_eq!(reverse_complement(b"AAGGNN--"), b"--NNCCTT");
    }

    #[test]
    fn strand_composition_matches_spec() {
        use Strand::*;
        assert_eq!(compose(Plus, Plus), Plus);
        assert_eq!(compose(Plus, Minus), Minus);
        assert_eq!(compose(Minus, Minus), Plus);
        for s in [Plus, Minus] {
            assert_eq!(compose(s, Plus), s);
        }
    }

    #[test]
    fn strand_composition_is_associative() {
        use Strand::*;
        for &a in &[Plus, Minus] {
            for &b in &[Plus, Minus] {
                for &c in &[Plus, Minus] {
                    assert_eq!(compose(compose(a, b), c), compose(a, compose(b, c)));
                }
            }
        }
    }

    #[test]
    fn complement_fixes_null() {
        assert_eq!(Strand::Null.complement(), Strand::Null);
        assert_eq!(Strand::Plus.complement(), Strand::Minus);
    }

    #[test]
    fn from_i8_accepts_the_three_valid_values() {
        assert_eq!(Strand::from_i8(1).unwrap(), Strand::Plus);
        assert_eq!(Strand::from_i8(-1).unwrap(), Strand::Minus);
        assert_eq!(Strand::from_i8(0).unwrap(), Strand::Null);
    }

    #[test]
    fn from_i8_rejects_out_of_range_values_as_an_error_not_a_panic() {
        assert!(matches!(Strand::from_i8(2), Err(PangraphError::MalformedInput(_))));
        assert!(matches!(Strand::from_i8(-5), Err(PangraphError::MalformedInput(_))));
    }
}
