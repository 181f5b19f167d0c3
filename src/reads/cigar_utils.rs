use rust_htslib::bam::record::Cigar;

/// Small CIGAR operator predicates, grounded on the `CigarUtils` helper
/// struct used throughout this codebase's read-handling code
/// (`reads::cigar_builder`, `reads::read_clipper` in the wider project).
/// `reads::cigar_splitter` uses `is_clipping` to recognize soft/hard clips.
pub struct CigarUtils {}

impl CigarUtils {
    /// Does this operator consume bases from the query/read?
    pub fn consumes_read_bases(cig: &Cigar) -> bool {
        matches!(
            cig,
            Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) | Cigar::Ins(_) | Cigar::SoftClip(_)
        )
    }

    /// Does this operator consume bases from the reference?
    pub fn consumes_reference_bases(cig: &Cigar) -> bool {
        matches!(
            cig,
            Cigar::Match(_) | Cigar::Del(_) | Cigar::RefSkip(_) | Cigar::Equal(_) | Cigar::Diff(_)
        )
    }

    pub fn is_clipping(cig: &Cigar) -> bool {
        matches!(cig, Cigar::SoftClip(_) | Cigar::HardClip(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_consumes_both() {
        let m = Cigar::Match(5);
        assert!(CigarUtils::consumes_read_bases(&m));
        assert!(CigarUtils::consumes_reference_bases(&m));
    }

    #[test]
    fn deletion_consumes_reference_only() {
        let d = Cigar::Del(5);
        assert!(!CigarUtils::consumes_read_bases(&d));
        assert!(CigarUtils::consumes_reference_bases(&d));
    }

    #[test]
    fn insertion_consumes_read_only() {
        let i = Cigar::Ins(5);
        assert!(CigarUtils::consumes_read_bases(&i));
        assert!(!CigarUtils::consumes_reference_bases(&i));
    }

    #[test]
    fn hard_clip_consumes_neither() {
        let h = Cigar::HardClip(5);
        assert!(!CigarUtils::consumes_read_bases(&h));
        assert!(!CigarUtils::consumes_reference_bases(&h));
        assert!(CigarUtils::is_clipping(&h));
    }
}
