/// Outcome of N trimming over a working window, in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NTrim {
    /// No `N` bases, or too few of them to matter.
    Untouched,
    Trimmed { start: usize, end: usize, perc_n: f64 },
    /// Nothing could be trimmed but the read holds too many `N` bases.
    Invalid { perc_n: f64 },
}

#[derive(Debug, Clone)]
pub struct NTrimmer {
    pub max_perc_n: f64,
    /// Fixed search distance from either end; overrides `perc`.
    pub dist: Option<usize>,
    /// Search distance as a percentage of the remaining length.
    pub perc: f64,
}

impl Default for NTrimmer {
    fn default() -> Self {
        Self { max_perc_n: 5.0, dist: None, perc: 12.0 }
    }
}

impl NTrimmer {
    fn allowance(&self, len: usize) -> usize {
        match self.dist {
            Some(d) => d,
            None => ((self.perc * len as f64 / 100.0).round() as usize).clamp(1, 20),
        }
    }

    /// Repeatedly moves each end past the nearest `N` within the allowance,
    /// until a pass moves nothing.
    pub fn trim(&self, seq: &[u8]) -> NTrim {
        let npos: Vec<usize> = seq.iter().enumerate().filter(|&(_, &b)| b == b'N').map(|(i, _)| i).collect();
        if npos.is_empty() {
            return NTrim::Untouched;
        }
        let (mut start, mut end) = (0, seq.len());
        let (mut lo, mut hi) = (0, npos.len());
        while end >= start + 3 && lo < hi {
            let t5 = npos[lo] - start;
            let t3 = end - 1 - npos[hi - 1];
            let inside = hi - lo;
            let v = self.allowance(end - start);
            if t5 <= v {
                start = npos[lo] + 1;
                lo += 1;
            }
            if t3 <= v {
                end = npos[hi - 1];
                hi -= 1;
            }
            if hi.saturating_sub(lo) == inside {
                break;
            }
        }
        let end = end.max(start);
        let perc_n = if hi > lo && end > start { (hi - lo) as f64 * 100.0 / (end - start) as f64 } else { 0.0 };
        if start > 0 || end < seq.len() {
            NTrim::Trimmed { start, end, perc_n }
        } else if perc_n > self.max_perc_n {
            NTrim::Invalid { perc_n }
        } else {
            NTrim::Untouched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_no_n_is_untouched() {
        assert_eq!(NTrimmer::default().trim(b"ACGTACGTACGT"), NTrim::Untouched);
    }

    #[test]
    fn test_internal_n_block_is_invalid() {
        match NTrimmer::default().trim(b"ACGTNNNNACGT") {
            NTrim::Invalid { perc_n } => assert!((perc_n - 100.0 / 3.0).abs() < 1e-9),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[rstest]
    #[case(b"NACGTACGTACGTACGTACGT", 1, 21)]
    #[case(b"ACGTACGTACGTACGTACGTN", 0, 20)]
    #[case(b"NNACGTACGTACGTACGTACGTNN", 2, 22)]
    #[case(b"ANCGTACGTACGTACGTACGTACGA", 2, 25)]
    fn test_terminal_ns_are_trimmed(#[case] seq: &[u8], #[case] start: usize, #[case] end: usize) {
        match NTrimmer::default().trim(seq) {
            NTrim::Trimmed { start: s, end: e, perc_n } => {
                assert_eq!((s, e), (start, end));
                assert_eq!(perc_n, 0.0);
            }
            other => panic!("expected trim, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_distance() {
        let t = NTrimmer { dist: Some(4), ..NTrimmer::default() };
        match t.trim(b"ACGNTTGCATGCATGCATGCA") {
            NTrim::Trimmed { start, end, .. } => assert_eq!((start, end), (4, 21)),
            other => panic!("expected trim, got {other:?}"),
        }
    }

    fn count_n(seq: &[u8]) -> usize {
        seq.iter().filter(|&&b| b == b'N').count()
    }

    proptest! {
        #[test]
        fn prop_trim_stays_in_bounds_and_never_adds_ns(seq in "[ACGTN]{0,80}") {
            let seq = seq.into_bytes();
            let t = NTrimmer::default();
            match t.trim(&seq) {
                NTrim::Trimmed { start, end, perc_n } => {
                    prop_assert!(start <= end && end <= seq.len());
                    prop_assert!(count_n(&seq[start..end]) <= count_n(&seq));
                    prop_assert!((0.0..=100.0).contains(&perc_n));
                }
                NTrim::Invalid { perc_n } => prop_assert!(perc_n > t.max_perc_n),
                NTrim::Untouched => {}
            }
        }
    }
}
