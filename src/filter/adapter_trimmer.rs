use std::ops::Range;

use log::debug;

use super::adapter_index::{AdapterDescriptor, AdapterSet, Oriented};
use super::matcher::{Alignment, Matcher, Scoring};
use super::End;

/// How far an alignment may sit from the read or adapter end it is anchored to.
const END_TOLERANCE: usize = 3;

#[derive(Debug, Clone)]
pub struct AdapterParams {
    pub min_end_match: usize,
    pub pid5: f64,
    pub pid3: f64,
    pub scoring: Scoring,
}

impl Default for AdapterParams {
    fn default() -> Self {
        Self { min_end_match: 6, pid5: 96.0, pid3: 94.0, scoring: Scoring::default() }
    }
}

/// Result of a successful adapter search over a working window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterTrim {
    /// Part of the window that survives.
    pub keep: Range<usize>,
    /// Load-order index of the matching adapter.
    pub adapter: usize,
}

pub struct AdapterTrimmer {
    adapters: AdapterSet,
    params: AdapterParams,
}

impl AdapterTrimmer {
    pub fn new(adapters: AdapterSet, params: AdapterParams) -> Self {
        Self { adapters, params }
    }

    pub fn has_end(&self, end: End) -> bool {
        self.adapters.at_end(end).next().is_some()
    }

    /// Searches the adapters registered for `end` in `seq`.
    ///
    /// A strong hit ends the search; otherwise the best scoring hit over all
    /// adapters wins. The longer flank of the read is kept.
    pub fn trim(&self, seq: &[u8], end: End) -> Option<AdapterTrim> {
        let min_pid = match end {
            End::Five => self.params.pid5,
            End::Three => self.params.pid3,
        };
        let rlen = seq.len();
        let mut best: Option<(Alignment, &AdapterDescriptor)> = None;
        'adapters: for adapter in self.adapters.at_end(end) {
            for oriented in &adapter.orientations {
                let Some(aln) = self.match_adapter(seq, oriented, end, min_pid) else { continue };
                let strong = aln.len() >= adapter.min_align_len;
                if best.map_or(true, |(b, _)| aln.score > b.score) {
                    best = Some((aln, adapter));
                }
                if strong {
                    break 'adapters;
                }
            }
        }
        let (aln, adapter) = best?;
        debug!(
            "adapter {} ({:?}) matched read span {}..{} (adapter {}..{}, pid {:.1})",
            adapter.index,
            adapter.end,
            aln.read_start,
            aln.read_end,
            aln.adapter_start,
            aln.adapter_end,
            aln.pid()
        );
        let keep = if aln.read_start > rlen - aln.read_end { 0..aln.read_start } else { aln.read_end..rlen };
        Some(AdapterTrim { keep, adapter: adapter.index })
    }

    fn match_adapter(&self, seq: &[u8], oriented: &Oriented, end: End, min_pid: f64) -> Option<Alignment> {
        let rlen = seq.len();
        let alen = oriented.seq.len();
        let mut best: Option<Alignment> = None;
        for aln in Matcher::alignments(seq, &oriented.seq, &oriented.kmers, &self.params.scoring) {
            if !anchored(&aln, rlen, alen, end) {
                continue;
            }
            if aln.len() < self.params.min_end_match || aln.pid() < min_pid {
                continue;
            }
            if best.map_or(true, |b| aln.score > b.score) {
                best = Some(aln);
            }
        }
        best.or_else(|| self.terminal_overlap(seq, &oriented.seq, end))
    }

    /// Exact overlap of the adapter with the very end of the read, for
    /// overlaps too short to carry a seed.
    fn terminal_overlap(&self, seq: &[u8], adapter: &[u8], end: End) -> Option<Alignment> {
        let rlen = seq.len();
        let alen = adapter.len();
        let max_k = rlen.min(alen);
        let min_k = self.params.min_end_match;
        if max_k < min_k {
            return None;
        }
        (min_k..=max_k).rev().find_map(|k| {
            let (read_start, read_end, adapter_start, adapter_end) = match end {
                End::Three => (rlen - k, rlen, 0, k),
                End::Five => (0, k, alen - k, alen),
            };
            let r = &seq[read_start..read_end];
            let a = &adapter[adapter_start..adapter_end];
            if r == a && !r.contains(&b'N') {
                Some(Alignment {
                    read_start,
                    read_end,
                    adapter_start,
                    adapter_end,
                    score: k as i32 * self.params.scoring.reward,
                    matches: k,
                })
            } else {
                None
            }
        })
    }
}

/// True when the alignment sits where an adapter on `end` can be found.
fn anchored(aln: &Alignment, rlen: usize, alen: usize, end: End) -> bool {
    let tol = END_TOLERANCE;
    let adapter_tail_reached = aln.adapter_end + tol >= alen;
    let read_tail_reached = rlen - aln.read_end <= tol;
    match end {
        End::Three => {
            (aln.adapter_start <= tol && (read_tail_reached || adapter_tail_reached))
                || (aln.read_start <= tol && adapter_tail_reached)
        }
        End::Five => {
            (adapter_tail_reached && (aln.read_start <= tol || aln.adapter_start <= tol))
                || (read_tail_reached && aln.adapter_start <= tol)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::adapter_index::AdapterEnd;
    use rstest::rstest;

    const ADAPTER: &[u8] = b"TGGAATTCTCGGGTGCCAAGG";
    const INSERT: &[u8] = b"ACGTTGCATGCAAGTCCGATCAGTTACGGA";

    fn trimmer(seq: &[u8], end: AdapterEnd, rev: bool) -> AdapterTrimmer {
        AdapterTrimmer::new(AdapterSet::new(vec![(seq.to_vec(), end)], rev), AdapterParams::default())
    }

    #[rstest]
    #[case(ADAPTER.len())]
    #[case(12)]
    #[case(8)]
    #[case(6)]
    fn test_three_prime_suffix_is_removed(#[case] k: usize) {
        let read = [INSERT, &ADAPTER[..k]].concat();
        let t = trimmer(ADAPTER, AdapterEnd::Three, false);
        let hit = t.trim(&read, End::Three).unwrap();
        assert_eq!(hit.keep, 0..INSERT.len());
        assert_eq!(hit.adapter, 0);
    }

    #[test]
    fn test_five_prime_exact_adapter_trims_adapter_length() {
        let read = [ADAPTER, INSERT].concat();
        let t = trimmer(ADAPTER, AdapterEnd::Five, false);
        let hit = t.trim(&read, End::Five).unwrap();
        assert_eq!(hit.keep, ADAPTER.len()..read.len());
        assert!(t.trim(&read, End::Three).is_none());
    }

    #[test]
    fn test_adapter_with_one_mismatch() {
        let mut adapter = ADAPTER.to_vec();
        adapter[10] = b'A';
        let read = [INSERT, &adapter[..]].concat();
        let t = trimmer(ADAPTER, AdapterEnd::Three, false);
        // 20/21 identical is 95.2%, above the 3' default of 94
        let hit = t.trim(&read, End::Three).unwrap();
        assert_eq!(hit.keep, 0..INSERT.len());
    }

    #[test]
    fn test_internal_adapter_is_not_anchored() {
        let read = [INSERT, &ADAPTER[5..17], INSERT].concat();
        let t = trimmer(ADAPTER, AdapterEnd::Three, false);
        assert!(t.trim(&read, End::Three).is_none());
    }

    #[test]
    fn test_reverse_complement_is_searched() {
        let adapter = b"AGATCGGAAGAGCACACGTCT";
        let rc = crate::filter::adapter_index::reverse_complement(adapter);
        let read = [INSERT, &rc[..]].concat();
        assert!(trimmer(adapter, AdapterEnd::Three, false).trim(&read, End::Three).is_none());
        let hit = trimmer(adapter, AdapterEnd::Three, true).trim(&read, End::Three).unwrap();
        assert_eq!(hit.keep, 0..INSERT.len());
    }

    #[test]
    fn test_no_adapters_for_end() {
        let t = trimmer(ADAPTER, AdapterEnd::Three, false);
        assert!(!t.has_end(End::Five));
        assert!(t.trim(ADAPTER, End::Five).is_none());
    }
}
