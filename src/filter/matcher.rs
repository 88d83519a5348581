use super::adapter_index::{kmers, KmerIndex, KMER};

/// Per-position scores for ungapped extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub reward: i32,
    pub penalty: i32,
    /// Score of a position where either base is `N`.
    pub ambiguous: i32,
    /// Extension stops once the score falls this far below the best seen.
    pub xdrop: i32,
}

impl Scoring {
    /// Poly-A/T tail scoring: match +2, `N` 0, mismatch -3, drop-off 7.
    pub const POLY: Scoring = Scoring { reward: 2, penalty: 3, ambiguous: 0, xdrop: 7 };

    pub fn adapter(reward: i32, penalty: i32, xdrop: i32) -> Self {
        Self { reward, penalty, ambiguous: -penalty, xdrop }
    }

    #[inline]
    pub fn score(&self, a: u8, b: u8) -> i32 {
        if a == b'N' || b == b'N' {
            self.ambiguous
        } else if a == b {
            self.reward
        } else {
            -self.penalty
        }
    }
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring::adapter(1, 3, 8)
    }
}

/// Outcome of one X-drop extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    /// Best running score reached.
    pub score: i32,
    /// Number of positions consumed to reach it.
    pub len: usize,
}

/// An ungapped local alignment of an adapter against a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Read span `[read_start, read_end)`.
    pub read_start: usize,
    pub read_end: usize,
    pub adapter_start: usize,
    pub adapter_end: usize,
    pub score: i32,
    pub matches: usize,
}

impl Alignment {
    pub fn len(&self) -> usize {
        self.read_end - self.read_start
    }

    pub fn pid(&self) -> f64 {
        if self.len() == 0 {
            return 0.0;
        }
        self.matches as f64 * 100.0 / self.len() as f64
    }
}

pub struct Matcher;

impl Matcher {
    /// Greedy X-drop extension over aligned base pairs, starting from `score`.
    pub fn extend<I>(pairs: I, scoring: &Scoring, score: i32) -> Extension
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        let mut cur = score;
        let mut best = Extension { score, len: 0 };
        for (i, (a, b)) in pairs.into_iter().enumerate() {
            cur += scoring.score(a, b);
            if best.score - cur > scoring.xdrop {
                break;
            }
            if cur >= best.score {
                best = Extension { score: cur, len: i + 1 };
            }
        }
        best
    }

    /// Seeds on shared 6-mers and extends each seed both ways.
    ///
    /// One alignment is produced per diagonal stretch; seeds that fall inside
    /// an alignment already found on the same diagonal are skipped.
    pub fn alignments(read: &[u8], adapter: &[u8], index: &KmerIndex, scoring: &Scoring) -> Vec<Alignment> {
        let mut found: Vec<(isize, Alignment)> = Vec::new();
        for (rpos, code) in kmers(read) {
            for &apos in index.offsets(code) {
                let apos = apos as usize;
                let diag = rpos as isize - apos as isize;
                if found.iter().any(|(d, aln)| *d == diag && rpos < aln.read_end) {
                    continue;
                }
                let aln = Self::extend_seed(read, adapter, rpos, apos, scoring);
                found.push((diag, aln));
            }
        }
        found.into_iter().map(|(_, aln)| aln).collect()
    }

    fn extend_seed(read: &[u8], adapter: &[u8], rpos: usize, apos: usize, scoring: &Scoring) -> Alignment {
        let seed_score = KMER as i32 * scoring.reward;
        let right = Self::extend(
            read[rpos + KMER..].iter().copied().zip(adapter[apos + KMER..].iter().copied()),
            scoring,
            seed_score,
        );
        let left = Self::extend(
            read[..rpos].iter().rev().copied().zip(adapter[..apos].iter().rev().copied()),
            scoring,
            right.score,
        );
        let read_start = rpos - left.len;
        let read_end = rpos + KMER + right.len;
        let adapter_start = apos - left.len;
        let adapter_end = apos + KMER + right.len;
        let matches = read[read_start..read_end]
            .iter()
            .zip(&adapter[adapter_start..adapter_end])
            .filter(|(a, b)| a == b && **a != b'N')
            .count();
        Alignment { read_start, read_end, adapter_start, adapter_end, score: left.score, matches }
    }
}
