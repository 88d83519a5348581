//! Low-complexity masking with the symmetric DUST score over triplets.

const WORD: usize = 3;
const WINDOW: usize = 32;
const HALF_WINDOW: usize = WINDOW / 2;
const TABLE_SIZE: usize = 32 * 32 * 32;

/// Best scoring interval found while scanning one window.
#[derive(Debug, Default, Clone, Copy)]
struct Interval {
    score: u32,
    start: usize,
    /// Offset of the last masked base from `start`.
    last: usize,
}

/// Reusable DUST scratch space; each worker owns one.
pub struct DustMasker {
    cutoff: u32,
    counts: Vec<u32>,
    seen: Vec<usize>,
}

impl DustMasker {
    pub fn new(cutoff: u32) -> Self {
        Self { cutoff, counts: vec![0; TABLE_SIZE], seen: Vec::with_capacity(WINDOW) }
    }

    /// Returns `seq` with low-complexity stretches replaced by `N`, and the
    /// number of `N` bases in the result.
    pub fn mask(&mut self, seq: &[u8]) -> (Vec<u8>, usize) {
        let mut masked = seq.to_vec();
        for i in (0..seq.len()).step_by(HALF_WINDOW) {
            let l = WINDOW.min(seq.len() - i);
            let best = self.window(&seq[i..i + l]);
            if best.score > self.cutoff {
                for b in &mut masked[i + best.start..=i + best.start + best.last] {
                    *b = b'N';
                }
            }
        }
        let n = masked.iter().filter(|&&b| b == b'N').count();
        (masked, n)
    }

    fn window(&mut self, s: &[u8]) -> Interval {
        let mut best = Interval::default();
        if s.len() < WORD {
            return best;
        }
        for i in 0..=s.len() - WORD {
            self.scan_from(&s[i..], i, &mut best);
        }
        best
    }

    fn scan_from(&mut self, s: &[u8], offset: usize, best: &mut Interval) {
        let mask = TABLE_SIZE - 1;
        self.seen.clear();
        let mut word = 0usize;
        let mut filled = 0usize;
        let mut sum = 0u32;
        for (j, &c) in s.iter().enumerate() {
            word <<= 5;
            if c <= b' ' {
                filled = 0;
                continue;
            }
            word = (word | usize::from(c.saturating_sub(b'A'))) & mask;
            filled += 1;
            if filled < WORD {
                continue;
            }
            if !self.seen.contains(&word) {
                self.seen.push(word);
                self.counts[word] = 0;
            }
            let t = self.counts[word];
            if t > 0 {
                sum += t;
                let v = 10 * sum / j as u32;
                if best.score < v {
                    *best = Interval { score: v, start: offset, last: j };
                }
            }
            self.counts[word] += 1;
        }
    }
}
