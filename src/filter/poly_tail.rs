use super::matcher::{Matcher, Scoring};

/// Poly-A/T tail detection at either read end.
#[derive(Debug, Clone)]
pub struct PolyTailTrimmer {
    /// Score an accepted tail must reach: twice the minimum run length.
    pub min_score: i32,
}

impl Default for PolyTailTrimmer {
    fn default() -> Self {
        Self::new(6)
    }
}

impl PolyTailTrimmer {
    pub fn new(min_poly: usize) -> Self {
        Self { min_score: 2 * min_poly as i32 }
    }

    fn extend(seq: &[u8], base: u8, score: i32) -> (i32, usize) {
        let ext = Matcher::extend(seq.iter().map(|&c| (c, base)), &Scoring::POLY, score);
        (ext.score, ext.len)
    }

    fn extend_back(seq: &[u8], base: u8, score: i32) -> (i32, usize) {
        let ext = Matcher::extend(seq.iter().rev().map(|&c| (c, base)), &Scoring::POLY, score);
        (ext.score, ext.len)
    }

    /// Looks for a `base` tail at the 3' end; returns the new exclusive end.
    pub fn trim3(&self, seq: &[u8], base: u8) -> Option<usize> {
        let rlen = seq.len();
        if rlen < 5 {
            return None;
        }
        let seed = [base; 4];
        let lmin = rlen.saturating_sub(16);
        // seed must start after lmin, searching back from the end
        let seed_at = (lmin + 1..=rlen - 4).rev().find(|&i| seq[i..i + 4] == seed)?;

        let seed_score = 4 * Scoring::POLY.reward;
        let (score, right) = Self::extend(&seq[seed_at + 4..], base, seed_score);
        let ri = seed_at + 3 + right;
        if ri + 6 < rlen {
            return None;
        }
        let (score, left) = Self::extend_back(&seq[..seed_at], base, score);
        let li = seed_at - left;

        let min = self.min_score;
        let accepted = (score == min && ri == rlen - 1)
            || (score > min && ri + 3 >= rlen)
            || (score > 3 * min && ri + 8 >= rlen);
        accepted.then_some(li)
    }

    /// Looks for a `base` run at the 5' end; returns the new start.
    pub fn trim5(&self, seq: &[u8], base: u8) -> Option<usize> {
        let rlen = seq.len();
        if rlen < 4 {
            return None;
        }
        let seed = [base; 4];
        let lmax = (rlen - 4).min(12);
        let seed_at = (0..=lmax).find(|&i| seq[i..i + 4] == seed)?;

        let seed_score = 4 * Scoring::POLY.reward;
        let (score, left) = Self::extend_back(&seq[..seed_at], base, seed_score);
        let li = seed_at - left;
        if li > 5 {
            return None;
        }
        let (score, right) = Self::extend(&seq[seed_at + 4..], base, score);
        let ri = seed_at + 3 + right;

        let min = self.min_score;
        let accepted = (score == min && li == 0) || (score > min && li < 2) || (score > 3 * min && li < 8);
        accepted.then_some((ri + 1).min(rlen))
    }
}
