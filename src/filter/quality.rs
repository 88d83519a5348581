use std::sync::OnceLock;

use log::info;

use crate::errors::{Result, TrimError};

/// Phred offset of the input qualities, fixed once for the whole run.
#[derive(Debug, Default)]
pub struct PhredOffset(OnceLock<u8>);

impl PhredOffset {
    pub fn fixed(offset: u8) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(offset);
        Self(cell)
    }

    pub fn get(&self) -> Option<u8> {
        self.0.get().copied()
    }

    /// Returns the offset, guessing it from `qual` if it is not known yet.
    pub fn resolve(&self, qual: &[u8]) -> Result<u8> {
        if let Some(&offset) = self.0.get() {
            return Ok(offset);
        }
        let guessed = detect_phred(qual)?;
        Ok(*self.0.get_or_init(|| {
            info!("Input reads have Phred-{guessed} quality values.");
            guessed
        }))
    }
}

/// Guesses the Phred offset from the range of quality characters in one read.
pub fn detect_phred(qual: &[u8]) -> Result<u8> {
    let vmin = qual.iter().copied().min().unwrap_or(u8::MAX);
    let vmax = qual.iter().copied().max().unwrap_or(0);
    if vmin < 64 {
        Ok(33)
    } else if vmax > 95 {
        Ok(64)
    } else {
        Err(TrimError::EncodingUndetermined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTrim {
    Untouched,
    /// Keep `start..end` of the read.
    Trimmed { start: usize, end: usize },
    /// No window reached the threshold; `start` bases were trimmed at 5'.
    Discard { start: usize },
}

#[derive(Debug, Clone)]
pub struct QualityTrimmer {
    pub min_qual: u8,
    pub window: usize,
    /// Maximum bases removed per end, 0 for no limit.
    pub max_trim: usize,
    pub min_len: usize,
}

impl QualityTrimmer {
    pub fn enabled(&self) -> bool {
        self.min_qual > 0
    }

    pub fn trim(&self, qual: &[u8], offset: u8) -> QualityTrim {
        let len = qual.len();
        if self.min_qual == 0 || len == 0 {
            return QualityTrim::Untouched;
        }
        let qmin = i32::from(self.min_qual);
        let q = |i: usize| i32::from(qual[i]) - i32::from(offset);
        let win = self.window.min(len / 4);

        let (mut start, mut end) = if win < 3 {
            // too short for a window: look for two good bases in a row from each end
            let mut l3 = len - 1;
            while l3 > 2 && !(q(l3) >= qmin && q(l3 - 1) >= qmin) {
                l3 -= 1;
            }
            let mut l5 = 0;
            while l5 + 3 < len && !(q(l5) >= qmin && q(l5 + 1) >= qmin) {
                l5 += 1;
            }
            if l5 > l3 {
                return QualityTrim::Discard { start: l5 };
            }
            (l5, l3 + 1)
        } else {
            let (start, end, ok) = self.scan(len, win, qmin, &q);
            if !ok {
                return QualityTrim::Discard { start };
            }
            (start, end)
        };
        if end <= start {
            return QualityTrim::Discard { start };
        }

        if self.max_trim > 0 {
            if len - end > self.max_trim {
                end = len - self.max_trim;
            }
            start = start.min(self.max_trim);
        }
        if start > 0 || end < len {
            QualityTrim::Trimmed { start, end }
        } else {
            QualityTrim::Untouched
        }
    }

    /// Slides the window over the read; the flag is false when no window passed.
    fn scan(&self, len: usize, win: usize, qmin: i32, q: &impl Fn(usize) -> i32) -> (usize, usize, bool) {
        let failing = |sum: i32| (f64::from(sum) / win as f64).round() < f64::from(qmin);
        let mut sum: i32 = (0..win).map(q).sum();
        let mut last_low = (0..win).rev().find(|&i| q(i) < qmin);
        let mut start = 0;
        let mut end = len;
        let mut ok = false;
        if failing(sum) {
            start = last_low.map_or(0, |i| i + 1);
        } else {
            ok = true;
        }
        for i in 1..=len - win {
            let inew = i + win - 1;
            sum += q(inew) - q(i - 1);
            if q(inew) < qmin {
                last_low = Some(inew);
            }
            if failing(sum) {
                if ok {
                    end = (i..=inew).find(|&j| q(j) < qmin).unwrap_or(i);
                    break;
                }
                start = last_low.map_or(start, |l| l + 1);
                if len - start < self.min_len {
                    break;
                }
            } else {
                ok = true;
            }
        }
        (start, end, ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn trimmer(min_qual: u8) -> QualityTrimmer {
        QualityTrimmer { min_qual, window: 6, max_trim: 0, min_len: 16 }
    }

    fn quals(runs: &[(u8, usize)]) -> Vec<u8> {
        runs.iter().flat_map(|&(c, n)| std::iter::repeat(c).take(n)).collect()
    }

    #[rstest]
    #[case(b"#I", Some(33))]
    #[case(b"hh", Some(64))]
    #[case(b"IIII", None)]
    #[case(b"!h", Some(33))]
    fn test_detect_phred(#[case] qual: &[u8], #[case] expected: Option<u8>) {
        match expected {
            Some(o) => assert_eq!(detect_phred(qual).unwrap(), o),
            None => assert!(matches!(detect_phred(qual), Err(TrimError::EncodingUndetermined))),
        }
    }

    #[test]
    fn test_phred_offset_is_fixed_after_first_guess() {
        let offset = PhredOffset::default();
        assert_eq!(offset.get(), None);
        assert_eq!(offset.resolve(b"##II").unwrap(), 33);
        // a Phred-64 looking read no longer changes the answer
        assert_eq!(offset.resolve(b"hhhh").unwrap(), 33);
        assert_eq!(PhredOffset::fixed(64).resolve(b"####").unwrap(), 64);
    }

    #[test]
    fn test_disabled_or_empty_is_untouched() {
        assert_eq!(trimmer(0).trim(b"####", 33), QualityTrim::Untouched);
        assert_eq!(trimmer(20).trim(b"", 33), QualityTrim::Untouched);
    }

    #[test]
    fn test_all_low_is_discarded() {
        let q = quals(&[(b'#', 40)]);
        assert!(matches!(trimmer(20).trim(&q, 33), QualityTrim::Discard { .. }));
    }

    #[test]
    fn test_high_quality_is_untouched() {
        let q = quals(&[(b'I', 40)]);
        assert_eq!(trimmer(20).trim(&q, 33), QualityTrim::Untouched);
    }

    #[test]
    fn test_low_tail_is_trimmed() {
        let q = quals(&[(b'I', 30), (b'#', 10)]);
        assert_eq!(trimmer(20).trim(&q, 33), QualityTrim::Trimmed { start: 0, end: 30 });
    }

    #[test]
    fn test_low_head_is_trimmed() {
        let q = quals(&[(b'#', 5), (b'I', 35)]);
        assert_eq!(trimmer(20).trim(&q, 33), QualityTrim::Trimmed { start: 5, end: 40 });
    }

    #[test]
    fn test_short_read_uses_pair_scan() {
        assert_eq!(trimmer(20).trim(b"##IIII##", 33), QualityTrim::Trimmed { start: 2, end: 6 });
    }

    #[test]
    fn test_max_trim_clamps_both_ends() {
        let q = quals(&[(b'#', 5), (b'I', 30), (b'#', 10)]);
        let t = QualityTrimmer { max_trim: 3, ..trimmer(20) };
        assert_eq!(t.trim(&q, 33), QualityTrim::Trimmed { start: 3, end: 42 });
    }
}
