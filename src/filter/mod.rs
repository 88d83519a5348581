pub mod adapter_index;
pub mod adapter_trimmer;
pub mod dust;
pub mod matcher;
pub mod ntrim;
pub mod poly_tail;
pub mod quality;

use std::ops::Range;

use log::debug;
use serde::Serialize;

use crate::config::TrimConfig;
use crate::errors::Result;
use crate::fastq::ReadRecord;
use self::adapter_index::AdapterSet;
use self::adapter_trimmer::{AdapterParams, AdapterTrimmer};
use self::dust::DustMasker;
use self::matcher::Scoring;
use self::ntrim::{NTrim, NTrimmer};
use self::poly_tail::PolyTailTrimmer;
use self::quality::{PhredOffset, QualityTrim, QualityTrimmer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum End {
    Five,
    Three,
}

impl End {
    pub fn digit(self) -> char {
        match self {
            End::Five => '5',
            End::Three => '3',
        }
    }
}

/// Why a read was trimmed or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimCode {
    #[default]
    Untouched,
    TrimmedKept,
    TooShort,
    Quality,
    AmbiguousBases,
    PolyA,
    PolyT,
    /// Adapter hit; carries the adapter's load index when hits are reported per adapter.
    Adapter(Option<usize>),
    LowComplexity,
}

impl TrimCode {
    /// Character used for this cause in the trim report.
    pub fn code_char(self) -> Option<char> {
        match self {
            TrimCode::Untouched | TrimCode::TrimmedKept => None,
            TrimCode::TooShort => Some('s'),
            TrimCode::Quality => Some('Q'),
            TrimCode::AmbiguousBases => Some('N'),
            TrimCode::PolyA => Some('A'),
            TrimCode::PolyT => Some('T'),
            // letters count from 'b' for the first adapter
            TrimCode::Adapter(Some(i)) if i < 25 => Some(char::from(b'b' + i as u8)),
            TrimCode::Adapter(_) => Some('V'),
            TrimCode::LowComplexity => Some('D'),
        }
    }

    pub fn is_discard(self) -> bool {
        !matches!(self, TrimCode::Untouched | TrimCode::TrimmedKept)
    }
}

/// One trimming step applied to a read, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimOp {
    pub end: End,
    pub cause: TrimCode,
    pub len: usize,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct TrimStats {
    pub input_reads: u64,
    pub input_pairs: u64,
    pub input_bases: u64,
    pub input_n_bases: u64,
    pub output_reads: u64,
    pub output_pairs: u64,
    pub output_bases: u64,
    pub output_n_bases: u64,
    pub trimmed5_reads: u64,
    pub trimmed5_bases: u64,
    pub trimmed3_reads: u64,
    pub trimmed3_bases: u64,
    pub quality_trimmed_reads: u64,
    pub quality_trimmed_bases: u64,
    pub n_trimmed_reads: u64,
    pub n_trimmed_bases: u64,
    pub poly_a_trimmed_reads: u64,
    pub poly_a_trimmed_bases: u64,
    pub poly_t_trimmed_reads: u64,
    pub poly_t_trimmed_bases: u64,
    pub adapter_trimmed_reads: u64,
    pub adapter_trimmed_bases: u64,
    pub discarded_too_short: u64,
    pub discarded_quality: u64,
    pub discarded_n: u64,
    pub discarded_poly: u64,
    pub discarded_adapter: u64,
    pub discarded_dust: u64,
    pub unique_sequences: u64,
    pub max_multiplicity: u64,
}

fn count_n(seq: &[u8]) -> u64 {
    seq.iter().filter(|&&b| b == b'N').count() as u64
}

impl TrimStats {
    pub fn merge(&mut self, other: &TrimStats) {
        self.input_reads += other.input_reads;
        self.input_pairs += other.input_pairs;
        self.input_bases += other.input_bases;
        self.input_n_bases += other.input_n_bases;
        self.output_reads += other.output_reads;
        self.output_pairs += other.output_pairs;
        self.output_bases += other.output_bases;
        self.output_n_bases += other.output_n_bases;
        self.trimmed5_reads += other.trimmed5_reads;
        self.trimmed5_bases += other.trimmed5_bases;
        self.trimmed3_reads += other.trimmed3_reads;
        self.trimmed3_bases += other.trimmed3_bases;
        self.quality_trimmed_reads += other.quality_trimmed_reads;
        self.quality_trimmed_bases += other.quality_trimmed_bases;
        self.n_trimmed_reads += other.n_trimmed_reads;
        self.n_trimmed_bases += other.n_trimmed_bases;
        self.poly_a_trimmed_reads += other.poly_a_trimmed_reads;
        self.poly_a_trimmed_bases += other.poly_a_trimmed_bases;
        self.poly_t_trimmed_reads += other.poly_t_trimmed_reads;
        self.poly_t_trimmed_bases += other.poly_t_trimmed_bases;
        self.adapter_trimmed_reads += other.adapter_trimmed_reads;
        self.adapter_trimmed_bases += other.adapter_trimmed_bases;
        self.discarded_too_short += other.discarded_too_short;
        self.discarded_quality += other.discarded_quality;
        self.discarded_n += other.discarded_n;
        self.discarded_poly += other.discarded_poly;
        self.discarded_adapter += other.discarded_adapter;
        self.discarded_dust += other.discarded_dust;
        self.unique_sequences += other.unique_sequences;
        self.max_multiplicity = self.max_multiplicity.max(other.max_multiplicity);
    }

    /// Counts one processed input read. Each cause is counted once per read.
    pub fn record(&mut self, rec: &ReadRecord) {
        self.input_reads += 1;
        self.input_bases += rec.seq.len() as u64;
        self.input_n_bases += count_n(&rec.seq);
        if rec.trim5 > 0 {
            self.trimmed5_reads += 1;
            self.trimmed5_bases += rec.trim5 as u64;
        }
        if rec.trim3 > 0 {
            self.trimmed3_reads += 1;
            self.trimmed3_bases += rec.trim3 as u64;
        }

        // Q N A T V
        let mut bases = [0u64; 5];
        for op in &rec.ops {
            let slot = match op.cause {
                TrimCode::Quality => 0,
                TrimCode::AmbiguousBases => 1,
                TrimCode::PolyA => 2,
                TrimCode::PolyT => 3,
                TrimCode::Adapter(_) => 4,
                _ => continue,
            };
            bases[slot] += op.len as u64;
        }
        let counters = [
            (&mut self.quality_trimmed_reads, &mut self.quality_trimmed_bases),
            (&mut self.n_trimmed_reads, &mut self.n_trimmed_bases),
            (&mut self.poly_a_trimmed_reads, &mut self.poly_a_trimmed_bases),
            (&mut self.poly_t_trimmed_reads, &mut self.poly_t_trimmed_bases),
            (&mut self.adapter_trimmed_reads, &mut self.adapter_trimmed_bases),
        ];
        for ((reads, total), n) in counters.into_iter().zip(bases) {
            if n > 0 {
                *reads += 1;
                *total += n;
            }
        }

        match rec.outcome {
            TrimCode::TooShort => self.discarded_too_short += 1,
            TrimCode::Quality => self.discarded_quality += 1,
            TrimCode::AmbiguousBases => self.discarded_n += 1,
            TrimCode::PolyA | TrimCode::PolyT => self.discarded_poly += 1,
            TrimCode::Adapter(_) => self.discarded_adapter += 1,
            TrimCode::LowComplexity => self.discarded_dust += 1,
            TrimCode::Untouched | TrimCode::TrimmedKept => {}
        }
    }

    pub fn record_output(&mut self, seq: &[u8]) {
        self.output_reads += 1;
        self.output_bases += seq.len() as u64;
        self.output_n_bases += count_n(seq);
    }
}

/// Window sides moved by one trimming step.
#[derive(Debug, Default, Clone, Copy)]
struct Moved {
    five: bool,
    three: bool,
}

/// Applies every enabled trimmer to a read in a fixed order.
pub struct Trimmer {
    min_len: usize,
    phred: PhredOffset,
    quality: QualityTrimmer,
    ntrimmer: NTrimmer,
    poly: Option<PolyTailTrimmer>,
    poly_both_ends: bool,
    adapters: AdapterTrimmer,
    adapter_letters: bool,
    /// Low complexity filter on single reads; collapsed reads are filtered at flush.
    dust_cutoff: Option<u32>,
    dust_mask: bool,
}

impl Trimmer {
    pub fn new(cfg: &TrimConfig) -> Self {
        let params = AdapterParams {
            min_end_match: cfg.min_end_match,
            pid5: cfg.pid5,
            pid3: cfg.pid3,
            scoring: Scoring::adapter(cfg.match_reward, cfg.mismatch_penalty, cfg.xdrop),
        };
        Self {
            min_len: cfg.min_len,
            phred: cfg.phred.map(PhredOffset::fixed).unwrap_or_default(),
            quality: QualityTrimmer {
                min_qual: cfg.min_qual,
                window: cfg.qual_window,
                max_trim: cfg.qual_trim_max,
                min_len: cfg.min_len,
            },
            ntrimmer: NTrimmer { max_perc_n: cfg.max_perc_n, dist: cfg.ntrim_dist, perc: cfg.ntrim_perc },
            poly: cfg.poly.then(|| PolyTailTrimmer::new(cfg.min_poly)),
            poly_both_ends: cfg.poly_both_ends,
            adapters: AdapterTrimmer::new(AdapterSet::new(cfg.adapters.clone(), cfg.rev_compl), params),
            adapter_letters: cfg.adapter_idx,
            dust_cutoff: (cfg.dust && !cfg.collapse).then_some(cfg.dust_cutoff),
            dust_mask: cfg.dust_mask,
        }
    }

    pub fn phred(&self) -> &PhredOffset {
        &self.phred
    }

    /// Scratch space for the per-read dust filter, one per worker.
    pub fn dust_masker(&self) -> Option<DustMasker> {
        self.dust_cutoff.map(DustMasker::new)
    }

    /// Trims `rec` in place and returns its outcome, also stored in `rec.outcome`.
    pub fn process(&self, rec: &mut ReadRecord, dust: Option<&mut DustMasker>) -> Result<TrimCode> {
        if rec.seq.len() < self.min_len {
            rec.outcome = TrimCode::TooShort;
            return Ok(rec.outcome);
        }

        let verdict = match (self.quality.enabled(), rec.qual.as_deref()) {
            (true, Some(qual)) => self.quality.trim(&qual[rec.window()], self.phred.resolve(qual)?),
            _ => QualityTrim::Untouched,
        };
        match verdict {
            QualityTrim::Untouched => {}
            QualityTrim::Trimmed { start, end } => {
                if self.narrow(rec, start..end, TrimCode::Quality).is_none() {
                    return Ok(rec.outcome);
                }
            }
            QualityTrim::Discard { .. } => {
                // the whole window goes, even with no minimum length
                let len = rec.trimmed_len();
                self.narrow(rec, len..len, TrimCode::Quality);
                rec.outcome = TrimCode::Quality;
                return Ok(rec.outcome);
            }
        }

        match self.ntrimmer.trim(rec.trimmed_seq()) {
            NTrim::Untouched => {}
            NTrim::Trimmed { start, end, perc_n } => {
                if self.narrow(rec, start..end, TrimCode::AmbiguousBases).is_none() {
                    return Ok(rec.outcome);
                }
                if perc_n > self.ntrimmer.max_perc_n {
                    debug!("{}: {perc_n:.1}% N bases left after N trimming", rec.id);
                    rec.outcome = TrimCode::AmbiguousBases;
                    return Ok(rec.outcome);
                }
            }
            NTrim::Invalid { perc_n } => {
                debug!("{}: {perc_n:.1}% N bases", rec.id);
                rec.outcome = TrimCode::AmbiguousBases;
                return Ok(rec.outcome);
            }
        }

        let mut last = Moved { five: true, three: true };
        while last.five || last.three {
            let mut pass = Moved::default();

            if last.three {
                if let Some(poly) = &self.poly {
                    let bases: &[(u8, TrimCode)] = if self.poly_both_ends {
                        &[(b'A', TrimCode::PolyA), (b'T', TrimCode::PolyT)]
                    } else {
                        &[(b'A', TrimCode::PolyA)]
                    };
                    let hit = bases.iter().find_map(|&(b, code)| poly.trim3(rec.trimmed_seq(), b).map(|e| (e, code)));
                    if let Some((new_end, code)) = hit {
                        let Some(m) = self.narrow(rec, 0..new_end, code) else { return Ok(rec.outcome) };
                        pass.three |= m.three;
                    }
                }
            }
            if self.adapters.has_end(End::Three) {
                if let Some(hit) = self.adapters.trim(rec.trimmed_seq(), End::Three) {
                    let Some(m) = self.narrow(rec, hit.keep, self.adapter_code(hit.adapter)) else {
                        return Ok(rec.outcome);
                    };
                    pass.three |= m.three;
                    pass.five |= m.five;
                }
            }

            if last.five {
                if let Some(poly) = &self.poly {
                    let bases: &[(u8, TrimCode)] = if self.poly_both_ends {
                        &[(b'T', TrimCode::PolyT), (b'A', TrimCode::PolyA)]
                    } else {
                        &[(b'T', TrimCode::PolyT)]
                    };
                    let hit = bases.iter().find_map(|&(b, code)| poly.trim5(rec.trimmed_seq(), b).map(|s| (s, code)));
                    if let Some((new_start, code)) = hit {
                        let len = rec.trimmed_len();
                        let Some(m) = self.narrow(rec, new_start..len, code) else { return Ok(rec.outcome) };
                        pass.five |= m.five;
                    }
                }
            }
            if self.adapters.has_end(End::Five) {
                if let Some(hit) = self.adapters.trim(rec.trimmed_seq(), End::Five) {
                    let Some(m) = self.narrow(rec, hit.keep, self.adapter_code(hit.adapter)) else {
                        return Ok(rec.outcome);
                    };
                    pass.three |= m.three;
                    pass.five |= m.five;
                }
            }
            last = pass;
        }

        if let (Some(masker), Some(cutoff)) = (dust, self.dust_cutoff) {
            let (masked, n) = masker.mask(rec.trimmed_seq());
            if n > rec.trimmed_len() / 2 {
                debug!("{}: low complexity, {n} of {} bases masked at cutoff {cutoff}", rec.id, rec.trimmed_len());
                rec.outcome = TrimCode::LowComplexity;
                return Ok(rec.outcome);
            }
            if self.dust_mask {
                let w = rec.window();
                rec.seq[w].copy_from_slice(&masked);
            }
        }

        rec.outcome = if rec.is_trimmed() { TrimCode::TrimmedKept } else { TrimCode::Untouched };
        Ok(rec.outcome)
    }

    fn adapter_code(&self, index: usize) -> TrimCode {
        TrimCode::Adapter(self.adapter_letters.then_some(index))
    }

    /// Shrinks the working window to `keep` (window coordinates), recording an
    /// operation for each side that moved. Returns `None` and marks the read
    /// discarded when the rest falls below the minimum length.
    fn narrow(&self, rec: &mut ReadRecord, keep: Range<usize>, cause: TrimCode) -> Option<Moved> {
        let len = rec.trimmed_len();
        let cut5 = keep.start.min(len);
        let cut3 = len - keep.end.clamp(cut5, len);
        if cut5 > 0 {
            rec.trim5 += cut5;
            rec.ops.push(TrimOp { end: End::Five, cause, len: cut5 });
        }
        if cut3 > 0 {
            rec.trim3 += cut3;
            rec.ops.push(TrimOp { end: End::Three, cause, len: cut3 });
        }
        debug!("{}: {:?} trimmed {cut5} at 5' and {cut3} at 3', {} bases left", rec.id, cause, rec.trimmed_len());
        if rec.trimmed_len() < self.min_len {
            rec.outcome = cause;
            return None;
        }
        Some(Moved { five: cut5 > 0, three: cut3 > 0 })
    }
}
