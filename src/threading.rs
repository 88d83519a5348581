use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::config::TrimConfig;
use crate::dedup::{DedupStore, FlushOptions};
use crate::errors::{Result, TrimError};
use crate::fastq::{OutputStyle, ReadRecord, Reader, Writer};
use crate::filter::dust::DustMasker;
use crate::filter::{TrimStats, Trimmer};
use crate::report::{trim_line, ReportWriter};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| TrimError::WorkerPanic)
}

/// Reads fetched together under the input lock.
pub struct Batch {
    pub reads: Vec<ReadRecord>,
    /// Same length as `reads` for paired input, empty otherwise.
    pub mates: Vec<ReadRecord>,
}

/// Processed batch waiting for the output, report and stats locks.
struct ProcessedBatch {
    kept: Vec<(ReadRecord, Option<ReadRecord>)>,
    lines: Vec<String>,
    stats: TrimStats,
    phred_shift: i16,
}

pub struct Input {
    reads: Reader,
    mates: Option<Reader>,
    mate_check: bool,
}

impl Input {
    pub fn new(reads: Reader, mates: Option<Reader>, mate_check: bool) -> Self {
        Self { reads, mates, mate_check }
    }

    fn count_mismatch(reads: &Reader, mates: &Reader) -> TrimError {
        TrimError::PairedCountMismatch { path1: reads.path().to_string(), path2: mates.path().to_string() }
    }

    /// Fetches up to `size` reads and exactly as many mates.
    pub fn fetch(&mut self, size: usize) -> Result<Option<Batch>> {
        let mut reads = Vec::with_capacity(size);
        while reads.len() < size {
            match self.reads.next_record()? {
                Some(rec) => reads.push(rec),
                None => break,
            }
        }
        let mut mates = Vec::new();
        if let Some(mate_reader) = self.mates.as_mut() {
            mates.reserve(reads.len());
            for rec in &reads {
                let Some(mate) = mate_reader.next_record()? else {
                    return Err(Self::count_mismatch(&self.reads, mate_reader));
                };
                if self.mate_check && rec.base_id() != mate.base_id() {
                    return Err(TrimError::MateIdMismatch {
                        id1: rec.id.clone(),
                        id2: mate.id,
                        path1: self.reads.path().to_string(),
                        path2: mate_reader.path().to_string(),
                    });
                }
                mates.push(mate);
            }
            if reads.len() < size && mate_reader.next_record()?.is_some() {
                return Err(Self::count_mismatch(&self.reads, mate_reader));
            }
        }
        if reads.is_empty() {
            return Ok(None);
        }
        Ok(Some(Batch { reads, mates }))
    }
}

pub struct Output {
    main: Writer,
    mate: Option<Writer>,
    style: OutputStyle,
    /// Number of records (or pairs) written so far, used for renaming.
    counter: u64,
}

impl Output {
    pub fn new(main: Writer, mate: Option<Writer>, style: OutputStyle) -> Self {
        Self { main, mate, style, counter: 0 }
    }

    fn write(&mut self, kept: &[(ReadRecord, Option<ReadRecord>)], phred_shift: i16) -> Result<()> {
        for (rec, mate) in kept {
            self.counter += 1;
            self.main.write_read(rec, &self.style, self.counter, phred_shift)?;
            if let (Some(m), Some(w)) = (mate, self.mate.as_mut()) {
                w.write_read(m, &self.style, self.counter, phred_shift)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        use std::io::Write;
        self.main.flush()?;
        if let Some(w) = self.mate.as_mut() {
            w.flush()?;
        }
        Ok(())
    }
}

/// Worker pool over a shared input. Each lock guards one resource and is
/// never held while reads are being trimmed.
pub struct Pipeline<'a> {
    cfg: &'a TrimConfig,
    trimmer: Trimmer,
    input: Mutex<Input>,
    output: Mutex<Output>,
    report: Option<Mutex<ReportWriter>>,
    stats: Mutex<TrimStats>,
    dedup: Option<Mutex<DedupStore>>,
    failed: AtomicBool,
}

impl<'a> Pipeline<'a> {
    pub fn new(cfg: &'a TrimConfig, input: Input, output: Output, report: Option<ReportWriter>) -> Self {
        Self {
            cfg,
            trimmer: Trimmer::new(cfg),
            input: Mutex::new(input),
            output: Mutex::new(output),
            report: report.map(Mutex::new),
            stats: Mutex::new(TrimStats::default()),
            dedup: cfg.collapse.then(|| Mutex::new(DedupStore::new())),
            failed: AtomicBool::new(false),
        }
    }

    /// Runs all workers to completion and returns the merged counters.
    pub fn run(self) -> Result<TrimStats> {
        let threads = self.cfg.threads.max(1);
        let results = crossbeam::scope(|s| {
            let handles: Vec<_> = (0..threads).map(|_| s.spawn(|_| self.worker())).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| Err(TrimError::WorkerPanic)))
                .collect::<Vec<_>>()
        })
        .map_err(|_| TrimError::WorkerPanic)?;
        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            return Err(err);
        }

        let mut stats = self.stats.into_inner().map_err(|_| TrimError::WorkerPanic)?;
        let mut output = self.output.into_inner().map_err(|_| TrimError::WorkerPanic)?;
        let mut report = match self.report {
            Some(r) => Some(r.into_inner().map_err(|_| TrimError::WorkerPanic)?),
            None => None,
        };
        if let Some(dedup) = self.dedup {
            let store = dedup.into_inner().map_err(|_| TrimError::WorkerPanic)?;
            debug!("writing {} collapsed sequences", store.len());
            let phred_shift = match (self.cfg.convert_phred, self.trimmer.phred().get()) {
                (true, Some(offset)) => shift_for(offset),
                _ => 0,
            };
            let opts = FlushOptions {
                rename_prefix: self.cfg.rename_prefix.clone(),
                dust: self.cfg.dust.then(|| DustMasker::new(self.cfg.dust_cutoff)),
                dust_mask: self.cfg.dust_mask,
                phred_shift,
            };
            let flushed = store.flush(&mut output.main, report.as_mut(), opts)?;
            stats.merge(&flushed);
        }
        output.finish()?;
        if let Some(r) = report.as_mut() {
            r.flush()?;
        }
        Ok(stats)
    }

    fn worker(&self) -> Result<()> {
        let res = self.worker_loop();
        if res.is_err() {
            self.failed.store(true, Ordering::SeqCst);
        }
        res
    }

    fn worker_loop(&self) -> Result<()> {
        let mut dust = self.trimmer.dust_masker();
        loop {
            if self.failed.load(Ordering::SeqCst) {
                return Ok(());
            }
            let batch = {
                let mut input = lock(&self.input)?;
                input.fetch(self.cfg.batch_size)?
            };
            let Some(batch) = batch else { return Ok(()) };
            let processed = self.process_batch(batch, dust.as_mut())?;

            match &self.dedup {
                Some(store) => {
                    let mut store = lock(store)?;
                    for (rec, _) in &processed.kept {
                        store.add(rec)?;
                    }
                }
                None => lock(&self.output)?.write(&processed.kept, processed.phred_shift)?,
            }
            if let Some(report) = &self.report {
                lock(report)?.append(&processed.lines)?;
            }
            lock(&self.stats)?.merge(&processed.stats);
        }
    }

    fn process_batch(&self, batch: Batch, mut dust: Option<&mut DustMasker>) -> Result<ProcessedBatch> {
        let mut stats = TrimStats::default();
        let mut lines = Vec::new();
        let mut kept = Vec::with_capacity(batch.reads.len());
        let paired = !batch.mates.is_empty();
        let mut mates = batch.mates.into_iter();

        for mut rec in batch.reads {
            self.trimmer.process(&mut rec, dust.as_deref_mut())?;
            stats.record(&rec);
            if !paired {
                lines.extend(trim_line(&rec, None));
                let keep = !rec.outcome.is_discard() && (!self.cfg.only_trimmed || rec.is_trimmed());
                if keep {
                    if self.dedup.is_none() {
                        stats.record_output(rec.trimmed_seq());
                    }
                    kept.push((rec, None));
                }
                continue;
            }

            let Some(mut mate) = mates.next() else { break };
            self.trimmer.process(&mut mate, dust.as_deref_mut())?;
            stats.record(&mate);
            stats.input_pairs += 1;
            lines.extend(trim_line(&rec, Some(1)));
            lines.extend(trim_line(&mate, Some(2)));

            let (ok1, ok2) = (!rec.outcome.is_discard(), !mate.outcome.is_discard());
            let mut keep = if self.cfg.rescue_mates { ok1 || ok2 } else { ok1 && ok2 };
            if self.cfg.only_trimmed {
                keep &= rec.is_trimmed() || mate.is_trimmed();
            }
            if !keep {
                continue;
            }
            for (r, ok) in [(&mut rec, ok1), (&mut mate, ok2)] {
                if !ok {
                    debug!("{}: rescued as an empty mate", r.id);
                    r.trim5 = r.seq.len() - r.trim3;
                }
                stats.record_output(r.trimmed_seq());
            }
            stats.output_pairs += 1;
            kept.push((rec, Some(mate)));
        }

        let phred_shift = if self.cfg.convert_phred {
            let first_qual = kept.iter().find_map(|(r, _)| r.qual.as_deref());
            match first_qual {
                Some(q) => shift_for(self.trimmer.phred().resolve(q)?),
                None => 0,
            }
        } else {
            0
        };
        Ok(ProcessedBatch { kept, lines, stats, phred_shift })
    }
}

/// Quality shift converting from `offset` to the other Phred encoding.
fn shift_for(offset: u8) -> i16 {
    if offset == 33 {
        31
    } else {
        -31
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastq::tests::{reader_over, SharedBuf};
    use crate::filter::adapter_index::AdapterEnd;

    const ADAPTER: &str = "TGGAATTCTCGGGTGCCAAGG";
    const INSERT: &str = "ACGTTGCATGCAAGTCCGATCAGTTACGGA";

    struct Sinks {
        out: SharedBuf,
        mate: SharedBuf,
        report: SharedBuf,
    }

    fn run_with(cfg: &TrimConfig, text: &str, mates: Option<&str>) -> (Result<TrimStats>, Sinks) {
        let sinks = Sinks { out: SharedBuf::default(), mate: SharedBuf::default(), report: SharedBuf::default() };
        let input = Input::new(reader_over(text), mates.map(reader_over), cfg.mate_check);
        let output = Output::new(
            Writer::from_writer(Box::new(sinks.out.clone())),
            mates.map(|_| Writer::from_writer(Box::new(sinks.mate.clone()))),
            OutputStyle { trim_info: cfg.trim_info, rename_prefix: cfg.rename_prefix.clone() },
        );
        let report = ReportWriter::from_writer(Box::new(sinks.report.clone()));
        let res = Pipeline::new(cfg, input, output, Some(report)).run();
        (res, sinks)
    }

    fn adapter_cfg() -> TrimConfig {
        TrimConfig { adapters: vec![(ADAPTER.as_bytes().to_vec(), AdapterEnd::Three)], ..TrimConfig::default() }
    }

    #[test]
    fn test_single_end_fasta() {
        let text = format!(">r1\n{INSERT}{ADAPTER}\n>r2\nACGTACGT\n>r3 keep me\n{INSERT}\n");
        let (res, sinks) = run_with(&adapter_cfg(), &text, None);
        let stats = res.unwrap();
        assert_eq!(sinks.out.contents(), format!(">r1\n{INSERT}\n>r3 keep me\n{INSERT}\n"));
        assert_eq!(sinks.report.contents(), "r1\t3V21\t\nr2\ts\ts\n");
        assert_eq!(stats.input_reads, 3);
        assert_eq!(stats.output_reads, 2);
        assert_eq!(stats.discarded_too_short, 1);
    }

    #[test]
    fn test_many_workers_keep_every_read() {
        let text: String = (0..500).map(|i| format!(">r{i}\n{INSERT}{}\n", &ADAPTER[..(i % 15) + 6])).collect();
        let cfg = TrimConfig { threads: 4, batch_size: 7, ..adapter_cfg() };
        let (res, sinks) = run_with(&cfg, &text, None);
        let stats = res.unwrap();
        assert_eq!(stats.input_reads, 500);
        assert_eq!(stats.output_reads, 500);
        assert_eq!(stats.adapter_trimmed_reads, 500);
        let out = sinks.out.contents();
        assert_eq!(out.lines().filter(|l| l.starts_with('>')).count(), 500);
        assert!(out.lines().filter(|l| !l.starts_with('>')).all(|l| l == INSERT));
    }

    #[test]
    fn test_paired_count_mismatch_is_fatal() {
        let r1 = format!(">p1/1\n{INSERT}\n>p2/1\n{INSERT}\n");
        let r2 = format!(">p1/2\n{INSERT}\n");
        let (res, _) = run_with(&TrimConfig::default(), &r1, Some(&r2));
        assert!(matches!(res, Err(TrimError::PairedCountMismatch { .. })));
        // the longer file being the mate file is caught too
        let (res, _) = run_with(&TrimConfig::default(), &r2, Some(&r1));
        assert!(matches!(res, Err(TrimError::PairedCountMismatch { .. })));
    }

    #[test]
    fn test_mate_id_check() {
        let r1 = format!(">p1/1\n{INSERT}\n");
        let r2 = format!(">q1/2\n{INSERT}\n");
        let (res, _) = run_with(&TrimConfig::default(), &r1, Some(&r2));
        assert!(matches!(res, Err(TrimError::MateIdMismatch { .. })));
        let cfg = TrimConfig { mate_check: false, ..TrimConfig::default() };
        let (res, sinks) = run_with(&cfg, &r1, Some(&r2));
        assert_eq!(res.unwrap().output_pairs, 1);
        assert_eq!(sinks.mate.contents(), format!(">q1/2\n{INSERT}\n"));
    }

    #[test]
    fn test_pair_needs_both_mates_unless_rescued() {
        let r1 = format!(">p1/1\n{INSERT}\n");
        let r2 = ">p1/2\nACGT\n";
        let (res, sinks) = run_with(&TrimConfig::default(), &r1, Some(r2));
        assert_eq!(res.unwrap().output_pairs, 0);
        assert_eq!(sinks.out.contents(), "");
        assert_eq!(sinks.report.contents(), "p1/2\ts\ts\n");

        let cfg = TrimConfig { rescue_mates: true, ..TrimConfig::default() };
        let (res, sinks) = run_with(&cfg, &r1, Some(r2));
        assert_eq!(res.unwrap().output_pairs, 1);
        assert_eq!(sinks.out.contents(), format!(">p1/1\n{INSERT}\n"));
        assert_eq!(sinks.mate.contents(), ">p1/2\nA\n");
    }

    #[test]
    fn test_only_trimmed_and_renaming() {
        let text = format!(">r1\n{INSERT}{ADAPTER}\n>r2\n{INSERT}\n");
        let cfg = TrimConfig { only_trimmed: true, rename_prefix: Some("s".into()), trim_info: true, ..adapter_cfg() };
        let (res, sinks) = run_with(&cfg, &text, None);
        res.unwrap();
        assert_eq!(sinks.out.contents(), format!(">s_00000001 0 21\n{INSERT}\n"));
    }

    #[test]
    fn test_collapse_groups_duplicates() {
        let text = format!("@a\n{INSERT}{ADAPTER}\n+\n{q}\n@b\n{INSERT}\n+\n{q2}\n@c\n{INSERT}GG\n+\n{q3}\n",
            q = "I".repeat(51), q2 = "I".repeat(30), q3 = "I".repeat(32));
        let cfg = TrimConfig { collapse: true, ..adapter_cfg() };
        let (res, sinks) = run_with(&cfg, &text, None);
        let stats = res.unwrap();
        let q30 = "I".repeat(30);
        assert_eq!(
            sinks.out.contents(),
            format!("@a_x2\n{INSERT}\n+\n{q30}\n@c_x1\n{INSERT}GG\n+\n{}\n", "I".repeat(32))
        );
        assert_eq!(stats.unique_sequences, 2);
        assert_eq!(stats.max_multiplicity, 2);
        assert_eq!(stats.output_reads, 2);
    }

    #[test]
    fn test_phred_conversion_on_output() {
        let text = format!("@r\n{INSERT}\n+\n{}\n", "5".repeat(30));
        let cfg = TrimConfig { convert_phred: true, ..TrimConfig::default() };
        let (res, sinks) = run_with(&cfg, &text, None);
        res.unwrap();
        assert_eq!(sinks.out.contents(), format!("@r\n{INSERT}\n+\n{}\n", "T".repeat(30)));
    }

    #[test]
    fn test_malformed_input_fails_run() {
        let (res, _) = run_with(&TrimConfig { threads: 3, ..TrimConfig::default() }, "r1\nACGT\n", None);
        assert!(matches!(res, Err(TrimError::MalformedRecord { .. })));
    }
}
