use std::fs::File;
use std::io::{self, BufWriter, Write};

use log::info;
use serde::Serialize;

use crate::config::Cli;
use crate::fastq::ReadRecord;
use crate::filter::TrimStats;

/// Formats the trim report line for `rec`, or `None` for untouched reads.
///
/// `mate` is 1 or 2 for paired reads and replaces any `/1` or `/2` id suffix.
pub fn trim_line(rec: &ReadRecord, mate: Option<u8>) -> Option<String> {
    if !rec.is_trimmed() && !rec.outcome.is_discard() {
        return None;
    }
    let id = match mate {
        Some(m) => format!("{}/{m}", rec.base_id()),
        None => rec.id.clone(),
    };
    let code = rec.outcome.code_char();
    if rec.ops.is_empty() {
        let c = code.unwrap_or('?');
        return Some(format!("{id}\t{c}\t{c}"));
    }
    let ops: Vec<String> = rec
        .ops
        .iter()
        .map(|op| format!("{}{}{}", op.end.digit(), op.cause.code_char().unwrap_or('?'), op.len))
        .collect();
    let terminal = code.map(String::from).unwrap_or_default();
    Some(format!("{id}\t{}\t{terminal}", ops.join(",")))
}

/// Trim report sink, shared by all workers behind a lock.
pub struct ReportWriter {
    out: Box<dyn Write + Send>,
}

impl ReportWriter {
    pub fn create(path: &str) -> io::Result<Self> {
        Ok(Self::from_writer(Box::new(BufWriter::new(File::create(path)?))))
    }

    pub fn from_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn append(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.out.write_all(line.as_bytes())?;
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Logs the run summary.
pub fn log_summary(stats: &TrimStats, paired: bool) {
    if paired {
        info!("{} input read pairs, {} pairs written", stats.input_pairs, stats.output_pairs);
    }
    info!(
        "{} reads processed, {} ({:.2}%) written",
        stats.input_reads,
        stats.output_reads,
        percent(stats.output_reads, stats.input_reads)
    );
    info!(
        "{} input bases ({} N), {} output bases ({} N)",
        stats.input_bases, stats.input_n_bases, stats.output_bases, stats.output_n_bases
    );
    info!(
        "trimmed at 5': {} reads, {} bases; at 3': {} reads, {} bases",
        stats.trimmed5_reads, stats.trimmed5_bases, stats.trimmed3_reads, stats.trimmed3_bases
    );
    for (label, reads, bases) in [
        ("quality", stats.quality_trimmed_reads, stats.quality_trimmed_bases),
        ("N", stats.n_trimmed_reads, stats.n_trimmed_bases),
        ("poly-A", stats.poly_a_trimmed_reads, stats.poly_a_trimmed_bases),
        ("poly-T", stats.poly_t_trimmed_reads, stats.poly_t_trimmed_bases),
        ("adapter", stats.adapter_trimmed_reads, stats.adapter_trimmed_bases),
    ] {
        if reads > 0 {
            info!("  {label} trimming: {reads} reads, {bases} bases");
        }
    }
    let discarded = stats.discarded_too_short
        + stats.discarded_quality
        + stats.discarded_n
        + stats.discarded_poly
        + stats.discarded_adapter
        + stats.discarded_dust;
    info!(
        "{discarded} reads discarded: {} too short, {} low quality, {} N, {} poly-A/T, {} adapter, {} low complexity",
        stats.discarded_too_short,
        stats.discarded_quality,
        stats.discarded_n,
        stats.discarded_poly,
        stats.discarded_adapter,
        stats.discarded_dust
    );
    if stats.unique_sequences > 0 {
        info!("{} unique sequences after collapsing", stats.unique_sequences);
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    options: &'a Cli,
    stats: &'a TrimStats,
}

pub fn write_json(path: &str, cli: &Cli, stats: &TrimStats) -> io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut f, &Summary { options: cli, stats })?;
    f.write_all(b"\n")?;
    f.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastq::tests::SharedBuf;
    use crate::filter::{End, TrimCode, TrimOp};

    fn rec_with(ops: Vec<TrimOp>, outcome: TrimCode) -> ReadRecord {
        let mut rec = ReadRecord::new("r1", None, vec![b'A'; 40], None);
        for op in &ops {
            match op.end {
                End::Five => rec.trim5 += op.len,
                End::Three => rec.trim3 += op.len,
            }
        }
        rec.ops = ops;
        rec.outcome = outcome;
        rec
    }

    #[test]
    fn test_untouched_read_has_no_line() {
        assert_eq!(trim_line(&rec_with(vec![], TrimCode::Untouched), None), None);
    }

    #[test]
    fn test_trimmed_kept_line() {
        let rec = rec_with(
            vec![
                TrimOp { end: End::Five, cause: TrimCode::Quality, len: 3 },
                TrimOp { end: End::Three, cause: TrimCode::Adapter(None), len: 12 },
            ],
            TrimCode::TrimmedKept,
        );
        assert_eq!(trim_line(&rec, None).unwrap(), "r1\t5Q3,3V12\t");
        assert_eq!(trim_line(&rec, Some(2)).unwrap(), "r1/2\t5Q3,3V12\t");
    }

    #[test]
    fn test_discard_lines() {
        let rec = rec_with(vec![TrimOp { end: End::Three, cause: TrimCode::PolyA, len: 30 }], TrimCode::PolyA);
        assert_eq!(trim_line(&rec, Some(1)).unwrap(), "r1/1\t3A30\tA");
        assert_eq!(trim_line(&rec_with(vec![], TrimCode::AmbiguousBases), None).unwrap(), "r1\tN\tN");
        assert_eq!(trim_line(&rec_with(vec![], TrimCode::TooShort), None).unwrap(), "r1\ts\ts");
    }

    #[test]
    fn test_report_writer_appends_lines() {
        let buf = SharedBuf::default();
        let mut w = ReportWriter::from_writer(Box::new(buf.clone()));
        w.append(&["a\t3V5\t".to_string(), "b\ts\ts".to_string()]).unwrap();
        w.flush().unwrap();
        assert_eq!(buf.contents(), "a\t3V5\t\nb\ts\ts\n");
    }

    #[test]
    fn test_json_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let stats = TrimStats { input_reads: 4, output_reads: 3, ..TrimStats::default() };
        let cli = Cli { in1: "reads.fq".into(), ..Cli::default() };
        write_json(path.to_str().unwrap(), &cli, &stats).unwrap();
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["stats"]["input_reads"], 4);
        assert_eq!(v["options"]["in1"], "reads.fq");
    }
}
