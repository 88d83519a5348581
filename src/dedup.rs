use std::collections::HashMap;

use log::info;

use crate::errors::{Result, TrimError};
use crate::fastq::{ReadRecord, Writer};
use crate::filter::dust::DustMasker;
use crate::filter::TrimStats;
use crate::report::ReportWriter;

/// All reads sharing one trimmed sequence.
struct Group {
    seq: Vec<u8>,
    id: String,
    count: u64,
    /// Running mean of the raw quality bytes.
    qual: Option<Vec<f64>>,
}

/// Collapses identical trimmed sequences, keeping first-seen order.
#[derive(Default)]
pub struct DedupStore {
    index: HashMap<Vec<u8>, usize>,
    groups: Vec<Group>,
}

/// How collapsed groups are written by [`DedupStore::flush`].
pub struct FlushOptions {
    pub rename_prefix: Option<String>,
    pub dust: Option<DustMasker>,
    pub dust_mask: bool,
    pub phred_shift: i16,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Folds the trimmed part of `rec` into its group.
    pub fn add(&mut self, rec: &ReadRecord) -> Result<()> {
        let seq = rec.trimmed_seq();
        let qual = rec.trimmed_qual();
        let Some(&gi) = self.index.get(seq) else {
            self.index.insert(seq.to_vec(), self.groups.len());
            self.groups.push(Group {
                seq: seq.to_vec(),
                id: rec.id.clone(),
                count: 1,
                qual: qual.map(|q| q.iter().map(|&b| f64::from(b)).collect()),
            });
            return Ok(());
        };
        let group = &mut self.groups[gi];
        group.count += 1;
        match (&mut group.qual, qual) {
            (Some(mean), Some(q)) => {
                if mean.len() != q.len() {
                    return Err(TrimError::LengthMismatch { expected: mean.len(), found: q.len() });
                }
                let n = group.count as f64;
                for (m, &b) in mean.iter_mut().zip(q) {
                    *m += (f64::from(b) - *m) / n;
                }
            }
            (None, None) => {}
            (Some(mean), None) => return Err(TrimError::LengthMismatch { expected: mean.len(), found: 0 }),
            (None, Some(q)) => return Err(TrimError::LengthMismatch { expected: 0, found: q.len() }),
        }
        Ok(())
    }

    /// Writes every group as one record named `<id>_x<count>`.
    ///
    /// Groups failing the dust filter are only reported. Returns the counts
    /// of what was written and dropped.
    pub fn flush(
        self,
        writer: &mut Writer,
        mut report: Option<&mut ReportWriter>,
        mut opts: FlushOptions,
    ) -> Result<TrimStats> {
        let mut stats = TrimStats::default();
        let mut counter = 0u64;
        let mut max_seq = Vec::new();
        for group in self.groups {
            if group.count > stats.max_multiplicity {
                stats.max_multiplicity = group.count;
                max_seq.clone_from(&group.seq);
            }
            let mut seq = group.seq;
            if let Some(masker) = opts.dust.as_mut() {
                let (masked, n) = masker.mask(&seq);
                if n > seq.len() / 2 {
                    stats.discarded_dust += group.count;
                    if let Some(r) = report.as_deref_mut() {
                        r.append(&[format!("{}_x{}\tD", group.id, group.count)])?;
                    }
                    continue;
                }
                if opts.dust_mask {
                    seq = masked;
                }
            }
            counter += 1;
            let name = match &opts.rename_prefix {
                Some(prefix) => format!("{prefix}{counter:08}_x{}", group.count),
                None => format!("{}_x{}", group.id, group.count),
            };
            let qual: Option<Vec<u8>> = group.qual.map(|q| q.iter().map(|&m| m.round() as u8).collect());
            writer.write_fastx(&name, &seq, qual.as_deref(), opts.phred_shift)?;
            stats.record_output(&seq);
            stats.unique_sequences += 1;
        }
        if let Some(line) = multiplicity_line(stats.max_multiplicity, &max_seq) {
            info!("{line}");
        }
        Ok(stats)
    }
}

/// Summary line for the most duplicated sequence, if any read was duplicated.
fn multiplicity_line(count: u64, seq: &[u8]) -> Option<String> {
    (count > 1).then(|| format!("Maximum read multiplicity: x{count} ({})", String::from_utf8_lossy(seq)))
}
