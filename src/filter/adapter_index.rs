//! Adapter descriptors, their 6-mer position tables and the adapter file parser.

use std::fs;

use super::End;
use crate::errors::{Result, TrimError};

pub const KMER: usize = 6;
const TABLE_SIZE: usize = 1 << (2 * KMER);

/// 2-bit code of an unambiguous base.
pub fn base_code(b: u8) -> Option<usize> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Yields `(position, code)` for every 6-mer of `seq` made only of A/C/G/T.
pub fn kmers(seq: &[u8]) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mask = TABLE_SIZE - 1;
    let mut code = 0usize;
    let mut valid = 0usize;
    seq.iter().enumerate().filter_map(move |(i, &b)| {
        match base_code(b) {
            Some(c) => {
                code = ((code << 2) | c) & mask;
                valid += 1;
            }
            None => {
                code = 0;
                valid = 0;
            }
        }
        if valid >= KMER {
            Some((i + 1 - KMER, code))
        } else {
            None
        }
    })
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            other => other,
        })
        .collect()
}

/// Offsets of every 6-mer in one adapter orientation, in ascending order.
#[derive(Debug, Clone)]
pub struct KmerIndex {
    table: Box<[Vec<u32>]>,
}

impl KmerIndex {
    pub fn new(seq: &[u8]) -> Self {
        let mut table = vec![Vec::new(); TABLE_SIZE].into_boxed_slice();
        for (pos, code) in kmers(seq) {
            table[code].push(pos as u32);
        }
        Self { table }
    }

    pub fn offsets(&self, code: usize) -> &[u32] {
        &self.table[code]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterEnd {
    Five,
    Three,
    /// Trimmable from either end; registered on both sets.
    Either,
}

/// One searchable orientation of an adapter.
#[derive(Debug, Clone)]
pub struct Oriented {
    pub seq: Vec<u8>,
    pub kmers: KmerIndex,
}

#[derive(Debug, Clone)]
pub struct AdapterDescriptor {
    /// 0-based position in load order; `--aidx` reports it as `b` + index.
    pub index: usize,
    pub end: AdapterEnd,
    /// Forward orientation first, then the reverse complement when enabled.
    pub orientations: Vec<Oriented>,
    /// Alignment length at which a hit counts as strong.
    pub min_align_len: usize,
}

impl AdapterDescriptor {
    pub fn new(index: usize, seq: &[u8], end: AdapterEnd, rev_compl: bool) -> Self {
        let seq = seq.to_ascii_uppercase();
        let mut orientations = Vec::with_capacity(2);
        if rev_compl {
            let rc = reverse_complement(&seq);
            orientations.push(Oriented { kmers: KmerIndex::new(&seq), seq });
            orientations.push(Oriented { kmers: KmerIndex::new(&rc), seq: rc });
        } else {
            orientations.push(Oriented { kmers: KmerIndex::new(&seq), seq });
        }
        let alen = orientations[0].seq.len();
        Self { index, end, orientations, min_align_len: safe_len(alen) }
    }
}

fn safe_len(alen: usize) -> usize {
    let r = (alen as f64 * 0.6).round() as usize;
    r.max(alen.min(9))
}

/// All adapters, with the subsets searched at each read end.
#[derive(Debug, Clone, Default)]
pub struct AdapterSet {
    pub all: Vec<AdapterDescriptor>,
    pub five: Vec<usize>,
    pub three: Vec<usize>,
}

impl AdapterSet {
    pub fn new(entries: Vec<(Vec<u8>, AdapterEnd)>, rev_compl: bool) -> Self {
        let mut set = AdapterSet::default();
        for (seq, end) in entries {
            let idx = set.all.len();
            match end {
                AdapterEnd::Five => set.five.push(idx),
                AdapterEnd::Three => set.three.push(idx),
                AdapterEnd::Either => {
                    set.five.push(idx);
                    set.three.push(idx);
                }
            }
            set.all.push(AdapterDescriptor::new(idx, &seq, end, rev_compl));
        }
        set
    }

    /// Adapters searched at `end`, in load order.
    pub fn at_end(&self, end: End) -> impl Iterator<Item = &AdapterDescriptor> {
        let ids = match end {
            End::Five => &self.five,
            End::Three => &self.three,
        };
        ids.iter().map(move |&i| &self.all[i])
    }
}

pub fn load_adapter_file(path: &str) -> Result<Vec<(Vec<u8>, AdapterEnd)>> {
    let text = fs::read_to_string(path)
        .map_err(|e| TrimError::AdapterFile { path: path.to_string(), reason: e.to_string() })?;
    let entries = parse_adapter_lines(&text);
    if entries.is_empty() {
        return Err(TrimError::AdapterFile { path: path.to_string(), reason: "no adapter sequences found".into() });
    }
    Ok(entries)
}

fn is_ignored_token(tok: &str) -> bool {
    tok.is_empty() || tok == "-" || tok == "N/A" || tok == "."
}

const DELIMS: &[char] = &['\t', ' ', ';', ',', ':'];

/// Parses adapter file text into `(sequence, end)` entries in file order.
pub fn parse_adapter_lines(text: &str) -> Vec<(Vec<u8>, AdapterEnd)> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.len() <= 3 || line.starts_with('#') {
            continue;
        }
        if line.starts_with(DELIMS) {
            // leading delimiter: a 3'-only adapter
            let tok = line[1..].trim().to_ascii_uppercase();
            if !is_ignored_token(&tok) {
                entries.push((tok.into_bytes(), AdapterEnd::Three));
            }
            continue;
        }
        let mut tokens = line.split(DELIMS).filter(|t| !t.is_empty());
        let Some(a5) = tokens.next() else { continue };
        let a5 = a5.to_ascii_uppercase();
        let mut a3 = tokens.next().map(str::to_ascii_uppercase).unwrap_or_default();
        let ends_with_delim = line.ends_with(DELIMS);
        let mut end5 = AdapterEnd::Five;
        if (a3.is_empty() && !ends_with_delim) || a3 == a5 || a3 == "=" {
            a3.clear();
            end5 = AdapterEnd::Either;
        }
        if !is_ignored_token(&a5) {
            entries.push((a5.into_bytes(), end5));
        }
        if !is_ignored_token(&a3) {
            entries.push((a3.into_bytes(), AdapterEnd::Three));
        }
    }
    entries
}
