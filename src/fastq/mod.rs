use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::ops::Range;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::{Result, TrimError};
use crate::filter::{TrimCode, TrimOp};

/// FASTA lines are wrapped at this many bases on output.
const FASTA_LINE_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqFormat {
    Fasta,
    Fastq,
}

/// One read as it flows through the trimming pipeline.
///
/// `seq` and `qual` keep the original bases; trimming only moves `trim5`
/// and `trim3`, so `trim5 + trim3 <= seq.len()` holds at every stage.
#[derive(Debug, Clone, Default)]
pub struct ReadRecord {
    pub id: String,
    pub annotation: Option<String>,
    pub seq: Vec<u8>,
    /// `None` for FASTA input.
    pub qual: Option<Vec<u8>>,
    pub trim5: usize,
    pub trim3: usize,
    pub ops: Vec<TrimOp>,
    pub outcome: TrimCode,
}

impl ReadRecord {
    pub fn new(id: impl Into<String>, annotation: Option<String>, seq: Vec<u8>, qual: Option<Vec<u8>>) -> Self {
        Self { id: id.into(), annotation, seq, qual, ..Default::default() }
    }

    /// Range of `seq` that survives the trimming done so far.
    pub fn window(&self) -> Range<usize> {
        self.trim5..self.seq.len() - self.trim3
    }

    pub fn trimmed_len(&self) -> usize {
        self.seq.len() - self.trim5 - self.trim3
    }

    pub fn trimmed_seq(&self) -> &[u8] {
        &self.seq[self.window()]
    }

    pub fn trimmed_qual(&self) -> Option<&[u8]> {
        let w = self.window();
        self.qual.as_deref().map(|q| &q[w])
    }

    pub fn is_trimmed(&self) -> bool {
        self.trim5 > 0 || self.trim3 > 0
    }

    /// Read id without a trailing `/1` or `/2` mate suffix.
    pub fn base_id(&self) -> &str {
        self.id.strip_suffix("/1").or_else(|| self.id.strip_suffix("/2")).unwrap_or(&self.id)
    }
}

pub struct Reader {
    reader: Box<dyn BufRead + Send>,
    path: String,
    pushed_back: Option<Vec<u8>>,
    format: Option<SeqFormat>,
}

impl Reader {
    /// Opens `path` for reading; `-` reads stdin and a `.gz` suffix is decompressed.
    pub fn new(path: &str) -> io::Result<Self> {
        let reader: Box<dyn BufRead + Send> = if path == "-" || path == "/dev/stdin" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let f = File::open(path)?;
            if path.ends_with(".gz") {
                Box::new(BufReader::new(MultiGzDecoder::new(f)))
            } else {
                Box::new(BufReader::new(f))
            }
        };
        Ok(Self::from_reader(reader, path))
    }

    pub fn from_reader(reader: Box<dyn BufRead + Send>, path: &str) -> Self {
        Self { reader, path: path.to_string(), pushed_back: None, format: None }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.pushed_back.take() {
            return Ok(Some(line));
        }
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(Some(line))
    }

    pub fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(l) if l.first().map_or(true, |c| c.is_ascii_whitespace()) => continue,
                Some(l) => break l,
            }
        };
        let format = match header[0] {
            b'>' => SeqFormat::Fasta,
            b'@' => SeqFormat::Fastq,
            _ => {
                return Err(TrimError::malformed(
                    &self.path,
                    format!("fasta/fastq record marker not found: {}", String::from_utf8_lossy(&header)),
                ))
            }
        };
        match self.format {
            None => self.format = Some(format),
            Some(f) if f != format => {
                return Err(TrimError::malformed(&self.path, "FASTA and FASTQ records mixed in one file"))
            }
            Some(_) => {}
        }
        let (id, annotation) = split_header(&header[1..]);

        let stop_marker = match format {
            SeqFormat::Fasta => b'>',
            SeqFormat::Fastq => b'+',
        };
        let mut seq = Vec::new();
        let mut at_eof = true;
        // sequence can span multiple lines
        while let Some(line) = self.next_line()? {
            if line.first() == Some(&stop_marker) {
                self.pushed_back = Some(line);
                at_eof = false;
                break;
            }
            seq.extend_from_slice(&line);
        }
        seq.make_ascii_uppercase();

        let qual = match format {
            SeqFormat::Fasta => None,
            SeqFormat::Fastq => {
                if at_eof {
                    return Err(TrimError::malformed(
                        &self.path,
                        format!("unexpected end of input after sequence for read {id}"),
                    ));
                }
                // the '+' line pushed back above
                self.next_line()?;
                let mut qual = Vec::with_capacity(seq.len());
                while qual.len() < seq.len() {
                    match self.next_line()? {
                        Some(line) => qual.extend_from_slice(&line),
                        None => {
                            return Err(TrimError::malformed(
                                &self.path,
                                format!("unexpected end of input in quality values for read {id}"),
                            ))
                        }
                    }
                }
                if qual.len() != seq.len() {
                    return Err(TrimError::malformed(
                        &self.path,
                        format!("quality length {} differs from sequence length {} for read {id}", qual.len(), seq.len()),
                    ));
                }
                Some(qual)
            }
        };
        Ok(Some(ReadRecord::new(id, annotation, seq, qual)))
    }
}

/// Splits a header line (without its marker) at the first whitespace into id and annotation.
fn split_header(header: &[u8]) -> (String, Option<String>) {
    let text = String::from_utf8_lossy(header);
    match text.find(|c: char| c <= ' ') {
        Some(i) => {
            let rest = text[i + 1..].trim();
            let annotation = if rest.is_empty() { None } else { Some(rest.to_string()) };
            (text[..i].to_string(), annotation)
        }
        None => (text.into_owned(), None),
    }
}

/// How surviving reads are named on output.
#[derive(Debug, Clone, Default)]
pub struct OutputStyle {
    /// Append ` <trim5> <trim3>` after the read name.
    pub trim_info: bool,
    /// Replace read names with `<prefix>_<counter>`.
    pub rename_prefix: Option<String>,
}

pub struct Writer {
    writer: Box<dyn Write + Send>,
}

impl Writer {
    /// Opens `path` for writing; `None` or `-` writes stdout and a `.gz` suffix is compressed.
    pub fn new(path: Option<&str>, compression_level: u32) -> io::Result<Self> {
        let writer: Box<dyn Write + Send> = match path {
            None | Some("-") | Some("/dev/stdout") => Box::new(io::BufWriter::new(io::stdout())),
            Some(p) => {
                let f = File::create(p)?;
                if p.ends_with(".gz") {
                    Box::new(GzEncoder::new(f, Compression::new(compression_level)))
                } else {
                    Box::new(io::BufWriter::new(f))
                }
            }
        };
        Ok(Self::from_writer(writer))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }

    /// Writes the trimmed part of `rec`. `counter` numbers renamed reads and
    /// `phred_shift` is added to every quality byte.
    pub fn write_read(&mut self, rec: &ReadRecord, style: &OutputStyle, counter: u64, phred_shift: i16) -> io::Result<()> {
        let mut seq = rec.trimmed_seq();
        let mut qual = rec.trimmed_qual();
        if seq.is_empty() {
            seq = b"A";
            qual = qual.map(|_| &b"B"[..]);
        }
        let mut name = match &style.rename_prefix {
            Some(prefix) => format!("{prefix}_{counter:08}"),
            None => rec.id.clone(),
        };
        if style.trim_info {
            name.push_str(&format!(" {} {}", rec.trim5, rec.trim3));
        }
        if style.rename_prefix.is_none() {
            if let Some(ann) = &rec.annotation {
                name.push(' ');
                name.push_str(ann);
            }
        }
        self.write_fastx(&name, seq, qual, phred_shift)
    }

    /// Writes one record verbatim: FASTQ when `qual` is present, FASTA otherwise.
    pub fn write_fastx(&mut self, name: &str, seq: &[u8], qual: Option<&[u8]>, phred_shift: i16) -> io::Result<()> {
        match qual {
            Some(q) => {
                self.writer.write_all(b"@")?;
                self.writer.write_all(name.as_bytes())?;
                self.writer.write_all(b"\n")?;
                self.writer.write_all(seq)?;
                self.writer.write_all(b"\n+\n")?;
                if phred_shift == 0 {
                    self.writer.write_all(q)?;
                } else {
                    let shifted: Vec<u8> = q.iter().map(|&b| (i16::from(b) + phred_shift) as u8).collect();
                    self.writer.write_all(&shifted)?;
                }
                self.writer.write_all(b"\n")?;
            }
            None => {
                self.writer.write_all(b">")?;
                self.writer.write_all(name.as_bytes())?;
                self.writer.write_all(b"\n")?;
                for line in seq.chunks(FASTA_LINE_LEN) {
                    self.writer.write_all(line)?;
                    self.writer.write_all(b"\n")?;
                }
            }
        }
        Ok(())
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
