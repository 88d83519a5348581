use clap::{ArgAction, Parser};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TrimError};
use crate::filter::adapter_index::{load_adapter_file, AdapterEnd};

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
#[command(name = "fqtrim-rs", version = "0.1.0", about = "Adapter, poly-A/T, quality and N trimming of FASTA/FASTQ reads")]
pub struct Cli {
    /// Input file, `-` for stdin; `in1.fq,in2.fq` gives a pair
    #[arg(short = 'i', long = "in1")]
    pub in1: String,
    /// Mate input file
    #[arg(short = 'I', long = "in2")]
    pub in2: Option<String>,
    /// Output file (stdout when omitted)
    #[arg(short = 'o', long = "out1")]
    pub out1: Option<String>,
    /// Mate output file
    #[arg(short = 'O', long = "out2")]
    pub out2: Option<String>,
    #[arg(short = 'z', long = "compression", default_value_t = 4)]
    pub compression: u32,

    // Adapter trimming
    /// Adapter file, one adapter (or 5'/3' pair) per line
    #[arg(short = 'f', long = "adapter_file", conflicts_with_all = ["adapter5", "adapter3"])]
    pub adapter_file: Option<String>,
    #[arg(short = '5', long = "adapter5")]
    pub adapter5: Option<String>,
    #[arg(short = '3', long = "adapter3")]
    pub adapter3: Option<String>,
    /// Also search adapter reverse complements
    #[arg(short = 'R', long = "rev_compl", action = ArgAction::SetTrue)]
    pub rev_compl: bool,
    #[arg(short = 'a', long = "min_end_match", default_value_t = 6)]
    pub min_end_match: usize,
    #[arg(long = "pid5", default_value_t = 96.0)]
    pub pid5: f64,
    #[arg(long = "pid3", default_value_t = 94.0)]
    pub pid3: f64,
    #[arg(long = "match", default_value_t = 1)]
    pub match_reward: i32,
    #[arg(long = "mism", default_value_t = 3, allow_hyphen_values = true)]
    pub mismatch_penalty: i32,
    #[arg(long = "xdrop", default_value_t = 8)]
    pub xdrop: i32,

    // Poly-A/T trimming
    #[arg(short = 'A', long = "no_poly", action = ArgAction::SetTrue)]
    pub no_poly: bool,
    #[arg(short = 'B', long = "poly_both_ends", action = ArgAction::SetTrue)]
    pub poly_both_ends: bool,
    #[arg(short = 'y', long = "min_poly", default_value_t = 6)]
    pub min_poly: usize,

    // Quality trimming
    /// Minimum base quality, 0 disables quality trimming
    #[arg(short = 'q', long = "min_qual", default_value_t = 0)]
    pub min_qual: u8,
    #[arg(short = 'w', long = "qual_window", default_value_t = 6)]
    pub qual_window: usize,
    /// Maximum bases trimmed by quality from either end
    #[arg(short = 't', long = "qual_trim_max", default_value_t = 0)]
    pub qual_trim_max: usize,
    #[arg(short = 'P', long = "phred")]
    pub phred: Option<u8>,
    /// Convert qualities between Phred-33 and Phred-64 on output
    #[arg(short = 'Q', long = "convert_phred", action = ArgAction::SetTrue)]
    pub convert_phred: bool,

    // N trimming
    #[arg(short = 'm', long = "max_perc_n", default_value_t = 5.0)]
    pub max_perc_n: f64,
    #[arg(long = "ntrimdist")]
    pub ntrimdist: Option<usize>,
    #[arg(long = "ntrimperc", default_value_t = 12.0)]
    pub ntrimperc: f64,

    #[arg(short = 'l', long = "min_len", default_value_t = 16)]
    pub min_len: usize,

    // Low complexity
    #[arg(short = 'D', long = "dust", action = ArgAction::SetTrue)]
    pub dust: bool,
    /// Hard-mask low complexity regions in the output
    #[arg(long = "dmask", action = ArgAction::SetTrue)]
    pub dmask: bool,
    #[arg(short = 'd', long = "dust_cutoff")]
    pub dust_cutoff: Option<u32>,

    // Collapsing and naming
    #[arg(short = 'C', long = "collapse", action = ArgAction::SetTrue)]
    pub collapse: bool,
    #[arg(short = 'n', long = "rename_prefix")]
    pub rename_prefix: Option<String>,

    // Reporting
    /// Trim report file
    #[arg(short = 'r', long = "report")]
    pub report: Option<String>,
    /// Report adapter hits by their letter in the adapter file
    #[arg(long = "aidx", action = ArgAction::SetTrue)]
    pub aidx: bool,
    #[arg(short = 'T', long = "trim_info", action = ArgAction::SetTrue)]
    pub trim_info: bool,
    #[arg(long = "only_trimmed", action = ArgAction::SetTrue)]
    pub only_trimmed: bool,
    #[arg(short = 'j', long = "json")]
    pub json: Option<String>,
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    // Paired reads
    #[arg(short = 'M', long = "no_mate_check", action = ArgAction::SetTrue)]
    pub no_mate_check: bool,
    /// Keep a pair when either mate survives
    #[arg(long = "rescue_mates", action = ArgAction::SetTrue)]
    pub rescue_mates: bool,

    // Threading
    #[arg(short = 'p', long = "thread", default_value_t = 1)]
    pub thread: usize,
    #[arg(long = "batch_size", default_value_t = 200)]
    pub batch_size: usize,
}

/// Options after validation, with defaults resolved and adapters loaded.
#[derive(Debug, Clone)]
pub struct TrimConfig {
    pub input1: String,
    pub input2: Option<String>,
    pub output1: Option<String>,
    pub output2: Option<String>,
    pub compression: u32,

    pub adapters: Vec<(Vec<u8>, AdapterEnd)>,
    pub rev_compl: bool,
    pub min_end_match: usize,
    pub pid5: f64,
    pub pid3: f64,
    pub match_reward: i32,
    pub mismatch_penalty: i32,
    pub xdrop: i32,

    pub poly: bool,
    pub poly_both_ends: bool,
    pub min_poly: usize,

    pub min_qual: u8,
    pub qual_window: usize,
    pub qual_trim_max: usize,
    pub phred: Option<u8>,
    pub convert_phred: bool,

    pub max_perc_n: f64,
    pub ntrim_dist: Option<usize>,
    pub ntrim_perc: f64,

    pub min_len: usize,

    pub dust: bool,
    pub dust_mask: bool,
    pub dust_cutoff: u32,

    pub collapse: bool,
    pub rename_prefix: Option<String>,

    pub report: Option<String>,
    pub adapter_idx: bool,
    pub trim_info: bool,
    pub only_trimmed: bool,

    pub mate_check: bool,
    pub rescue_mates: bool,

    pub threads: usize,
    pub batch_size: usize,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            input1: "-".to_string(),
            input2: None,
            output1: None,
            output2: None,
            compression: 4,
            adapters: Vec::new(),
            rev_compl: false,
            min_end_match: 6,
            pid5: 96.0,
            pid3: 94.0,
            match_reward: 1,
            mismatch_penalty: 3,
            xdrop: 8,
            poly: true,
            poly_both_ends: false,
            min_poly: 6,
            min_qual: 0,
            qual_window: 6,
            qual_trim_max: 0,
            phred: None,
            convert_phred: false,
            max_perc_n: 5.0,
            ntrim_dist: None,
            ntrim_perc: 12.0,
            min_len: 16,
            dust: false,
            dust_mask: false,
            dust_cutoff: 16,
            collapse: false,
            rename_prefix: None,
            report: None,
            adapter_idx: false,
            trim_info: false,
            only_trimmed: false,
            mate_check: true,
            rescue_mates: false,
            threads: 1,
            batch_size: 200,
        }
    }
}

impl TrimConfig {
    pub fn paired(&self) -> bool {
        self.input2.is_some()
    }
}

/// Splits `a,b` or `a:b` into two names.
fn split_pair(s: &str) -> Option<(String, String)> {
    s.split_once([',', ':']).map(|(a, b)| (a.to_string(), b.to_string()))
}

impl TryFrom<&Cli> for TrimConfig {
    type Error = TrimError;

    fn try_from(cli: &Cli) -> Result<Self> {
        let mut cfg = TrimConfig::default();

        match (&cli.in2, split_pair(&cli.in1)) {
            (Some(in2), _) => {
                cfg.input1 = cli.in1.clone();
                cfg.input2 = Some(in2.clone());
            }
            (None, Some((a, b))) => {
                cfg.input1 = a;
                cfg.input2 = Some(b);
            }
            (None, None) => cfg.input1 = cli.in1.clone(),
        }
        match (&cli.out2, cli.out1.as_deref().and_then(split_pair)) {
            (Some(out2), _) => {
                cfg.output1 = cli.out1.clone();
                cfg.output2 = Some(out2.clone());
            }
            (None, Some((a, b))) if cfg.paired() => {
                cfg.output1 = Some(a);
                cfg.output2 = Some(b);
            }
            _ => cfg.output1 = cli.out1.clone(),
        }
        if cfg.paired() && cfg.output2.is_none() {
            return Err(TrimError::invalid("out2", "paired input needs a mate output file (-O)"));
        }
        if !cfg.paired() && cfg.output2.is_some() {
            return Err(TrimError::invalid("out2", "mate output given without mate input"));
        }
        if cli.compression > 9 {
            return Err(TrimError::invalid("compression", "must be between 0 and 9"));
        }
        cfg.compression = cli.compression;

        if let Some(path) = &cli.adapter_file {
            cfg.adapters = load_adapter_file(path)?;
        } else {
            if let Some(a5) = &cli.adapter5 {
                cfg.adapters.push((a5.to_ascii_uppercase().into_bytes(), AdapterEnd::Five));
            }
            if let Some(a3) = &cli.adapter3 {
                cfg.adapters.push((a3.to_ascii_uppercase().into_bytes(), AdapterEnd::Three));
            }
        }
        cfg.rev_compl = cli.rev_compl;
        if cli.min_end_match > 2 {
            cfg.min_end_match = cli.min_end_match;
        } else {
            warn!("-a value must be > 2, ignoring {} and using {}", cli.min_end_match, cfg.min_end_match);
        }
        cfg.pid5 = cli.pid5;
        cfg.pid3 = cli.pid3;
        cfg.match_reward = cli.match_reward;
        cfg.mismatch_penalty = cli.mismatch_penalty.abs();
        cfg.xdrop = cli.xdrop;

        cfg.poly = !cli.no_poly;
        cfg.poly_both_ends = cli.poly_both_ends;
        if cli.min_poly > 2 {
            cfg.min_poly = cli.min_poly;
        } else {
            warn!("-y value must be > 2, ignoring {} and using {}", cli.min_poly, cfg.min_poly);
        }

        cfg.min_qual = cli.min_qual;
        if cli.qual_window == 0 {
            return Err(TrimError::invalid("qual_window", "must be at least 1"));
        }
        cfg.qual_window = cli.qual_window;
        cfg.qual_trim_max = cli.qual_trim_max;
        if let Some(p) = cli.phred {
            if p != 33 && p != 64 {
                return Err(TrimError::invalid("phred", "only 33 or 64 are valid"));
            }
        }
        cfg.phred = cli.phred;
        cfg.convert_phred = cli.convert_phred;

        cfg.max_perc_n = cli.max_perc_n;
        if cli.ntrimdist == Some(0) {
            return Err(TrimError::invalid("ntrimdist", "must be greater than 0"));
        }
        cfg.ntrim_dist = cli.ntrimdist;
        cfg.ntrim_perc = cli.ntrimperc;
        cfg.min_len = cli.min_len;

        cfg.dust = cli.dust || cli.dmask || cli.dust_cutoff.is_some();
        cfg.dust_mask = cli.dmask;
        cfg.dust_cutoff = cli.dust_cutoff.unwrap_or(cfg.dust_cutoff);

        cfg.report = cli.report.clone();
        cfg.adapter_idx = cli.aidx;
        if cfg.adapter_idx && (cli.report.is_none() || cli.adapter_file.is_none()) {
            return Err(TrimError::invalid("aidx", "requires a trim report (-r) and an adapter file (-f)"));
        }
        cfg.trim_info = cli.trim_info;
        cfg.only_trimmed = cli.only_trimmed;
        cfg.rename_prefix = cli.rename_prefix.clone();

        cfg.mate_check = !cli.no_mate_check;
        cfg.rescue_mates = cli.rescue_mates;

        if cli.batch_size == 0 {
            return Err(TrimError::invalid("batch_size", "must be at least 1"));
        }
        cfg.batch_size = cli.batch_size;
        cfg.threads = if cli.thread == 0 { num_cpus::get() } else { cli.thread };

        cfg.collapse = cli.collapse;
        if cfg.collapse {
            if cfg.paired() {
                return Err(TrimError::invalid("collapse", "cannot collapse duplicates of paired reads"));
            }
            if cfg.threads > 1 {
                warn!("collapsing duplicates runs on a single thread, ignoring -p {}", cli.thread);
                cfg.threads = 1;
            }
        }
        Ok(cfg)
    }
}
