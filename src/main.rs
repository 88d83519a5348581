mod config;
mod dedup;
mod errors;
mod fastq;
mod filter;
mod report;
mod threading;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use crate::config::{Cli, TrimConfig};
use crate::fastq::{OutputStyle, Reader, Writer};
use crate::report::ReportWriter;
use crate::threading::{Input, Output, Pipeline};

fn open_reader(path: &str) -> Result<Reader> {
    Reader::new(path).with_context(|| format!("cannot open input file '{path}'"))
}

fn open_writer(path: Option<&str>, level: u32) -> Result<Writer> {
    Writer::new(path, level).with_context(|| format!("cannot create output file '{}'", path.unwrap_or("-")))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let cfg = TrimConfig::try_from(&cli)?;
    match &cfg.input2 {
        Some(mates) => info!("Processing paired input files: {}, {}", cfg.input1, mates),
        None => info!("Processing input file: {}", cfg.input1),
    }
    if !cfg.adapters.is_empty() {
        info!("{} adapter entries loaded", cfg.adapters.len());
    }

    let reads = open_reader(&cfg.input1)?;
    let mates = cfg.input2.as_deref().map(open_reader).transpose()?;
    let out = open_writer(cfg.output1.as_deref(), cfg.compression)?;
    let mate_out = cfg.output2.as_deref().map(|p| open_writer(Some(p), cfg.compression)).transpose()?;
    let trim_report = cfg
        .report
        .as_deref()
        .map(|p| ReportWriter::create(p).with_context(|| format!("cannot create trim report '{p}'")))
        .transpose()?;

    let style = OutputStyle { trim_info: cfg.trim_info, rename_prefix: cfg.rename_prefix.clone() };
    let input = Input::new(reads, mates, cfg.mate_check);
    let output = Output::new(out, mate_out, style);
    let stats = Pipeline::new(&cfg, input, output, trim_report).run()?;

    report::log_summary(&stats, cfg.paired());
    if let Some(path) = &cli.json {
        report::write_json(path, &cli, &stats).with_context(|| format!("cannot write JSON summary '{path}'"))?;
    }
    Ok(())
}
