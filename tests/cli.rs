//! End-to-end tests running the `fqtrim-rs` binary over temporary files.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

const ADAPTER: &str = "TGGAATTCTCGGGTGCCAAGG";
const INSERT: &str = "ACGTTGCATGCAAGTCCGATCAGTTACGGA";

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fqtrim-rs")).args(args).output().expect("failed to run fqtrim-rs")
}

fn path_str(p: &Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn test_internal_n_block_is_discarded() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "in.fa", ">r1\nACGTNNNNACGT\n");
    let out = dir.path().join("out.fa");
    let rep = dir.path().join("trim.txt");

    let res = run(&["-i", path_str(&input), "-o", path_str(&out), "-r", path_str(&rep), "-l", "10"]);
    assert!(res.status.success(), "stderr: {}", String::from_utf8_lossy(&res.stderr));
    assert_eq!(fs::read_to_string(&out).unwrap(), "");
    assert_eq!(fs::read_to_string(&rep).unwrap(), "r1\tN\tN\n");
}

#[test]
fn test_three_prime_adapter_on_fasta() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "in.fa", &format!(">r1\n{INSERT}{ADAPTER}\n"));
    let out = dir.path().join("out.fa");
    let rep = dir.path().join("trim.txt");

    let res = run(&["-i", path_str(&input), "-o", path_str(&out), "-r", path_str(&rep), "-3", ADAPTER]);
    assert!(res.status.success(), "stderr: {}", String::from_utf8_lossy(&res.stderr));
    assert_eq!(fs::read_to_string(&out).unwrap(), format!(">r1\n{INSERT}\n"));
    assert_eq!(fs::read_to_string(&rep).unwrap(), format!("r1\t3V{}\t\n", ADAPTER.len()));
}

#[test]
fn test_adapter_file_with_letters() {
    let dir = TempDir::new().unwrap();
    let adapters = write_file(&dir, "adapters.txt", &format!("# primers\nCCCCCCCCCCCC\n\t{ADAPTER}\n"));
    let input = write_file(&dir, "in.fa", &format!(">r1\n{INSERT}{}\n", &ADAPTER[..15]));
    let out = dir.path().join("out.fa");
    let rep = dir.path().join("trim.txt");

    let res = run(&[
        "-i", path_str(&input), "-o", path_str(&out), "-r", path_str(&rep),
        "-f", path_str(&adapters), "--aidx",
    ]);
    assert!(res.status.success(), "stderr: {}", String::from_utf8_lossy(&res.stderr));
    assert_eq!(fs::read_to_string(&rep).unwrap(), "r1\t3c15\t\n");
}

#[test]
fn test_gzip_fastq_round_trip() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq.gz");
    let mut enc = GzEncoder::new(fs::File::create(&input).unwrap(), Compression::default());
    let qual = "5".repeat(INSERT.len() + 10);
    write!(enc, "@r1 lane=1\n{INSERT}AAAAAAAAAA\n+\n{qual}\n").unwrap();
    enc.finish().unwrap();
    let out = dir.path().join("out.fq.gz");

    let res = run(&["-i", path_str(&input), "-o", path_str(&out), "-T"]);
    assert!(res.status.success(), "stderr: {}", String::from_utf8_lossy(&res.stderr));
    let mut text = String::new();
    MultiGzDecoder::new(fs::File::open(&out).unwrap()).read_to_string(&mut text).unwrap();
    // the trailing A of the insert joins the poly-A tail
    let kept = &INSERT[..INSERT.len() - 1];
    assert_eq!(text, format!("@r1 0 11 lane=1\n{kept}\n+\n{}\n", &qual[..kept.len()]));
}

#[test]
fn test_paired_input_with_json_summary() {
    let dir = TempDir::new().unwrap();
    let r1 = write_file(&dir, "r1.fa", &format!(">p1/1\n{INSERT}\n>p2/1\n{INSERT}\n"));
    let r2 = write_file(&dir, "r2.fa", &format!(">p1/2\n{INSERT}\n>p2/2\nACGT\n"));
    let (o1, o2) = (dir.path().join("o1.fa"), dir.path().join("o2.fa"));
    let json = dir.path().join("summary.json");
    let inputs = format!("{},{}", path_str(&r1), path_str(&r2));

    let res = run(&[
        "-i", &inputs, "-o", path_str(&o1), "-O", path_str(&o2), "-j", path_str(&json), "-p", "2",
    ]);
    assert!(res.status.success(), "stderr: {}", String::from_utf8_lossy(&res.stderr));
    assert_eq!(fs::read_to_string(&o1).unwrap(), format!(">p1/1\n{INSERT}\n"));
    assert_eq!(fs::read_to_string(&o2).unwrap(), format!(">p1/2\n{INSERT}\n"));

    let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(summary["stats"]["input_pairs"], 2);
    assert_eq!(summary["stats"]["output_pairs"], 1);
    assert_eq!(summary["stats"]["discarded_too_short"], 1);
}

#[test]
fn test_paired_count_mismatch_fails() {
    let dir = TempDir::new().unwrap();
    let r1 = write_file(&dir, "r1.fa", &format!(">p1\n{INSERT}\n>p2\n{INSERT}\n"));
    let r2 = write_file(&dir, "r2.fa", &format!(">p1\n{INSERT}\n"));
    let (o1, o2) = (dir.path().join("o1.fa"), dir.path().join("o2.fa"));

    let res = run(&["-i", path_str(&r1), "-I", path_str(&r2), "-o", path_str(&o1), "-O", path_str(&o2)]);
    assert!(!res.status.success());
    assert!(String::from_utf8_lossy(&res.stderr).contains("Mismatch in the count of reads vs mates"));
}

#[test]
fn test_collapse_duplicates() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "in.fa", &format!(">a\n{INSERT}\n>b\n{INSERT}{ADAPTER}\n>c\nGG{INSERT}\n"));
    let out = dir.path().join("out.fa");

    let res = run(&["-i", path_str(&input), "-o", path_str(&out), "-C", "-3", ADAPTER]);
    assert!(res.status.success(), "stderr: {}", String::from_utf8_lossy(&res.stderr));
    assert_eq!(fs::read_to_string(&out).unwrap(), format!(">a_x2\n{INSERT}\n>c_x1\nGG{INSERT}\n"));
}

#[test]
fn test_invalid_options_are_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "in.fa", &format!(">r1\n{INSERT}\n"));

    let res = run(&["-i", path_str(&input), "--aidx"]);
    assert!(!res.status.success());
    assert!(String::from_utf8_lossy(&res.stderr).contains("aidx"));

    let res = run(&["-i", path_str(&input), "-P", "50"]);
    assert!(!res.status.success());

    let res = run(&["-i", path_str(dir.path().join("missing.fa").as_path())]);
    assert!(!res.status.success());
    assert!(String::from_utf8_lossy(&res.stderr).contains("cannot open input file"));
}
