//! Error types for fqtrim-rs.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrimError>;

/// Fatal conditions. Anything that only affects a single read is reported
/// through its [`TrimCode`](crate::filter::TrimCode) instead.
#[derive(Error, Debug)]
pub enum TrimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be parsed from the input stream.
    #[error("Malformed record in '{path}': {reason}")]
    MalformedRecord {
        /// Input path (or `-` for stdin)
        path: String,
        /// What was wrong with the record
        reason: String,
    },

    #[error("Couldn't determine the Phred encoding of quality values, please use -P33 or -P64")]
    EncodingUndetermined,

    #[error("Mismatch in the count of reads vs mates ('{path1}' vs '{path2}')")]
    PairedCountMismatch { path1: String, path2: String },

    #[error("No paired match for read {id1} vs {id2} ('{path1}', '{path2}')")]
    MateIdMismatch { id1: String, id2: String, path1: String, path2: String },

    /// Two reads with the same sequence carried quality strings of different length.
    #[error("Cannot collapse reads with different quality length: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    #[error("Invalid adapter file '{path}': {reason}")]
    AdapterFile { path: String, reason: String },

    #[error("A worker thread panicked")]
    WorkerPanic,
}

impl TrimError {
    pub fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord { path: path.to_string(), reason: reason.into() }
    }

    pub fn invalid(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
    }
}
