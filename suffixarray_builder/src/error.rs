use std::io;

use thiserror::Error;

/// Errors that abort the construction of an index, no partial index is ever written
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("the corpus is too large: {0}")]
    CorpusTooLarge(String),

    #[error("not enough memory to build the index, about {required} bytes are needed{}", describe_limit(.limit))]
    OutOfMemory { required: u64, limit: Option<u64> },

    #[error("the sample rate must be at least 1")]
    InvalidSampleRate,

    #[error("bits per value must be between 1 and 64, got {0}")]
    InvalidBitsPerValue(usize),

    #[error("building the suffix array failed: {0}")]
    ConstructionFailed(String),
}

fn describe_limit(limit: &Option<u64>) -> String {
    match limit {
        Some(limit) => format!(" but the memory limit is {limit} bytes"),
        None => String::new(),
    }
}

/// Errors that occur when a stored index can not be used
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("the index file is corrupt: {0}")]
    CorruptArtifact(String),

    #[error("the index was built for a different database: {0}")]
    MismatchedDatabase(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
