//! Error types for the probes
//!
//! Probes surface typed errors; the aggregator turns them into `error`
//! strings inside the report so one failing subsystem never aborts the run.

use thiserror::Error;

/// Errors raised while running a probe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to spawn worker {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("could not allocate {bytes} byte buffer")]
    Allocation { bytes: usize },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("speed-test server {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("no usable speed-test server")]
    NoServer,

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("compute runtime error: {0}")]
    Runtime(String),
}

/// Errors from parsing a human buffer size such as `256M`
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("empty size")]
    Empty,

    #[error("invalid size '{0}'")]
    Invalid(String),

    #[error("size '{0}' is out of range")]
    OutOfRange(String),
}
