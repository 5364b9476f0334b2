//! Error types for the archive engines

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Structural problems with an export configuration, detected before any I/O
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid output file location")]
    InvalidOutputLocation,

    #[error("output file already exists: {}", .0.display())]
    OutputAlreadyExists(PathBuf),

    #[error("invalid block range: to block {to} is below from block {from}")]
    InvalidRange { from: u64, to: u64 },
}

/// Failures coming from the node client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid remote address: {0}")]
    InvalidRemote(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid node response: {0}")]
    InvalidResponse(String),

    #[error("transaction rejected by node (code {code}): {log}")]
    Rejected { code: u64, log: String },
}

impl ClientError {
    /// Create a new invalid response error
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse(message.into())
    }
}

/// Errors returned by the export and replay engines
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("unable to determine right bound: {0}")]
    Resolve(#[source] ClientError),

    #[error("unable to fetch latest block number: {0}")]
    LatestHeight(#[source] ClientError),

    #[error("unable to fetch transactions for block {height}: {source}")]
    Fetch {
        height: u64,
        #[source]
        source: ClientError,
    },

    #[error("unable to encode tx data for block {height}: {source}")]
    Encode {
        height: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write tx data for block {height}: {source}")]
    Write {
        height: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to flush archive output: {0}")]
    Flush(#[source] std::io::Error),

    #[error("unable to read archive: {0}")]
    Read(#[source] std::io::Error),

    #[error("malformed archive record on line {line}: {source}")]
    Decode {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to submit transaction: {0}")]
    Submit(#[source] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Get the error category for log and metric labels
    pub fn category(&self) -> &'static str {
        match self {
            ArchiveError::InvalidConfig(_) => "validation",
            ArchiveError::Resolve(_) => "resolution",
            ArchiveError::LatestHeight(_) => "client",
            ArchiveError::Fetch { .. } => "fetch",
            ArchiveError::Encode { .. } => "serialization",
            ArchiveError::Write { .. } => "write",
            ArchiveError::Flush(_) => "write",
            ArchiveError::Read(_) => "read",
            ArchiveError::Decode { .. } => "decode",
            ArchiveError::Submit(_) => "submit",
            ArchiveError::Io(_) => "io",
        }
    }
}
