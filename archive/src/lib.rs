//! # tx-archive
//!
//! Backup and restore of chain transaction history. Transactions are exported
//! block by block from a node into a newline-delimited JSON archive, and an
//! archive can be replayed against a node by resubmitting every transaction in
//! order. Both directions can keep running after the history is exhausted:
//! export watches the chain for new blocks, replay tails the archive for new
//! lines.

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod replay;
pub mod sink;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use client::{Client, HttpClient};
pub use config::{ArchiveSettings, ExportConfig};
pub use error::{ArchiveError, ClientError, Result, ValidationError};
pub use export::ExportService;
pub use replay::ReplayService;
pub use sink::{OutputFile, Sink};
pub use source::{open_source, ArchiveFormat, Source};
pub use types::*;

/// Current version of tx-archive
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
