//! Archive sources for replay
//!
//! A source is a pull-based cursor over an archive. The format is chosen once
//! when the source is opened and never changes for its lifetime.

pub mod legacy;
mod reader;
pub mod standard;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ArchiveError, Result},
    types::TxRecord,
};

pub use legacy::LegacySource;
pub use standard::{decode_tx_data, encode_tx_data, StandardSource};

/// Archive serialization schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Transaction with block number and block time
    Standard,

    /// Bare transaction payload
    Legacy,
}

impl ArchiveFormat {
    /// Get the format name
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Standard => "standard",
            ArchiveFormat::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(ArchiveFormat::Standard),
            "legacy" => Ok(ArchiveFormat::Legacy),
            _ => Err(format!("unknown archive format: {s}")),
        }
    }
}

/// Pull-based cursor over archived transactions
#[async_trait]
pub trait Source: Send {
    /// Format this source decodes
    fn format(&self) -> ArchiveFormat;

    /// Read the next record.
    ///
    /// Returns `None` at the end of the available data, or when `cancel` has
    /// fired before the next line was read. A malformed line is a
    /// [`ArchiveError::Decode`] error.
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<TxRecord>>;

    /// Release the underlying reader. Unread records are discarded.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Open an archive file with the given format.
///
/// With `follow` set the source tolerates a line that is still being written.
pub async fn open_source(
    path: &Path,
    format: ArchiveFormat,
    follow: bool,
) -> Result<Box<dyn Source>> {
    if !path.is_file() {
        return Err(ArchiveError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("archive not found: {}", path.display()),
        )));
    }

    let source: Box<dyn Source> = match format {
        ArchiveFormat::Standard => Box::new(StandardSource::open(path, follow).await?),
        ArchiveFormat::Legacy => Box::new(LegacySource::open(path, follow).await?),
    };

    Ok(source)
}
