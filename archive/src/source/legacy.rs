//! Legacy archive format: one bare transaction object per line

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::Result,
    source::{reader::LineReader, ArchiveFormat, Source},
    types::{Tx, TxRecord},
};

/// Source over a legacy archive.
///
/// Legacy lines carry no block metadata; records come back with neither a
/// block number nor a timestamp.
#[derive(Debug)]
pub struct LegacySource<R = BufReader<File>> {
    lines: LineReader<R>,
}

impl LegacySource {
    /// Open a legacy archive file
    pub async fn open(path: &Path, follow: bool) -> Result<Self> {
        let file = File::open(path).await?;
        debug!(path = %path.display(), follow, "Opened legacy archive");
        Ok(Self::from_reader(BufReader::new(file), follow))
    }
}

impl<R> LegacySource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Read a legacy archive from any buffered reader
    pub fn from_reader(reader: R, follow: bool) -> Self {
        Self {
            lines: LineReader::new(reader, follow),
        }
    }
}

#[async_trait]
impl<R> Source for LegacySource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Legacy
    }

    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<TxRecord>> {
        let tx = self
            .lines
            .next_record(cancel, |line| serde_json::from_slice::<Tx>(line))
            .await?;
        Ok(tx.map(TxRecord::bare))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!(lines = self.lines.lines_read(), "Closing legacy archive");
        Ok(())
    }
}
