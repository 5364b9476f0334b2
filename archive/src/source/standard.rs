//! Standard archive format: one `{tx, blockNum, bt}` object per line

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::Result,
    source::{reader::LineReader, ArchiveFormat, Source},
    types::{TxData, TxRecord},
};

/// Serialize tx data into a single archive line, newline included
pub fn encode_tx_data(data: &TxData) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(data)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode a single standard archive line
pub fn decode_tx_data(line: &[u8]) -> serde_json::Result<TxData> {
    serde_json::from_slice(line)
}

/// Source over a standard archive
#[derive(Debug)]
pub struct StandardSource<R = BufReader<File>> {
    lines: LineReader<R>,
}

impl StandardSource {
    /// Open a standard archive file
    pub async fn open(path: &Path, follow: bool) -> Result<Self> {
        let file = File::open(path).await?;
        debug!(path = %path.display(), follow, "Opened standard archive");
        Ok(Self::from_reader(BufReader::new(file), follow))
    }
}

impl<R> StandardSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Read a standard archive from any buffered reader
    pub fn from_reader(reader: R, follow: bool) -> Self {
        Self {
            lines: LineReader::new(reader, follow),
        }
    }
}

#[async_trait]
impl<R> Source for StandardSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Standard
    }

    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<TxRecord>> {
        let data = self.lines.next_record(cancel, decode_tx_data).await?;
        Ok(data.map(TxRecord::from))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!(lines = self.lines.lines_read(), "Closing standard archive");
        Ok(())
    }
}
