//! Append-only destinations for exported records

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

/// Append-only byte destination
#[async_trait]
pub trait Sink: Send {
    /// Append the whole buffer
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the underlying storage
    async fn flush(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<W> Sink for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self, buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(self).await
    }
}

/// Archive file opened on first use.
///
/// Opening is deferred so that an export validates its configuration before
/// anything touches storage. Without overwrite the file is created
/// exclusively, so a file that appeared after validation is never clobbered.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    overwrite: bool,
    writer: Option<BufWriter<File>>,
}

impl OutputFile {
    /// Create a handle for the given path
    pub fn new(path: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            path: path.into(),
            overwrite,
            writer: None,
        }
    }

    /// Path of the archive file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let mut options = OpenOptions::new();
                options.write(true);

                if self.overwrite {
                    options.create(true).truncate(true);
                } else {
                    options.create_new(true);
                }

                let file = options.open(&self.path).await?;
                debug!(path = %self.path.display(), "Opened output file");
                BufWriter::new(file)
            }
        };

        Ok(self.writer.insert(writer))
    }
}

#[async_trait]
impl Sink for OutputFile {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self.writer().await?, buf).await
    }

    /// Flushing an unopened file creates it, so a finished export always
    /// leaves an archive behind even when every block was empty
    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(self.writer().await?).await
    }
}
