//! Line cursor shared by the archive formats

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ArchiveError, Result};

/// Newline-delimited cursor over an archive.
///
/// Lines are kept as raw bytes until decoded. In follow mode an unterminated
/// trailing line stays buffered until its newline shows up, since a writer may
/// still be appending it, possibly in the middle of a multi-byte character.
#[derive(Debug)]
pub(crate) struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
    line: u64,
    follow: bool,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub(crate) fn new(reader: R, follow: bool) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            line: 0,
            follow,
        }
    }

    /// Number of lines consumed so far
    pub(crate) fn lines_read(&self) -> u64 {
        self.line
    }

    /// Read the next non-blank line along with its 1-based line number.
    ///
    /// Returns `None` at the current end of data.
    pub(crate) async fn next_line(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(ArchiveError::Read)?;

            if read == 0 {
                if self.pending.is_empty() || self.follow {
                    return Ok(None);
                }

                // Final line without a trailing newline
                self.line += 1;
                let line = std::mem::take(&mut self.pending);
                if is_blank(&line) {
                    return Ok(None);
                }
                return Ok(Some((self.line, line)));
            }

            if self.pending.last() != Some(&b'\n') {
                continue;
            }

            self.line += 1;
            let line = std::mem::take(&mut self.pending);
            if is_blank(&line) {
                continue;
            }

            return Ok(Some((self.line, line)));
        }
    }

    /// Read and decode the next record.
    ///
    /// Returns `None` at the end of data or once `cancel` has fired. A line
    /// `decode` rejects is an [`ArchiveError::Decode`] error.
    pub(crate) async fn next_record<T, F>(
        &mut self,
        cancel: &CancellationToken,
        decode: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&[u8]) -> serde_json::Result<T>,
    {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let Some((line, bytes)) = self.next_line().await? else {
            return Ok(None);
        };

        decode(&bytes)
            .map(Some)
            .map_err(|source| ArchiveError::Decode { line, source })
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_and_numbers() {
        let mut reader = LineReader::new(&b"a\n\nb\nc"[..], false);

        assert_eq!(reader.next_line().await.unwrap(), Some((1, b"a\n".to_vec())));
        assert_eq!(reader.next_line().await.unwrap(), Some((3, b"b\n".to_vec())));
        assert_eq!(reader.next_line().await.unwrap(), Some((4, b"c".to_vec())));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.lines_read(), 4);
    }

    #[tokio::test]
    async fn test_follow_holds_partial_line() {
        let mut reader = LineReader::new(&b"a\npartial"[..], true);

        assert_eq!(reader.next_line().await.unwrap(), Some((1, b"a\n".to_vec())));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.lines_read(), 1);
    }

    #[tokio::test]
    async fn test_follow_split_inside_multibyte_char() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let reopened = tokio::fs::File::open(file.path()).await.unwrap();
        let mut reader = LineReader::new(tokio::io::BufReader::new(reopened), true);

        // "é" is 0xC3 0xA9, the first write stops between the two bytes
        file.write_all(b"{\"memo\":\"caf\xC3").unwrap();
        file.flush().unwrap();
        assert_eq!(reader.next_line().await.unwrap(), None);

        file.write_all(b"\xA9\"}\n").unwrap();
        file.flush().unwrap();
        let (line, bytes) = reader.next_line().await.unwrap().unwrap();

        assert_eq!(line, 1);
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\"memo\":\"café\"}\n");
    }

    #[tokio::test]
    async fn test_undecodable_line_is_decode_error() {
        let cancel = CancellationToken::new();
        let mut reader = LineReader::new(&b"{}\n{\"memo\":\"\xFF\"}\n"[..], false);

        let first: Option<serde_json::Value> = reader
            .next_record(&cancel, |bytes| serde_json::from_slice(bytes))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = reader
            .next_record::<serde_json::Value, _>(&cancel, |bytes| serde_json::from_slice(bytes))
            .await;
        assert!(matches!(second, Err(ArchiveError::Decode { line: 2, .. })));
    }
}
