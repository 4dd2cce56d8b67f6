//! Live continuation of a tail.

use std::io::SeekFrom;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::error::Result;

/// How long to wait at EOF before polling again.
pub const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read size for appended data.
pub const FOLLOW_CHUNK_SIZE: usize = 4096;

/// Pushes bytes appended to a file to a consumer until cancelled.
pub struct FollowStream<R> {
    reader: R,
    offset: u64,
}

impl<R: AsyncRead + AsyncSeek + Unpin> FollowStream<R> {
    /// Follow `reader`, which must already be positioned at `offset`.
    pub fn new(reader: R, offset: u64) -> Self {
        Self { reader, offset }
    }

    /// Offset of the next byte to be read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Copy appended bytes to `writer`, flushing after every read.
    ///
    /// Returns the number of bytes delivered once `cancel` fires. If the file
    /// shrinks below the current offset it is read again from the start.
    pub async fn run<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut buf = vec![0u8; FOLLOW_CHUNK_SIZE];
        let mut delivered = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Ok(delivered);
            }

            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(delivered),
                read = self.reader.read(&mut buf) => read?,
            };

            if n > 0 {
                writer.write_all(&buf[..n]).await?;
                writer.flush().await?;
                self.offset += n as u64;
                delivered += n as u64;
                continue;
            }

            let len = self.reader.seek(SeekFrom::End(0)).await?;
            if len < self.offset {
                debug!(
                    offset = self.offset,
                    len, "file shrank while following, rewinding"
                );
                self.offset = 0;
            }
            self.reader.seek(SeekFrom::Start(self.offset)).await?;
            if len > self.offset {
                continue;
            }

            trace!(offset = self.offset, "at EOF, waiting for more data");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(delivered),
                _ = tokio::time::sleep(FOLLOW_POLL_INTERVAL) => {}
            }
        }
    }
}
