//! Bounded-memory line readers.
//!
//! - [`head`] reads forward and copies the first `n` lines
//! - [`tail`] reads backward from EOF in fixed-size blocks
//! - [`copy_all`] streams a whole file in chunks
//!
//! Lines always keep their `\n` terminator. A final line without one is
//! returned as-is.

use std::io::SeekFrom;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite,
    AsyncWriteExt, BufReader,
};
use tokio_util::sync::CancellationToken;

use super::error::{FileError, Result};

/// Buffer size for forward reads (8KB).
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Block size for backward reads.
pub const TAIL_BLOCK_SIZE: usize = 4096;

/// The first lines of a reader, not yet read.
pub struct HeadLines<R> {
    reader: BufReader<R>,
    remaining: usize,
}

/// Start reading the first `lines` lines of `reader`.
pub fn head<R: AsyncRead + Unpin>(reader: R, lines: usize) -> Result<HeadLines<R>> {
    if lines == 0 {
        return Err(FileError::InvalidLineCount(0));
    }
    Ok(HeadLines {
        reader: BufReader::with_capacity(READ_BUFFER_SIZE, reader),
        remaining: lines,
    })
}

impl<R: AsyncRead + Unpin> HeadLines<R> {
    /// Stream the remaining lines to `writer` without holding a full line
    /// in memory. Returns the number of bytes written.
    pub async fn copy_to<W: AsyncWrite + Unpin>(
        mut self,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut written = 0u64;
        while self.remaining > 0 {
            if cancel.is_cancelled() {
                return Err(FileError::Cancelled);
            }
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                break;
            }
            let take = match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.remaining -= 1;
                    i + 1
                }
                None => buf.len(),
            };
            writer.write_all(&buf[..take]).await?;
            self.reader.consume(take);
            written += take as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}

/// The last lines of a file and the EOF offset they were read up to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLines {
    /// Lines in file order.
    pub lines: Vec<Vec<u8>>,
    /// File size observed when the read started.
    pub end_offset: u64,
}

impl TailLines {
    /// Total number of bytes across all lines.
    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(Vec::len).sum()
    }

    /// Concatenate all lines.
    pub fn concat(&self) -> Vec<u8> {
        self.lines.concat()
    }
}

/// Read the last `lines` lines of `reader`.
///
/// The reader is left positioned at the reported end offset.
pub async fn tail<R>(reader: &mut R, lines: usize, cancel: &CancellationToken) -> Result<TailLines>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    tail_with_block_size(reader, lines, TAIL_BLOCK_SIZE, cancel).await
}

/// [`tail`] with an explicit block size.
pub async fn tail_with_block_size<R>(
    reader: &mut R,
    lines: usize,
    block_size: usize,
    cancel: &CancellationToken,
) -> Result<TailLines>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    if lines == 0 {
        return Err(FileError::InvalidLineCount(0));
    }
    let block_size = block_size.max(1);

    let size = reader.seek(SeekFrom::End(0)).await?;
    let mut found: Vec<Vec<u8>> = Vec::new();
    // Unresolved bytes after the last split point, one non-empty chunk per
    // block, latest block first. Joined only when a line is emitted.
    let mut pending: Vec<Vec<u8>> = Vec::new();
    let mut pos = size;

    while pos > 0 && found.len() < lines {
        if cancel.is_cancelled() {
            return Err(FileError::Cancelled);
        }

        let read_size = block_size.min(pos as usize);
        pos -= read_size as u64;
        reader.seek(SeekFrom::Start(pos)).await?;

        let mut data = vec![0u8; read_size];
        reader.read_exact(&mut data).await?;

        let mut end = read_size;
        for i in (0..read_size).rev() {
            // A newline that is the last unresolved byte terminates the
            // line still being collected.
            if data[i] == b'\n' && (i + 1 < end || !pending.is_empty()) {
                found.push(join_pending(&data[i + 1..end], &mut pending));
                end = i + 1;
                if found.len() == lines {
                    break;
                }
            }
        }
        if end > 0 {
            data.truncate(end);
            pending.push(data);
        }
    }

    if found.len() < lines && !pending.is_empty() {
        found.push(join_pending(&[], &mut pending));
    }
    found.reverse();

    reader.seek(SeekFrom::Start(size)).await?;
    Ok(TailLines {
        lines: found,
        end_offset: size,
    })
}

/// `head` followed by the pending chunks in file order.
fn join_pending(head: &[u8], pending: &mut Vec<Vec<u8>>) -> Vec<u8> {
    let len = head.len() + pending.iter().map(Vec::len).sum::<usize>();
    let mut line = Vec::with_capacity(len);
    line.extend_from_slice(head);
    for chunk in pending.drain(..).rev() {
        line.extend_from_slice(&chunk);
    }
    line
}

/// Copy everything from `reader` to `writer` in bounded chunks.
pub async fn copy_all<R, W>(reader: &mut R, writer: &mut W, cancel: &CancellationToken) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(FileError::Cancelled);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    writer.flush().await?;
    Ok(written)
}
