//! Chunk reader and batcher thread for parallel parsing
//!
//! Reads the source at most one chunk per read, cuts complete records at newlines,
//! carries the unterminated tail into the next chunk and fans each chunk out as
//! one or more sequence-numbered batches sharing the chunk's buffer.

use anyhow::{Context, Result};
use crossbeam_channel::{select, Sender};
use std::io::{self, Read};
use std::sync::Arc;

use super::cancel::Cancellation;
use super::pool::{BufferHandle, BufferPool};
use super::types::{Batch, LineSpan, ParseOptions};

/// What the reader saw before it stopped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReaderSummary {
    pub lines: u64,
    pub chunks: u64,
    pub batches: u64,
    pub bytes: u64,
}

enum SendOutcome {
    Sent,
    Stopped,
}

/// Configuration for the chunk reader
pub(crate) struct ChunkReader {
    pool: Arc<BufferPool>,
    chunk_size: usize,
    batch_size: usize,
    allow_crlf: bool,
    strict_columns: bool,
    expected_columns: Option<usize>,
    tail: Vec<u8>,
    next_seq: u64,
    summary: ReaderSummary,
}

impl ChunkReader {
    pub fn new(options: &ParseOptions, pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            chunk_size: options.chunk_size,
            batch_size: options.batch_size,
            allow_crlf: options.allow_crlf,
            strict_columns: options.strict_columns,
            expected_columns: options.expected_columns,
            tail: Vec::with_capacity(1024),
            next_seq: 0,
            summary: ReaderSummary::default(),
        }
    }

    /// Reader thread body. Errors are recorded on `cancel` by the caller.
    pub fn run<R: Read>(
        mut self,
        mut reader: R,
        batch_sender: Sender<Batch>,
        cancel: &Cancellation,
    ) -> Result<ReaderSummary> {
        loop {
            if cancel.is_cancelled() || cancel.check_deadline() {
                return Ok(self.summary);
            }

            let tail_len = self.tail.len();
            let mut buf = self.pool.acquire(tail_len + self.chunk_size);
            buf.extend_from_slice(&self.tail);
            buf.resize(tail_len + self.chunk_size, 0);

            // A single read per pass: a slow source must not hold off the
            // cancellation check until a whole chunk has arrived.
            let n = match read_some(&mut reader, &mut buf[tail_len..]) {
                Ok(n) => n,
                Err(e) => {
                    self.pool.release(buf);
                    return Err(e).with_context(|| {
                        format!("read chunk after line {}", self.summary.lines)
                    });
                }
            };
            buf.truncate(tail_len + n);
            if n == 0 {
                self.pool.release(buf);
                break;
            }
            self.summary.bytes += n as u64;

            let lines = self.split_lines(&buf);
            if lines.is_empty() {
                // No newline yet (short read or a record longer than the chunk).
                self.pool.release(buf);
                continue;
            }
            self.summary.chunks += 1;

            let buffer = BufferHandle::new(buf, Arc::clone(&self.pool));
            if let SendOutcome::Stopped = self.send_batches(buffer, lines, &batch_sender, cancel)
            {
                return Ok(self.summary);
            }
        }

        if !self.tail.is_empty() {
            let mut buf = self.pool.acquire(self.tail.len());
            buf.append(&mut self.tail);
            let mut end = buf.len();
            if self.allow_crlf && buf.last() == Some(&b'\r') {
                end -= 1;
            }
            self.summary.lines += 1;
            let line = LineSpan {
                line: self.summary.lines,
                range: 0..end,
            };
            if line.line == 1 {
                self.observe_first_line(&buf[line.range.clone()]);
            }

            let buffer = BufferHandle::new(buf, Arc::clone(&self.pool));
            self.send_batches(buffer, vec![line], &batch_sender, cancel);
        }

        tracing::debug!(
            lines = self.summary.lines,
            chunks = self.summary.chunks,
            batches = self.summary.batches,
            bytes = self.summary.bytes,
            "reader reached end of input"
        );
        Ok(self.summary)
    }

    /// Cut `data` at newlines; whatever follows the last newline becomes the tail.
    fn split_lines(&mut self, data: &[u8]) -> Vec<LineSpan> {
        let mut lines = Vec::with_capacity(self.batch_size.min(data.len() / 16 + 1));
        let mut start = 0;

        for nl in memchr::memchr_iter(b'\n', data) {
            let mut end = nl;
            if self.allow_crlf && end > start && data[end - 1] == b'\r' {
                end -= 1;
            }
            self.summary.lines += 1;
            if self.summary.lines == 1 {
                self.observe_first_line(&data[start..end]);
            }
            lines.push(LineSpan {
                line: self.summary.lines,
                range: start..end,
            });
            start = nl + 1;
        }

        self.tail.clear();
        self.tail.extend_from_slice(&data[start..]);
        lines
    }

    /// Fix the inferred column count from the first record of the stream.
    fn observe_first_line(&mut self, line: &[u8]) {
        if self.strict_columns && self.expected_columns.is_none() {
            let columns = memchr::memchr_iter(b'\t', line).count() + 1;
            tracing::debug!(columns, "inferred column count from first record");
            self.expected_columns = Some(columns);
        }
    }

    fn send_batches(
        &mut self,
        buffer: BufferHandle,
        lines: Vec<LineSpan>,
        batch_sender: &Sender<Batch>,
        cancel: &Cancellation,
    ) -> SendOutcome {
        let deadline = cancel.deadline_rx();
        let mut lines = lines.into_iter().peekable();

        while lines.peek().is_some() {
            let batch = Batch {
                seq: self.next_seq,
                buffer: buffer.clone(),
                lines: lines.by_ref().take(self.batch_size).collect(),
                expected_columns: self.expected_columns,
            };
            self.next_seq += 1;
            self.summary.batches += 1;

            select! {
                send(batch_sender, batch) -> res => {
                    if res.is_err() {
                        return SendOutcome::Stopped;
                    }
                }
                recv(cancel.signal()) -> _ => return SendOutcome::Stopped,
                recv(deadline) -> _ => {
                    cancel.check_deadline();
                    return SendOutcome::Stopped;
                }
            }
        }
        SendOutcome::Sent
    }
}

/// One `read`, retried only when interrupted.
fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
