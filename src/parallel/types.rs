//! Type definitions for parallel parsing
//!
//! Contains configuration, the batch and result messages exchanged between
//! stages, and the row views handed to callers.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::pool::BufferHandle;
use crate::error::ParseError;

pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;
pub const DEFAULT_CHUNK_SIZE: usize = 8 << 20;
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Configuration for the parallel TSV parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Capacity of the buffered reader wrapping the source.
    pub buffer_size: usize,
    /// Bytes read per chunk, not counting the carried tail.
    pub chunk_size: usize,
    /// Records handed to a worker at once.
    pub batch_size: usize,
    pub workers: usize,
    pub strict_columns: bool,
    /// Expected field count in strict mode; `None` infers it from the first record.
    pub expected_columns: Option<usize>,
    pub preserve_order: bool,
    /// Strip one `\r` before each `\n`.
    pub allow_crlf: bool,
    /// Do not count the first delivered row towards progress (header rows).
    pub skip_progress_first_row: bool,
    pub timeout: Option<Duration>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: num_cpus::get(),
            strict_columns: false,
            expected_columns: None,
            preserve_order: true,
            allow_crlf: true,
            skip_progress_first_row: false,
            timeout: None,
        }
    }
}

impl ParseOptions {
    pub fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }

    pub fn with_allow_crlf(mut self, allow: bool) -> Self {
        self.allow_crlf = allow;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Enable strict column checking, optionally with a declared column count.
    pub fn with_strict_columns(mut self, expected: Option<usize>) -> Self {
        self.strict_columns = true;
        self.expected_columns = expected.filter(|&n| n > 0);
        self
    }

    pub fn with_skip_progress_first_row(mut self, skip: bool) -> Self {
        self.skip_progress_first_row = skip;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace zero sizes with defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.workers == 0 {
            self.workers = num_cpus::get();
        }
        if self.expected_columns == Some(0) {
            self.expected_columns = None;
        }
        if self.timeout == Some(Duration::ZERO) {
            self.timeout = None;
        }
        self
    }

    /// Capacity of the bounded channels between stages.
    pub(crate) fn channel_capacity(&self) -> usize {
        (self.workers * 2).max(2)
    }
}

/// Receives one tick per delivered row.
pub trait ProgressSink: Send + Sync {
    fn increment(&self, rows: u64);

    fn finish(&self) {}
}

impl ProgressSink for indicatif::ProgressBar {
    fn increment(&self, rows: u64) {
        self.inc(rows);
    }

    fn finish(&self) {
        indicatif::ProgressBar::finish(self);
    }
}

impl ProgressSink for AtomicU64 {
    fn increment(&self, rows: u64) {
        self.fetch_add(rows, Ordering::Relaxed);
    }
}

/// One record inside a chunk buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineSpan {
    pub line: u64,
    pub range: Range<usize>,
}

/// A batch of records to be split by one worker
#[derive(Debug)]
pub(crate) struct Batch {
    pub seq: u64,
    pub buffer: BufferHandle,
    pub lines: Vec<LineSpan>,
    pub expected_columns: Option<usize>,
}

/// Field layout of one parsed row; `fields` indexes `ParseResult::fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowSpan {
    pub line: u64,
    pub fields: Range<usize>,
}

/// Result of splitting one batch
#[derive(Debug)]
pub(crate) struct ParseResult {
    pub seq: u64,
    pub rows: Vec<RowSpan>,
    pub fields: Vec<Range<usize>>,
    /// Raised after `rows`, which only holds the rows preceding the failure.
    pub error: Option<ParseError>,
    pub buffer: BufferHandle,
}

/// A parsed line. Field slices borrow the chunk buffer and are only valid for the
/// duration of the row callback; use [`Row::to_owned_row`] to keep them.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    pub line: u64,
    pub fields: &'a [&'a [u8]],
}

impl<'a> Row<'a> {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&'a [u8]> {
        self.fields.get(idx).copied()
    }

    /// Field as UTF-8; `None` when missing or not valid UTF-8.
    pub fn field_str(&self, idx: usize) -> Option<&'a str> {
        self.field(idx).and_then(|f| std::str::from_utf8(f).ok())
    }

    pub fn to_owned_row(&self) -> OwnedRow {
        OwnedRow {
            line: self.line,
            fields: self.fields.iter().map(|f| f.to_vec()).collect(),
        }
    }
}

/// A row that owns its bytes, as delivered by the channel interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRow {
    pub line: u64,
    pub fields: Vec<Vec<u8>>,
}

impl OwnedRow {
    pub fn field_str(&self, idx: usize) -> Option<&str> {
        self.fields
            .get(idx)
            .and_then(|f| std::str::from_utf8(f).ok())
    }

    /// Re-joins the fields with tabs, reproducing the original record.
    pub fn join(&self) -> Vec<u8> {
        self.fields.join(&b'\t')
    }
}
