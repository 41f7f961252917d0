//! Worker thread for parallel parsing
//!
//! Splits each record of a batch on tab bytes and checks the column count.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use std::ops::Range;

use super::cancel::Cancellation;
use super::types::{Batch, ParseResult, RowSpan};
use crate::error::ParseError;

/// Worker thread: splits batches until the batch channel closes
pub(crate) fn worker_thread(
    worker_id: usize,
    batch_receiver: Receiver<Batch>,
    result_sender: Sender<ParseResult>,
    cancel: &Cancellation,
) -> Result<()> {
    let mut processed = 0u64;

    while let Ok(batch) = batch_receiver.recv() {
        if cancel.is_cancelled() {
            // Dropping the batch releases its share of the chunk buffer.
            continue;
        }

        let result = parse_batch(batch);
        processed += 1;
        if result_sender.send(result).is_err() {
            break;
        }
    }

    tracing::trace!(worker_id, processed, "worker finished");
    Ok(())
}

/// Split every record of `batch` into field ranges.
pub(crate) fn parse_batch(batch: Batch) -> ParseResult {
    let Batch {
        seq,
        buffer,
        lines,
        expected_columns,
    } = batch;

    let per_row = expected_columns.unwrap_or(8);
    let mut rows = Vec::with_capacity(lines.len());
    let mut fields = Vec::with_capacity(lines.len() * per_row);
    let mut error = None;

    for span in &lines {
        let first = fields.len();
        split_fields_into(&buffer, span.range.clone(), &mut fields);
        let found = fields.len() - first;

        if let Some(expected) = expected_columns {
            if found != expected {
                fields.truncate(first);
                error = Some(ParseError::ColumnMismatch {
                    line: span.line,
                    expected,
                    found,
                });
                break;
            }
        }

        rows.push(RowSpan {
            line: span.line,
            fields: first..fields.len(),
        });
    }

    ParseResult {
        seq,
        rows,
        fields,
        error,
        buffer,
    }
}

/// Append the tab-separated field ranges of `data[line]` to `out`.
///
/// A record always has at least one (possibly empty) field.
pub(crate) fn split_fields_into(data: &[u8], line: Range<usize>, out: &mut Vec<Range<usize>>) {
    let mut start = line.start;
    for tab in memchr::memchr_iter(b'\t', &data[line.clone()]) {
        let at = line.start + tab;
        out.push(start..at);
        start = at + 1;
    }
    out.push(start..line.end);
}

/// Split a standalone record into field slices.
pub fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    let mut ranges = Vec::new();
    split_fields_into(line, 0..line.len(), &mut ranges);
    ranges.into_iter().map(|r| &line[r]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::pool::{BufferHandle, BufferPool};
    use crate::parallel::types::LineSpan;
    use crossbeam_channel::unbounded;
    use std::sync::Arc;

    fn batch_of(text: &[u8], expected_columns: Option<usize>) -> (Batch, Arc<BufferPool>) {
        let pool = Arc::new(BufferPool::new(2, 1024));
        let mut lines = Vec::new();
        let mut start = 0;
        for (idx, nl) in memchr::memchr_iter(b'\n', text).enumerate() {
            lines.push(LineSpan {
                line: idx as u64 + 1,
                range: start..nl,
            });
            start = nl + 1;
        }
        let batch = Batch {
            seq: 4,
            buffer: BufferHandle::new(text.to_vec(), Arc::clone(&pool)),
            lines,
            expected_columns,
        };
        (batch, pool)
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields(b"a\tb\tc"), vec![&b"a"[..], b"b", b"c"]);
        assert_eq!(split_fields(b""), vec![&b""[..]]);
        assert_eq!(split_fields(b"\t"), vec![&b""[..], b""]);
        assert_eq!(split_fields(b"x\t\ty\t"), vec![&b"x"[..], b"", b"y", b""]);
    }

    #[test]
    fn test_parse_batch_ranges_point_into_buffer() {
        let (batch, _pool) = batch_of(b"a\tb\nc\td\te\n", None);
        let result = parse_batch(batch);

        assert_eq!(result.seq, 4);
        assert!(result.error.is_none());
        assert_eq!(result.rows.len(), 2);
        let second: Vec<&[u8]> = result.fields[result.rows[1].fields.clone()]
            .iter()
            .map(|r| &result.buffer[r.clone()])
            .collect();
        assert_eq!(second, vec![&b"c"[..], b"d", b"e"]);
    }

    #[test]
    fn test_column_mismatch_truncates_rows() {
        let (batch, _pool) = batch_of(b"1\t2\t3\n4\t5\n6\t7\t8\n", Some(3));
        let result = parse_batch(batch);

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.fields.len(), 3);
        assert_eq!(
            result.error,
            Some(ParseError::ColumnMismatch {
                line: 2,
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_worker_drops_batches_after_cancel() {
        let (batch, pool) = batch_of(b"a\n", None);
        let (batch_tx, batch_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        batch_tx.send(batch).unwrap();
        drop(batch_tx);

        let cancel = Cancellation::new(None);
        cancel.cancel();
        worker_thread(0, batch_rx, result_tx, &cancel).unwrap();

        assert!(result_rx.try_recv().is_err());
        assert_eq!(pool.stats().outstanding, 0);
    }
}
