//! Result sink for parallel parsing
//!
//! Runs on the caller's thread. Re-sequences worker results (ordered mode) or
//! passes them straight through (unordered mode), invokes the row callback, and
//! drains the result channel after a failure so every buffer is released.

use anyhow::Result;
use crossbeam_channel::{select, Receiver};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::cancel::Cancellation;
use super::types::{ParseResult, ProgressSink, Row};

/// Delivery state shared by both modes
pub(crate) struct RowSink<'p, F> {
    on_row: F,
    progress: Option<&'p Arc<dyn ProgressSink>>,
    skip_progress_first_row: bool,
    rows_delivered: u64,
}

impl<'p, F> RowSink<'p, F>
where
    F: FnMut(&Row<'_>) -> Result<()>,
{
    pub fn new(
        on_row: F,
        progress: Option<&'p Arc<dyn ProgressSink>>,
        skip_progress_first_row: bool,
    ) -> Self {
        Self {
            on_row,
            progress,
            skip_progress_first_row,
            rows_delivered: 0,
        }
    }

    pub fn rows_delivered(&self) -> u64 {
        self.rows_delivered
    }

    /// Drain `results` until every worker has exited.
    pub fn run(
        &mut self,
        results: Receiver<ParseResult>,
        preserve_order: bool,
        cancel: &Cancellation,
    ) {
        if preserve_order {
            self.ordered(results, cancel)
        } else {
            self.unordered(results, cancel)
        }
    }

    fn ordered(&mut self, results: Receiver<ParseResult>, cancel: &Cancellation) {
        let mut pending: BTreeMap<u64, ParseResult> = BTreeMap::new();
        let mut next_expected = 0u64;

        while let Some(result) = next_result(&results, cancel) {
            if cancel.is_cancelled() {
                // Released on drop.
                continue;
            }

            if result.seq != next_expected {
                pending.insert(result.seq, result);
                continue;
            }

            self.deliver(result, cancel);
            next_expected += 1;
            while let Some(next) = pending.remove(&next_expected) {
                if cancel.is_cancelled() {
                    break;
                }
                self.deliver(next, cancel);
                next_expected += 1;
            }
        }

        if cancel.is_cancelled() {
            if !pending.is_empty() {
                tracing::debug!(discarded = pending.len(), "discarding parked results");
            }
            return;
        }

        if !pending.is_empty() {
            tracing::warn!(
                next_expected,
                residual = pending.len(),
                "sequence gap never filled, flushing parked results"
            );
        }
        while let Some((_, result)) = pending.pop_first() {
            if cancel.is_cancelled() {
                break;
            }
            self.deliver(result, cancel);
        }
    }

    fn unordered(&mut self, results: Receiver<ParseResult>, cancel: &Cancellation) {
        while let Some(result) = next_result(&results, cancel) {
            if cancel.is_cancelled() {
                continue;
            }
            self.deliver(result, cancel);
        }
    }

    /// Invoke the callback for every row of `result`, then surface its error.
    fn deliver(&mut self, result: ParseResult, cancel: &Cancellation) {
        let ParseResult {
            rows,
            fields,
            error,
            buffer,
            ..
        } = result;

        let mut scratch: Vec<&[u8]> = Vec::new();
        for span in &rows {
            if cancel.is_cancelled() || cancel.check_deadline() {
                return;
            }

            scratch.clear();
            scratch.extend(fields[span.fields.clone()].iter().map(|r| &buffer[r.clone()]));
            let row = Row {
                line: span.line,
                fields: &scratch,
            };

            if let Some(progress) = self.progress {
                if !self.skip_progress_first_row || self.rows_delivered != 0 {
                    progress.increment(1);
                }
            }
            self.rows_delivered += 1;

            if let Err(e) = (self.on_row)(&row) {
                tracing::debug!(line = span.line, "row callback failed, cancelling pipeline");
                cancel.fail(e);
                return;
            }
        }

        if let Some(err) = error {
            tracing::debug!(%err, "row error reported by worker");
            cancel.fail(err.into());
        }
    }
}

/// Next result, or `None` once every worker has dropped its sender. A passing
/// deadline is recorded on `cancel` but draining continues.
fn next_result(results: &Receiver<ParseResult>, cancel: &Cancellation) -> Option<ParseResult> {
    let deadline = if cancel.is_cancelled() {
        crossbeam_channel::never()
    } else {
        cancel.deadline_rx()
    };

    select! {
        recv(results) -> msg => msg.ok(),
        recv(deadline) -> _ => {
            cancel.check_deadline();
            results.recv().ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::parallel::pool::{BufferHandle, BufferPool};
    use crate::parallel::types::RowSpan;
    use anyhow::anyhow;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// One single-field row per result, numbered by `seq`.
    fn result(pool: &Arc<BufferPool>, seq: u64) -> ParseResult {
        let text = format!("row{seq}").into_bytes();
        let len = text.len();
        ParseResult {
            seq,
            rows: vec![RowSpan {
                line: seq + 1,
                fields: 0..1,
            }],
            fields: vec![0..len],
            error: None,
            buffer: BufferHandle::new(text, Arc::clone(pool)),
        }
    }

    fn run_sink(
        seqs: &[u64],
        preserve_order: bool,
        fail_on_line: Option<u64>,
    ) -> (Vec<u64>, Cancellation, Arc<BufferPool>) {
        let pool = Arc::new(BufferPool::new(4, 64));
        let (tx, rx) = unbounded();
        for &seq in seqs {
            tx.send(result(&pool, seq)).unwrap();
        }
        drop(tx);

        let cancel = Cancellation::new(None);
        let mut seen = Vec::new();
        let mut sink = RowSink::new(
            |row: &Row<'_>| {
                if Some(row.line) == fail_on_line {
                    return Err(anyhow!("stop at {}", row.line));
                }
                seen.push(row.line);
                Ok(())
            },
            None,
            false,
        );
        sink.run(rx, preserve_order, &cancel);
        drop(sink);
        (seen, cancel, pool)
    }

    #[test]
    fn test_ordered_resequences_out_of_order_results() {
        let (seen, cancel, pool) = run_sink(&[2, 0, 3, 1, 4], true, None);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert!(cancel.take_error().is_none());
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_ordered_flushes_residual_gap_in_ascending_order() {
        let (seen, _, pool) = run_sink(&[0, 4, 2], true, None);
        assert_eq!(seen, vec![1, 3, 5]);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_unordered_delivers_in_arrival_order() {
        let (seen, _, _) = run_sink(&[2, 0, 1], false, None);
        assert_eq!(seen, vec![3, 1, 2]);
    }

    #[test]
    fn test_callback_error_stops_delivery_and_releases_everything() {
        let (seen, cancel, pool) = run_sink(&[1, 0, 2, 3], true, Some(2));
        assert_eq!(seen, vec![1]);
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.take_error().unwrap().to_string(), "stop at 2");
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_worker_error_delivered_after_preceding_rows() {
        let pool = Arc::new(BufferPool::new(4, 64));
        let (tx, rx) = unbounded();
        let mut failing = result(&pool, 1);
        failing.error = Some(ParseError::ColumnMismatch {
            line: 3,
            expected: 3,
            found: 2,
        });
        tx.send(failing).unwrap();
        tx.send(result(&pool, 0)).unwrap();
        tx.send(result(&pool, 2)).unwrap();
        drop(tx);

        let cancel = Cancellation::new(None);
        let mut seen = Vec::new();
        let mut sink = RowSink::new(
            |row: &Row<'_>| {
                seen.push(row.line);
                Ok(())
            },
            None,
            false,
        );
        sink.run(rx, true, &cancel);
        assert_eq!(sink.rows_delivered(), 2);
        drop(sink);

        assert_eq!(seen, vec![1, 2]);
        let err = cancel.take_error().unwrap();
        assert_eq!(err.downcast_ref::<ParseError>().unwrap().line(), Some(3));
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_progress_skips_first_row() {
        let pool = Arc::new(BufferPool::new(4, 64));
        let (tx, rx) = unbounded();
        for seq in 0..3 {
            tx.send(result(&pool, seq)).unwrap();
        }
        drop(tx);

        let counter = Arc::new(AtomicU64::new(0));
        let progress: Arc<dyn ProgressSink> = counter.clone();
        let cancel = Cancellation::new(None);
        let mut sink = RowSink::new(|_: &Row<'_>| Ok(()), Some(&progress), true);
        sink.run(rx, true, &cancel);

        assert_eq!(sink.rows_delivered(), 3);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}
