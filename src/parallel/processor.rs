//! Main parallel parser
//!
//! Contains the `TsvParser` that wires the reader, the worker pool and the
//! result sink together for one input stream.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver};
use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::error::ParseError;
use crate::stats::ParseStats;

use super::batching::{ChunkReader, ReaderSummary};
use super::cancel::Cancellation;
use super::pool::{BufferPool, PoolStats};
use super::sink::RowSink;
use super::types::{OwnedRow, ParseOptions, ProgressSink, Row};
use super::worker::worker_thread;

/// Keeps a live-thread counter accurate for the lifetime of a pipeline stage.
struct LiveThread<'a>(&'a AtomicUsize);

impl<'a> LiveThread<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveThread<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parallel, order-preserving TSV parser
///
/// The buffer pool lives as long as the parser, so repeated `parse` calls reuse
/// chunk buffers.
#[derive(Clone)]
pub struct TsvParser {
    options: ParseOptions,
    pool: Arc<BufferPool>,
    progress: Option<Arc<dyn ProgressSink>>,
    live_threads: Arc<AtomicUsize>,
}

impl TsvParser {
    pub fn new(options: ParseOptions) -> Self {
        let options = options.with_defaults();
        let slots = options.channel_capacity() + options.workers + 2;
        let pool = BufferPool::new(slots, options.chunk_size + options.buffer_size);
        Self {
            options,
            pool: Arc::new(pool),
            progress: None,
            live_threads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Reader and worker threads currently running for this parser.
    pub fn live_threads(&self) -> usize {
        self.live_threads.load(Ordering::SeqCst)
    }

    /// Parse `reader`, invoking `on_row` for every record on the calling thread.
    ///
    /// Row fields borrow internal buffers and are only valid inside `on_row`. The
    /// first error (read failure, column mismatch, deadline, or an `Err` returned
    /// by `on_row`) cancels the pipeline and is returned once every thread has
    /// exited. Rows delivered before the error are not retracted.
    pub fn parse<R, F>(&self, reader: R, on_row: F) -> Result<ParseStats>
    where
        R: Read + Send,
        F: FnMut(&Row<'_>) -> Result<()>,
    {
        let options = &self.options;
        let started = Instant::now();
        let cancel = Cancellation::new(options.timeout);
        let capacity = options.channel_capacity();
        let (batch_sender, batch_receiver) = bounded(capacity);
        let (result_sender, result_receiver) = bounded(capacity);

        tracing::debug!(
            workers = options.workers,
            chunk_size = options.chunk_size,
            batch_size = options.batch_size,
            preserve_order = options.preserve_order,
            strict_columns = options.strict_columns,
            "starting parse"
        );

        let mut sink = RowSink::new(
            on_row,
            self.progress.as_ref(),
            options.skip_progress_first_row,
        );

        let summary = thread::scope(|scope| {
            let cancel = &cancel;
            let live = &*self.live_threads;

            let reader_handle = {
                let chunk_reader = ChunkReader::new(options, Arc::clone(&self.pool));
                let buffer_size = options.buffer_size;
                scope.spawn(move || {
                    let _live = LiveThread::enter(live);
                    let reader = BufReader::with_capacity(buffer_size, reader);
                    chunk_reader
                        .run(reader, batch_sender, cancel)
                        .unwrap_or_else(|e| {
                            tracing::debug!(error = %e, "reader failed, cancelling pipeline");
                            cancel.fail(e);
                            ReaderSummary::default()
                        })
                })
            };

            let mut worker_handles = Vec::with_capacity(options.workers);
            for worker_id in 0..options.workers {
                let batch_receiver = batch_receiver.clone();
                let result_sender = result_sender.clone();
                worker_handles.push(scope.spawn(move || {
                    let _live = LiveThread::enter(live);
                    if let Err(e) = worker_thread(worker_id, batch_receiver, result_sender, cancel)
                    {
                        cancel.fail(e);
                    }
                }));
            }

            // Drop our ends so closing propagates once the stages finish
            drop(batch_receiver);
            drop(result_sender);

            sink.run(result_receiver, options.preserve_order, cancel);

            for (idx, handle) in worker_handles.into_iter().enumerate() {
                handle
                    .join()
                    .unwrap_or_else(|e| panic!("Worker thread {} panicked: {:?}", idx, e));
            }
            reader_handle
                .join()
                .unwrap_or_else(|e| panic!("Reader thread panicked: {:?}", e))
        });

        if let Some(progress) = &self.progress {
            progress.finish();
        }

        if let Some(err) = cancel.take_error() {
            return Err(err);
        }

        let stats = ParseStats {
            lines_read: summary.lines,
            rows_delivered: sink.rows_delivered(),
            chunks: summary.chunks,
            batches: summary.batches,
            bytes_read: summary.bytes,
            processing_time: started.elapsed(),
            pool: self.pool.stats(),
        };
        tracing::debug!(summary = %stats.format_summary(), "parse complete");
        Ok(stats)
    }

    /// Parse on a background thread, delivering owned copies of each row.
    ///
    /// Dropping the row receiver cancels the pipeline.
    pub fn stream<R>(&self, reader: R) -> RowStream
    where
        R: Read + Send + 'static,
    {
        let parser = self.clone();
        let (row_sender, row_receiver) = bounded(self.options.batch_size);
        let (error_sender, error_receiver) = bounded(1);

        let handle = thread::spawn(move || {
            let outcome = parser.parse(reader, |row| {
                row_sender
                    .send(row.to_owned_row())
                    .map_err(|_| ParseError::StreamClosed.into())
            });
            // Close the row channel before reporting the outcome.
            drop(row_sender);
            match outcome {
                Ok(stats) => Some(stats),
                Err(e) => {
                    let _ = error_sender.send(e);
                    None
                }
            }
        });

        RowStream {
            rows: row_receiver,
            errors: error_receiver,
            handle,
        }
    }
}

/// Rows of a background parse. Drain `rows` until it disconnects, then check
/// `errors` (or call [`RowStream::finish`]).
pub struct RowStream {
    pub rows: Receiver<OwnedRow>,
    pub errors: Receiver<anyhow::Error>,
    handle: JoinHandle<Option<ParseStats>>,
}

impl RowStream {
    /// Wait for the background parse and return its outcome. Undelivered rows are
    /// discarded, which cancels a parse still in progress.
    pub fn finish(self) -> Result<ParseStats> {
        let RowStream {
            rows,
            errors,
            handle,
        } = self;
        drop(rows);

        let stats = handle
            .join()
            .unwrap_or_else(|e| panic!("Row stream thread panicked: {:?}", e));
        match stats {
            Some(stats) => Ok(stats),
            None => Err(errors
                .try_recv()
                .unwrap_or_else(|_| anyhow!("row stream failed"))),
        }
    }
}

/// Parse `reader` with a one-off [`TsvParser`].
pub fn parse_tsv<R, F>(reader: R, options: ParseOptions, on_row: F) -> Result<ParseStats>
where
    R: Read + Send,
    F: FnMut(&Row<'_>) -> Result<()>,
{
    TsvParser::new(options).parse(reader, on_row)
}

/// Channel-based variant of [`parse_tsv`].
pub fn parse_tsv_channel<R>(reader: R, options: ParseOptions) -> RowStream
where
    R: Read + Send + 'static,
{
    TsvParser::new(options).stream(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn small_options(workers: usize) -> ParseOptions {
        ParseOptions::default()
            .with_workers(workers)
            .with_chunk_size(16)
            .with_batch_size(2)
            .with_buffer_size(64)
    }

    #[test]
    fn test_parse_collects_fields_in_order() {
        let input = b"a\tb\tc\n1\t2\t3\n4\t5\t6\n".to_vec();
        let mut rows = Vec::new();
        let stats = parse_tsv(Cursor::new(input), small_options(3), |row| {
            rows.push(row.to_owned_row());
            Ok(())
        })
        .unwrap();

        assert_eq!(stats.rows_delivered, 3);
        assert_eq!(stats.lines_read, 3);
        assert_eq!(rows[1].field_str(1), Some("2"));
        assert_eq!(
            rows.iter().map(|r| r.line).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_empty_input() {
        let mut called = false;
        let stats = parse_tsv(Cursor::new(Vec::new()), small_options(2), |_| {
            called = true;
            Ok(())
        })
        .unwrap();
        assert!(!called);
        assert_eq!(stats.rows_delivered, 0);
    }

    #[test]
    fn test_parser_reuses_buffers_across_runs() {
        let parser = TsvParser::new(small_options(2));
        let input: Vec<u8> = (0..50).flat_map(|i| format!("{i}\tx\n").into_bytes()).collect();

        parser.parse(Cursor::new(input.clone()), |_| Ok(())).unwrap();
        let first = parser.pool_stats();
        parser.parse(Cursor::new(input), |_| Ok(())).unwrap();
        let second = parser.pool_stats();

        assert_eq!(second.outstanding, 0);
        assert!(second.reused > first.reused);
        assert_eq!(parser.live_threads(), 0);
    }

    #[test]
    fn test_stream_delivers_owned_rows() {
        let input = b"x\t1\ny\t2\n".to_vec();
        let stream = parse_tsv_channel(Cursor::new(input), small_options(2));
        let rows: Vec<OwnedRow> = stream.rows.iter().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec![b"y".to_vec(), b"2".to_vec()]);

        let stats = stream.finish().unwrap();
        assert_eq!(stats.rows_delivered, 2);
    }

    #[test]
    fn test_stream_reports_strict_error() {
        let input = b"a\tb\nc\n".to_vec();
        let options = small_options(1).with_strict_columns(None);
        let stream = parse_tsv_channel(Cursor::new(input), options);
        let rows: Vec<OwnedRow> = stream.rows.iter().collect();
        assert_eq!(rows.len(), 1);

        let err = stream.errors.recv().unwrap();
        assert_eq!(err.downcast_ref::<ParseError>().unwrap().line(), Some(2));
    }
}
