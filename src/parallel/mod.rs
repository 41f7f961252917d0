//! Parallel TSV parsing
//!
//! Splits an arbitrarily large byte stream across a pool of worker threads while
//! keeping memory bounded and, optionally, the original line order.
//!
//! # Module Structure
//!
//! - `types`: Options, batch/result messages and row views
//! - `pool`: Chunk buffer recycling and reference-counted buffer handles
//! - `cancel`: Shared first-error and cancellation state
//! - `batching`: Chunk reader and batcher thread
//! - `worker`: Worker thread for field splitting
//! - `sink`: Ordered/unordered result delivery on the caller's thread
//! - `processor`: Main `TsvParser` orchestration

mod batching;
mod cancel;
mod pool;
mod processor;
mod sink;
mod types;
mod worker;

// Re-export public types
pub use pool::{BufferHandle, BufferPool, PoolStats};
pub use processor::{parse_tsv, parse_tsv_channel, RowStream, TsvParser};
pub use types::{
    OwnedRow, ParseOptions, ProgressSink, Row, DEFAULT_BATCH_SIZE, DEFAULT_BUFFER_SIZE,
    DEFAULT_CHUNK_SIZE,
};
pub use worker::split_fields;
