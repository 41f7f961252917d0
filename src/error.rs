//! Typed failures surfaced through `anyhow::Error`.
//!
//! Public entry points return `anyhow::Result`; the variants below are the ones a
//! caller may want to match on with `downcast_ref`.

use std::time::Duration;
use thiserror::Error;

/// Terminal conditions raised by the streaming parser itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A row did not have the expected number of tab-separated fields.
    #[error("line {line}: expected {expected} columns, got {found}")]
    ColumnMismatch {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// The overall timeout elapsed before the stream was fully delivered.
    #[error("parse deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The consumer of a row stream went away before the input was exhausted.
    #[error("row stream receiver closed")]
    StreamClosed,
}

impl ParseError {
    /// Line number associated with the failure, when there is one.
    pub fn line(&self) -> Option<u64> {
        match self {
            ParseError::ColumnMismatch { line, .. } => Some(*line),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    #[error("taxid map {0} contains no usable entries")]
    EmptyTaxidMap(String),
}
