use std::time::Duration;

use crate::parallel::PoolStats;

/// Statistics collected during one parse run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_read: u64,
    pub rows_delivered: u64,
    pub chunks: u64,
    pub batches: u64,
    pub bytes_read: u64,
    pub processing_time: Duration,
    pub pool: PoolStats,
}

impl ParseStats {
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.processing_time.as_secs_f64();
        if secs > 0.0 {
            self.rows_delivered as f64 / secs
        } else {
            0.0
        }
    }

    /// One-line summary suitable for a log line or stderr.
    pub fn format_summary(&self) -> String {
        format!(
            "rows={} lines={} chunks={} batches={} bytes={} buffers(new={} reused={}) time={:.3}s ({:.0} rows/s)",
            self.rows_delivered,
            self.lines_read,
            self.chunks,
            self.batches,
            self.bytes_read,
            self.pool.allocated,
            self.pool.reused,
            self.processing_time.as_secs_f64(),
            self.rows_per_second(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_second_handles_zero_time() {
        let stats = ParseStats {
            rows_delivered: 10,
            ..ParseStats::default()
        };
        assert_eq!(stats.rows_per_second(), 0.0);
    }

    #[test]
    fn test_format_summary() {
        let stats = ParseStats {
            lines_read: 4,
            rows_delivered: 4,
            chunks: 1,
            batches: 2,
            bytes_read: 32,
            processing_time: Duration::from_secs(2),
            pool: PoolStats::default(),
        };
        let summary = stats.format_summary();
        assert!(summary.starts_with("rows=4 lines=4 chunks=1 batches=2 bytes=32"));
        assert!(summary.contains("(2 rows/s)"));
    }
}
