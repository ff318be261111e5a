//! Pipeline run statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by the stages of a single sort run.
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    records_read: AtomicU64,
    bytes_read: AtomicU64,
    chunks_sorted: AtomicUsize,
    merges_completed: AtomicUsize,
}

impl PipelineStats {
    pub fn new() -> Self {
        PipelineStats {
            started: Instant::now(),
            records_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            chunks_sorted: AtomicUsize::new(0),
            merges_completed: AtomicUsize::new(0),
        }
    }

    /// Time passed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn add_chunk_read(&self, records: u64, bytes: u64) {
        self.records_read.fetch_add(records, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_chunk_sorted(&self) {
        self.chunks_sorted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_merge_completed(&self) {
        self.merges_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot of the counters.
    pub fn report(&self) -> SortReport {
        SortReport {
            elapsed: self.elapsed(),
            records_read: self.records_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            chunks_sorted: self.chunks_sorted.load(Ordering::Relaxed),
            merges_completed: self.merges_completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        PipelineStats::new()
    }
}

/// Sort run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortReport {
    /// Time passed since the run started.
    pub elapsed: Duration,
    /// Records read from the input by all the chunk sources.
    pub records_read: u64,
    /// Bytes consumed from the input, including dropped truncated records.
    pub bytes_read: u64,
    /// Chunks sorted in memory.
    pub chunks_sorted: usize,
    /// Merge tree nodes that emitted all their records.
    pub merges_completed: usize,
}
