//! Compaction counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::planner::JobKind;

/// Counters updated by flushes and compactions
#[derive(Debug, Default)]
pub struct CompactionStats {
    flushes: AtomicU64,
    level_compactions: AtomicU64,
    full_compactions: AtomicU64,
    failures: AtomicU64,
    aborts: AtomicU64,
    points_written: AtomicU64,
    bytes_written: AtomicU64,
    duration_us: AtomicU64,
}

/// A copy of [`CompactionStats`] at one moment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStatsSnapshot {
    pub flushes: u64,
    pub level_compactions: u64,
    pub full_compactions: u64,
    pub failures: u64,
    pub aborts: u64,
    pub points_written: u64,
    pub bytes_written: u64,
    pub total_duration: Duration,
    pub corrupt_blocks: u64,
    pub quarantined_files: u64,
}

impl CompactionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&self, kind: JobKind, points: u64, bytes: u64, elapsed: Duration) {
        let counter = match kind {
            JobKind::Flush => &self.flushes,
            JobKind::Level(_) => &self.level_compactions,
            JobKind::Full => &self.full_compactions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.points_written.fetch_add(points, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.duration_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters; the corruption figures come from the file store
    pub fn snapshot(&self, corrupt_blocks: u64, quarantined_files: u64) -> CompactionStatsSnapshot {
        CompactionStatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            level_compactions: self.level_compactions.load(Ordering::Relaxed),
            full_compactions: self.full_compactions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            total_duration: Duration::from_micros(self.duration_us.load(Ordering::Relaxed)),
            corrupt_blocks,
            quarantined_files,
        }
    }
}
