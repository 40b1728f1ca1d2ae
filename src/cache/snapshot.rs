//! Cache snapshots
//!
//! A snapshot is the frozen part of the cache handed to a flush. It is never
//! mutated: eviction and deletes build a replacement and swap it in.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::point::{Point, TimeRange, ValueType};
use crate::series::{Predicate, SeriesKey};

use super::entry::points_size;

/// Sorted, deduplicated points of one series inside a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub value_type: ValueType,
    pub points: Arc<Vec<Point>>,
}

/// Frozen cache contents awaiting a flush
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: BTreeMap<SeriesKey, SnapshotEntry>,
    max_lsn: u64,
    size: usize,
    point_count: usize,
}

impl CacheSnapshot {
    pub(crate) fn new(entries: BTreeMap<SeriesKey, SnapshotEntry>, max_lsn: u64) -> Self {
        let size = entries.values().map(|e| points_size(&e.points)).sum();
        let point_count = entries.values().map(|e| e.points.len()).sum();
        Self {
            entries,
            max_lsn,
            size,
            point_count,
        }
    }

    /// Series keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&SeriesKey, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&SnapshotEntry> {
        self.entries.get(key)
    }

    /// Highest LSN whose data is in this snapshot
    pub fn max_lsn(&self) -> u64 {
        self.max_lsn
    }

    /// Charged bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn series_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Points of `key` within `range`
    pub fn values(&self, key: &SeriesKey, range: TimeRange) -> Vec<Point> {
        match self.entries.get(key) {
            Some(entry) => {
                let start = entry.points.partition_point(|p| p.timestamp < range.min);
                entry.points[start..]
                    .iter()
                    .take_while(|p| p.timestamp <= range.max)
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        }
    }

    /// A copy without the given series
    pub(crate) fn without(&self, keys: &[SeriesKey]) -> Self {
        let mut entries = self.entries.clone();
        for key in keys {
            entries.remove(key);
        }
        Self::new(entries, self.max_lsn)
    }

    /// A copy with matching points in `range` removed
    pub(crate) fn with_deleted(&self, predicate: &Predicate, range: TimeRange) -> Self {
        let mut entries = BTreeMap::new();
        for (key, entry) in &self.entries {
            if !predicate.matches(key) {
                entries.insert(key.clone(), entry.clone());
                continue;
            }
            let kept: Vec<Point> = entry
                .points
                .iter()
                .filter(|p| !range.contains(p.timestamp))
                .cloned()
                .collect();
            if !kept.is_empty() {
                entries.insert(
                    key.clone(),
                    SnapshotEntry {
                        value_type: entry.value_type,
                        points: Arc::new(kept),
                    },
                );
            }
        }
        Self::new(entries, self.max_lsn)
    }
}

/// Merge two ascending runs; `newer` wins on equal timestamps
pub(crate) fn merge_runs(older: &[Point], newer: &[Point]) -> Vec<Point> {
    let mut out = Vec::with_capacity(older.len() + newer.len());
    let (mut i, mut j) = (0, 0);
    while i < older.len() && j < newer.len() {
        let (a, b) = (&older[i], &newer[j]);
        if a.timestamp < b.timestamp {
            out.push(a.clone());
            i += 1;
        } else {
            if a.timestamp == b.timestamp {
                i += 1;
            }
            out.push(b.clone());
            j += 1;
        }
    }
    out.extend_from_slice(&older[i..]);
    out.extend_from_slice(&newer[j..]);
    out
}
