//! Cache Module
//!
//! In-memory buffer of recently written points that are not yet in a TSM
//! file.
//!
//! ## Responsibilities
//! - Last-write-wins merge of incoming points per series
//! - Shard series by key hash so writers to different series rarely contend
//! - Freeze the live contents into a snapshot for flushing
//! - Track memory and apply backpressure when it runs over the limit
//!
//! ## Structure
//! ```text
//!            insert(key, points, lsn)
//!                      │ murmur3(key) & mask
//!      ┌───────────┬───┴───────┬───────────┐
//!      ▼           ▼           ▼           ▼
//!  ┌────────┐  ┌────────┐  ┌────────┐  ┌────────┐
//!  │shard 0 │  │shard 1 │  │  ...   │  │shard N │   live
//!  └────────┘  └────────┘  └────────┘  └────────┘
//!      │ snapshot(): take every shard's map
//!      ▼
//!  ┌──────────────────────────────────────────┐
//!  │ CacheSnapshot (sorted, deduplicated)     │   being flushed
//!  └──────────────────────────────────────────┘
//! ```
//! Reads merge snapshot and live data; live wins on equal timestamps.

mod entry;
mod snapshot;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use crate::error::{AtlasError, Result};
use crate::point::{batch_type, Point, TimeRange, ValueType};
use crate::series::{Predicate, SeriesKey};

pub use entry::{CacheEntry, POINT_OVERHEAD};
pub use snapshot::{CacheSnapshot, SnapshotEntry};

use snapshot::merge_runs;

/// One lock domain of the cache
#[derive(Default)]
struct Shard {
    entries: RwLock<HashMap<SeriesKey, CacheEntry>>,
}

/// Point-in-time cache figures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub live_bytes: usize,
    pub snapshot_bytes: usize,
    pub live_points: usize,
    pub snapshot_points: usize,
    pub series: usize,
}

/// Sharded write cache
pub struct Cache {
    shards: Vec<Shard>,
    mask: usize,
    snapshot: RwLock<Option<Arc<CacheSnapshot>>>,
    live_bytes: AtomicUsize,
    live_points: AtomicUsize,
    snapshot_bytes: AtomicUsize,
    max_memory: usize,
    space_lock: Mutex<()>,
    space_freed: Condvar,
}

impl Cache {
    /// `shards` must be a power of two
    pub fn new(shards: usize, max_memory: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        Self {
            shards: (0..shards).map(|_| Shard::default()).collect(),
            mask: shards - 1,
            snapshot: RwLock::new(None),
            live_bytes: AtomicUsize::new(0),
            live_points: AtomicUsize::new(0),
            snapshot_bytes: AtomicUsize::new(0),
            max_memory,
            space_lock: Mutex::new(()),
            space_freed: Condvar::new(),
        }
    }

    /// Index of the shard owning `key`
    pub fn shard_index(&self, key: &SeriesKey) -> usize {
        murmur3::murmur3_32(&mut Cursor::new(key.as_bytes()), 0)
            .map(|h| h as usize & self.mask)
            .unwrap_or(0)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Merge `points` written at `lsn` into the live entry of `key`
    pub fn insert(&self, key: &SeriesKey, points: &[Point], lsn: u64) -> Result<()> {
        let ty = batch_type(points)?;
        let shard = &self.shards[self.shard_index(key)];
        let mut entries = shard.entries.write();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(ty));
        let before = entry.len();
        let delta = entry.insert(points, lsn)?;
        let added = entry.len() - before;
        drop(entries);

        self.adjust_live(delta);
        self.live_points.fetch_add(added, Ordering::Relaxed);
        Ok(())
    }

    /// Remove matching points in `range` from live and snapshot data
    ///
    /// Returns the number of points removed.
    pub fn delete_range(&self, predicate: &Predicate, range: TimeRange) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut entries = shard.entries.write();
            let mut freed = 0;
            entries.retain(|key, entry| {
                if predicate.matches(key) {
                    let before = entry.len();
                    freed += entry.delete_range(range);
                    removed += before - entry.len();
                }
                !entry.is_empty()
            });
            drop(entries);
            self.live_bytes.fetch_sub(freed, Ordering::Relaxed);
        }
        self.live_points.fetch_sub(removed, Ordering::Relaxed);

        let mut snapshot = self.snapshot.write();
        if let Some(current) = snapshot.as_ref() {
            let next = current.with_deleted(predicate, range);
            removed += current.point_count() - next.point_count();
            self.replace_snapshot(&mut snapshot, next);
        }
        drop(snapshot);

        self.notify_space();
        removed
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Move all live data into the flush snapshot
    ///
    /// `through_lsn` is the highest LSN whose data can be in the cache; the
    /// caller must hold off writers while this runs. Data left by a failed
    /// flush is merged in, newer live data winning. Returns None when there is
    /// nothing to flush.
    pub fn snapshot(&self, through_lsn: u64) -> Option<Arc<CacheSnapshot>> {
        let mut snapshot = self.snapshot.write();

        let mut moved: BTreeMap<SeriesKey, CacheEntry> = BTreeMap::new();
        let mut moved_bytes = 0;
        let mut moved_points = 0;
        for shard in &self.shards {
            let taken = std::mem::take(&mut *shard.entries.write());
            for (key, entry) in taken {
                moved_bytes += entry.size();
                moved_points += entry.len();
                moved.insert(key, entry);
            }
        }
        self.live_bytes.fetch_sub(moved_bytes, Ordering::Relaxed);
        self.live_points.fetch_sub(moved_points, Ordering::Relaxed);

        if moved.is_empty() {
            return snapshot.clone();
        }

        let previous = snapshot.take();
        let mut entries: BTreeMap<SeriesKey, SnapshotEntry> = previous
            .as_ref()
            .map(|p| p.entries().map(|(k, e)| (k.clone(), e.clone())).collect())
            .unwrap_or_default();
        for (key, entry) in moved {
            let value_type = entry.value_type();
            let fresh = entry.into_points();
            let points = match entries.get(&key) {
                Some(old) => merge_runs(&old.points, &fresh),
                None => fresh,
            };
            entries.insert(
                key,
                SnapshotEntry {
                    value_type,
                    points: Arc::new(points),
                },
            );
        }
        let max_lsn = previous.map(|p| p.max_lsn()).unwrap_or(0).max(through_lsn);
        let next = CacheSnapshot::new(entries, max_lsn);
        debug!(
            series = next.series_count(),
            points = next.point_count(),
            bytes = next.size(),
            max_lsn,
            "cache snapshot taken"
        );
        self.replace_snapshot(&mut snapshot, next);
        snapshot.clone()
    }

    /// The snapshot currently awaiting a flush
    pub fn current_snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Drop flushed series from the snapshot and free their memory
    pub fn evict(&self, keys: &[SeriesKey]) {
        let mut snapshot = self.snapshot.write();
        if let Some(current) = snapshot.as_ref() {
            let next = current.without(keys);
            self.replace_snapshot(&mut snapshot, next);
        }
        drop(snapshot);
        self.notify_space();
    }

    /// Drop the whole snapshot
    pub fn clear_snapshot(&self) {
        let mut snapshot = self.snapshot.write();
        *snapshot = None;
        self.snapshot_bytes.store(0, Ordering::Relaxed);
        drop(snapshot);
        self.notify_space();
    }

    fn replace_snapshot(&self, slot: &mut Option<Arc<CacheSnapshot>>, next: CacheSnapshot) {
        self.snapshot_bytes.store(next.size(), Ordering::Relaxed);
        *slot = if next.is_empty() { None } else { Some(Arc::new(next)) };
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of the points of `key` within `range`, ascending, deduplicated
    pub fn values(&self, key: &SeriesKey, range: TimeRange) -> Vec<Point> {
        // Live before snapshot: a concurrent snapshot() can only move data
        // into the part read second.
        let live = {
            let shard = &self.shards[self.shard_index(key)];
            let entries = shard.entries.read();
            entries.get(key).map(|e| e.values(range)).unwrap_or_default()
        };
        let frozen = self
            .snapshot
            .read()
            .as_ref()
            .map(|s| s.values(key, range))
            .unwrap_or_default();

        match (frozen.is_empty(), live.is_empty()) {
            (true, _) => live,
            (false, true) => frozen,
            (false, false) => merge_runs(&frozen, &live),
        }
    }

    /// Cached keys matching `predicate`
    pub fn keys(&self, predicate: &Predicate) -> BTreeSet<SeriesKey> {
        let mut keys = BTreeSet::new();
        for shard in &self.shards {
            keys.extend(
                shard
                    .entries
                    .read()
                    .keys()
                    .filter(|k| predicate.matches(k))
                    .cloned(),
            );
        }
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            keys.extend(snapshot.keys().filter(|k| predicate.matches(k)).cloned());
        }
        keys
    }

    /// Value type of every cached series
    pub fn value_types(&self) -> Vec<(SeriesKey, ValueType)> {
        let mut types = Vec::new();
        for shard in &self.shards {
            types.extend(
                shard
                    .entries
                    .read()
                    .iter()
                    .map(|(k, e)| (k.clone(), e.value_type())),
            );
        }
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            types.extend(snapshot.entries().map(|(k, e)| (k.clone(), e.value_type)));
        }
        types
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Bytes held by live and snapshot data
    pub fn memory(&self) -> usize {
        self.live_bytes() + self.snapshot_bytes()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub fn snapshot_bytes(&self) -> usize {
        self.snapshot_bytes.load(Ordering::Relaxed)
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    pub fn is_empty(&self) -> bool {
        self.live_points.load(Ordering::Relaxed) == 0 && self.snapshot.read().is_none()
    }

    /// Fail with `CacheFull` if memory is at the limit
    pub fn check_space(&self) -> Result<()> {
        let used = self.memory();
        if used >= self.max_memory {
            return Err(AtlasError::CacheFull {
                used,
                limit: self.max_memory,
            });
        }
        Ok(())
    }

    /// Block until memory drops below the limit, or fail after `timeout`
    pub fn wait_for_space(&self, timeout: Duration) -> Result<()> {
        if self.check_space().is_ok() {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.space_lock.lock();
        loop {
            let err = match self.check_space() {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if self.space_freed.wait_until(&mut guard, deadline).timed_out() {
                return self.check_space().map_err(|_| err);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut series = 0;
        for shard in &self.shards {
            series += shard.entries.read().len();
        }
        let (snapshot_points, snapshot_series) = self
            .snapshot
            .read()
            .as_ref()
            .map(|s| (s.point_count(), s.series_count()))
            .unwrap_or((0, 0));
        CacheStats {
            live_bytes: self.live_bytes(),
            snapshot_bytes: self.snapshot_bytes(),
            live_points: self.live_points.load(Ordering::Relaxed),
            snapshot_points,
            series: series + snapshot_series,
        }
    }

    fn adjust_live(&self, delta: isize) {
        if delta >= 0 {
            self.live_bytes.fetch_add(delta as usize, Ordering::Relaxed);
        } else {
            self.live_bytes.fetch_sub(delta.unsigned_abs(), Ordering::Relaxed);
            self.notify_space();
        }
    }

    fn notify_space(&self) {
        let _guard = self.space_lock.lock();
        self.space_freed.notify_all();
    }
}
