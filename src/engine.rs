//! Engine Module
//!
//! The time-series storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Validate, log and cache incoming points
//! - Answer range queries over cache and TSM files
//! - Record deletes against cache, files and WAL
//! - Recover from the WAL on startup and run background compaction
//!
//! ## Write Path
//! ```text
//! write ─► scale + validate ─► backpressure ─► WAL.append ─► Cache.insert
//!                                               (durable)        │
//!                                        flush when full ◄───────┘
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::compaction::{CompactionScheduler, CompactionStatsSnapshot, Compactor};
use crate::config::{Backpressure, Config};
use crate::error::{AtlasError, Result};
use crate::point::{batch_type, Point, Precision, TimeRange, ValueType};
use crate::query::{QueryResult, SeriesCursor};
use crate::series::{Predicate, SeriesKey, TypeRegistry};
use crate::storage::FileStore;
use crate::wal::{Operation, WalOptions, WalRecovery, WalWriter};

/// Observability snapshot of one engine
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub cache_bytes: usize,
    pub cache_points: usize,
    pub snapshot_bytes: usize,
    pub series: usize,
    pub wal_segments: usize,
    pub wal_bytes: u64,
    pub last_lsn: u64,
    pub files_per_level: std::collections::BTreeMap<u8, usize>,
    pub total_file_bytes: u64,
    pub tombstoned_files: usize,
    pub compactions: CompactionStatsSnapshot,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** hold `write_gate` shared across WAL append + cache insert,
///   so writers to different series only meet in the WAL and their shard.
///   A batch that introduces a series also holds `new_series`, so its type
///   is registered only after the WAL append succeeds.
/// - **Snapshots** (flush) hold `write_gate` exclusively for a moment, so a
///   snapshot never misses an acknowledged write with a lower LSN.
/// - **Deletes** pause compaction, then hold `write_gate` exclusively while
///   the delete is logged and applied everywhere.
/// - **Reads** take no engine lock: they copy cache points, then pin the
///   published file set.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Write-ahead log for durability
    wal: Arc<WalWriter>,

    /// Recent writes not yet in a TSM file
    cache: Arc<Cache>,

    /// Published TSM files
    files: Arc<FileStore>,

    /// Value type of every known series
    types: TypeRegistry,

    /// Held by writers that introduce a series
    new_series: Mutex<()>,

    compactor: Arc<Compactor>,
    scheduler: Mutex<Option<CompactionScheduler>>,

    write_gate: Arc<RwLock<()>>,
    closed: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open the file store (drops `.tmp` leftovers, quarantines bad files)
    /// 2. Recover the WAL and replay entries newer than the files
    /// 3. Rebuild the type registry
    /// 4. Start background compaction
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create directories and open the file store
        fs::create_dir_all(&config.data_dir)?;
        let files = Arc::new(FileStore::open(&config.tsm_dir())?);
        let flushed = files.max_sequence();

        // Step 2: Recover the WAL, then open it for appends
        let wal_dir = config.wal_dir();
        let (entries, recovery) = WalRecovery::recover(&wal_dir)?;
        if recovery.entries_corrupted > 0 {
            warn!(
                corrupted = recovery.entries_corrupted,
                truncated = recovery.was_truncated,
                "WAL recovery dropped damaged entries"
            );
        }
        let wal = Arc::new(WalWriter::open(&wal_dir, WalOptions::from_config(&config), &recovery)?);
        wal.advance_lsn(flushed + 1);

        // Step 3: Types from the files, then replay into the cache
        let types = TypeRegistry::new();
        for (key, ty) in files.value_types() {
            if let Err(e) = types.register(&key, ty) {
                warn!(error = %e, "conflicting series type in TSM files");
            }
        }

        let cache = Arc::new(Cache::new(config.cache_shards, config.cache_max_memory));
        let mut replayed = 0u64;
        for entry in entries.into_iter().filter(|e| e.lsn > flushed) {
            match entry.operation {
                Operation::Write { series } => {
                    for (key, points) in series {
                        let registered = batch_type(&points).and_then(|ty| types.register(&key, ty));
                        if let Err(e) = registered {
                            warn!(lsn = entry.lsn, error = %e, "skipping replayed points");
                            continue;
                        }
                        cache.insert(&key, &points, entry.lsn)?;
                    }
                }
                Operation::Delete { predicate, range } => {
                    cache.delete_range(&predicate, range);
                    files.delete_range(&predicate, range)?;
                }
            }
            replayed += 1;
        }

        // Step 4: Compaction
        let write_gate = Arc::new(RwLock::new(()));
        let compactor = Arc::new(Compactor::new(
            config.clone(),
            Arc::clone(&files),
            Arc::clone(&cache),
            Arc::clone(&wal),
            Arc::clone(&write_gate),
        ));
        let scheduler = if config.background_compaction {
            Some(CompactionScheduler::start(Arc::clone(&compactor))?)
        } else {
            None
        };

        info!(
            data_dir = %config.data_dir.display(),
            files = files.current().len(),
            series = types.len(),
            replayed,
            flushed_lsn = flushed,
            next_lsn = wal.current_lsn(),
            "engine opened"
        );

        Ok(Self {
            config,
            wal,
            cache,
            files,
            types,
            new_series: Mutex::new(()),
            compactor,
            scheduler: Mutex::new(scheduler),
            write_gate,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write points of one series
    ///
    /// Timestamps are scaled from `precision` to nanoseconds. The batch must
    /// hold a single value type matching the series' established type.
    pub fn write(&self, key: &SeriesKey, points: &[Point], precision: Precision) -> Result<()> {
        self.write_batch(&[(key.clone(), points.to_vec())], precision)
    }

    /// Write several series as one WAL entry
    ///
    /// Either every series is accepted or nothing is written.
    pub fn write_batch(&self, batch: &[(SeriesKey, Vec<Point>)], precision: Precision) -> Result<()> {
        self.ensure_open()?;

        // Step 1: Scale timestamps and check types without touching state
        let mut series = Vec::with_capacity(batch.len());
        let mut batch_types: HashMap<&SeriesKey, ValueType> = HashMap::new();
        for (key, points) in batch {
            if points.is_empty() {
                continue;
            }
            let scaled = scale(points, precision)?;
            let ty = batch_type(&scaled)?;
            if let Some(other) = batch_types.insert(key, ty) {
                if other != ty {
                    return Err(AtlasError::Validation(format!(
                        "series '{}' appears as {} and {} in one batch",
                        key, other, ty
                    )));
                }
            }
            self.types.check(key, ty)?;
            series.push((key.clone(), scaled));
        }
        if series.is_empty() {
            return Ok(());
        }

        // Step 2: Backpressure, before taking the gate a flush needs
        self.reserve_space()?;

        // Step 3: WAL then cache, under the shared write gate
        {
            let _gate = self.write_gate.read();
            self.ensure_open()?;
            // Writers introducing a series settle its type one at a time and
            // register it only once the WAL holds the write
            let _first_writer = if series.iter().any(|(key, _)| self.types.get(key).is_none()) {
                let guard = self.new_series.lock();
                for (key, points) in &series {
                    self.types.check(key, points[0].value.value_type())?;
                }
                Some(guard)
            } else {
                None
            };
            let operation = Operation::Write { series };
            let lsn = self.wal.append(&operation)?;
            if let Operation::Write { series } = &operation {
                for (key, points) in series {
                    self.types.register(key, points[0].value.value_type())?;
                    self.cache.insert(key, points, lsn)?;
                }
            }
        }

        // Step 4: Flush if the cache is full enough
        self.compactor.note_write();
        self.maybe_flush();
        Ok(())
    }

    fn reserve_space(&self) -> Result<()> {
        match self.config.backpressure {
            Backpressure::Reject => self.cache.check_space(),
            Backpressure::Block { timeout } => {
                if self.cache.check_space().is_ok() {
                    return Ok(());
                }
                self.maybe_flush();
                self.cache.wait_for_space(timeout)
            }
        }
    }

    fn maybe_flush(&self) {
        if self.cache.live_bytes() < self.config.cache_snapshot_size {
            return;
        }
        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            scheduler.wake();
            return;
        }
        if let Err(e) = self.compactor.flush() {
            warn!(error = %e, "inline flush failed");
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cursors for every series matching `predicate`, restricted to `range`
    pub fn query(&self, predicate: &Predicate, range: TimeRange) -> Result<QueryResult> {
        self.ensure_open()?;
        if range.is_empty() {
            return Ok(QueryResult::default());
        }

        // Cache keys first: data only ever moves from the cache to files
        let mut keys: BTreeSet<SeriesKey> = self.cache.keys(predicate);
        keys.extend(self.files.current().keys(predicate));

        let cached: Vec<Vec<Point>> = keys.iter().map(|k| self.cache.values(k, range)).collect();
        let set = self.files.current();
        let cursors = keys
            .into_iter()
            .zip(cached)
            .map(|(key, points)| {
                let plans = set.plan(&key, range);
                SeriesCursor::new(key, range, points, plans, self.files.corrupt_counter())
            })
            .collect();
        Ok(QueryResult::new(cursors))
    }

    /// Cursor over one series
    pub fn query_series(&self, key: &SeriesKey, range: TimeRange) -> Result<SeriesCursor> {
        self.ensure_open()?;
        let cached = if range.is_empty() {
            Vec::new()
        } else {
            self.cache.values(key, range)
        };
        let plans = if range.is_empty() {
            Vec::new()
        } else {
            self.files.current().plan(key, range)
        };
        Ok(SeriesCursor::new(
            key.clone(),
            range,
            cached,
            plans,
            self.files.corrupt_counter(),
        ))
    }

    /// Known series matching `predicate`
    pub fn series(&self, predicate: &Predicate) -> Vec<SeriesKey> {
        self.types.matching(predicate)
    }

    /// Established value type of a series
    pub fn value_type(&self, key: &SeriesKey) -> Option<ValueType> {
        self.types.get(key)
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Delete points of matching series within `range`
    ///
    /// Steps:
    /// 1. Abort running compactions and keep new ones out
    /// 2. Hold off writers
    /// 3. Log the delete in the WAL
    /// 4. Remove cached points and tombstone the files
    pub fn delete_range(&self, predicate: &Predicate, range: TimeRange) -> Result<()> {
        self.ensure_open()?;
        if range.is_empty() {
            return Ok(());
        }

        let _paused = self.compactor.pause();
        let _writers = self.write_gate.write();

        let lsn = self.wal.append(&Operation::Delete {
            predicate: predicate.clone(),
            range,
        })?;
        let removed = self.cache.delete_range(predicate, range);
        let files = self.files.delete_range(predicate, range)?;

        debug!(lsn, ?predicate, ?range, cached_points = removed, files, "delete applied");
        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Flush the cache into a new TSM file
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.compactor.flush()?;
        Ok(())
    }

    /// Run level compactions until none qualifies; returns jobs run
    pub fn compact(&self) -> Result<usize> {
        self.ensure_open()?;
        self.compactor.compact()
    }

    /// Flush, then merge everything into level 4; returns jobs run
    pub fn compact_full(&self) -> Result<usize> {
        self.ensure_open()?;
        self.compactor.flush()?;
        self.compactor.compact_full()
    }

    /// True once no write arrived for `full_compaction_cold_after`
    pub fn is_cold(&self) -> bool {
        self.compactor.is_cold()
    }

    pub fn stats(&self) -> EngineStats {
        let cache = self.cache.stats();
        let files = self.files.stats();
        EngineStats {
            cache_bytes: cache.live_bytes + cache.snapshot_bytes,
            cache_points: cache.live_points + cache.snapshot_points,
            snapshot_bytes: cache.snapshot_bytes,
            series: self.types.len(),
            wal_segments: self.wal.segment_count(),
            wal_bytes: self.wal.size_bytes(),
            last_lsn: self.wal.current_lsn().saturating_sub(1),
            files_per_level: files.files_per_level,
            total_file_bytes: files.total_file_bytes,
            tombstoned_files: files.tombstoned_files,
            compactions: self.compactor.stats(),
        }
    }

    /// Close the engine gracefully
    ///
    /// Stops compaction, flushes the cache and syncs the WAL. Later calls
    /// fail with `AtlasError::Closed`.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Wait out writers already past the open check
        drop(self.write_gate.write());

        if let Some(mut scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }
        self.compactor.flush()?;
        self.wal.sync()?;
        self.wal.retire(self.files.max_sequence())?;
        info!(data_dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AtlasError::Closed);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file_store(&self) -> &FileStore {
        &self.files
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Files excluded from compaction after corruption was found in them
    pub fn excluded_files(&self) -> Vec<crate::storage::FileId> {
        self.compactor.excluded_files()
    }

    /// Files held by planned or running compactions
    pub fn claimed_files(&self) -> usize {
        self.compactor.claimed_files()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "engine shutdown failed");
        }
    }
}

/// Copy `points` with timestamps scaled to nanoseconds
fn scale(points: &[Point], precision: Precision) -> Result<Vec<Point>> {
    points
        .iter()
        .map(|p| Ok(Point::new(precision.to_nanos(p.timestamp)?, p.value.clone())))
        .collect()
}
