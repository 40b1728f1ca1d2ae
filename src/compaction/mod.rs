//! Compaction Module
//!
//! Turns cache snapshots into TSM files and merges TSM files into fewer,
//! larger ones.
//!
//! ## Responsibilities
//! - Flush: cache snapshot → new level-1 file, then retire covered WAL segments
//! - Level compaction: a run of level-N files → level N+1 (N < 3)
//! - Full compaction: everything → level 4, dropping deleted data
//! - Classify failures (I/O, corruption, aborted) for the scheduler
//!
//! ## Levels
//! ```text
//!  cache ──flush──► L1 ──► L2 ──► L3 ──full──► L4
//!                   └───────┴──────┴───full───►┘
//! ```
//!
//! ## Gates
//! Every job holds the compaction gate (shared) from planning through
//! publish. A delete raises the abort flag and takes the gate exclusively, so
//! tombstones are never recorded against files a job is still reading.
//!
//! ## Claims
//! Planning claims a job's inputs and its output generation and level until
//! the job ends. Foreground and background callers plan through the same
//! claims, so two jobs never share an input or an output name.

mod executor;
pub mod planner;
mod scheduler;
mod stats;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::error::{AtlasError, CompactionErrorKind, Result};
use crate::storage::file_store::TsmFile;
use crate::storage::{FileId, FileStore};
use crate::wal::{now_millis, WalWriter};

pub use executor::{JobFailure, MergeOutput, OutputOptions};
pub use planner::{CompactionJob, JobKind, PlannerOptions, FLUSH_LEVEL, FULL_LEVEL, MAX_LEVEL};
pub use scheduler::CompactionScheduler;
pub use stats::{CompactionStats, CompactionStatsSnapshot};

use executor::merge_into_files;

/// Runs flushes and compactions against shared engine state
pub struct Compactor {
    config: Config,
    files: Arc<FileStore>,
    cache: Arc<Cache>,
    wal: Arc<WalWriter>,
    /// Held shared by writers across WAL append + cache insert
    write_gate: Arc<RwLock<()>>,
    /// Held shared by running jobs, exclusively by deletes
    gate: RwLock<()>,
    abort: AtomicBool,
    /// One flush at a time
    flush_lock: Mutex<()>,
    /// Inputs that failed a checksum during compaction
    excluded: Mutex<HashSet<FileId>>,
    /// Inputs and outputs of planned jobs that have not finished
    claims: Mutex<Claims>,
    last_write_ms: AtomicU64,
    stats: CompactionStats,
}

impl Compactor {
    pub fn new(
        config: Config,
        files: Arc<FileStore>,
        cache: Arc<Cache>,
        wal: Arc<WalWriter>,
        write_gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            config,
            files,
            cache,
            wal,
            write_gate,
            gate: RwLock::new(()),
            abort: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
            excluded: Mutex::new(HashSet::new()),
            claims: Mutex::new(Claims::default()),
            last_write_ms: AtomicU64::new(now_millis()),
            stats: CompactionStats::new(),
        }
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write the cache out as a new level-1 file
    ///
    /// Returns None when the cache held nothing to flush.
    pub fn flush(&self) -> Result<Option<MergeOutput>> {
        let _single = self.flush_lock.lock();
        let _gate = self.gate.read();
        let started = Instant::now();

        let (snapshot, through) = {
            let _writers = self.write_gate.write();
            let through = self.wal.rotate()?;
            (self.cache.snapshot(through), through)
        };
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                // Nothing cached: every entry through `through` is in a file
                // or a delete already recorded in the tombstones
                let retired = self.wal.retire(through)?;
                if retired > 0 {
                    debug!(retired_segments = retired, through, "retired WAL segments without data");
                }
                return Ok(None);
            }
        };

        let id = FileId::new(self.files.next_generation(), FLUSH_LEVEL, 0);
        let result = merge_into_files(
            &self.files,
            &[],
            Some(snapshot.as_ref()),
            id,
            snapshot.max_lsn(),
            self.output_options(),
            &self.abort,
        )
        .and_then(|out| self.publish(out, &[]));

        let out = match result {
            Ok(out) => out,
            Err(failure) => {
                let kind = failure.error.compaction_kind();
                self.record_failure(JobKind::Flush, kind, &failure.error);
                return Err(failure.error);
            }
        };

        let keys: Vec<_> = snapshot.keys().cloned().collect();
        self.cache.evict(&keys);
        let retired = self.wal.retire(self.files.max_sequence())?;

        let elapsed = started.elapsed();
        self.stats
            .record_success(JobKind::Flush, out.points, out.bytes, elapsed);
        info!(
            files = out.files.len(),
            points = out.points,
            bytes = out.bytes,
            max_lsn = snapshot.max_lsn(),
            retired_segments = retired,
            duration_ms = elapsed.as_millis() as u64,
            "flushed cache snapshot"
        );
        Ok(Some(out))
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Plan and claim the next level compaction
    ///
    /// The claim is released when the job is executed or handed to `release`.
    pub fn plan_level(&self, level: u8) -> Option<CompactionJob> {
        let mut claims = self.claims.lock();
        let skip = self.skip_set(&claims.inputs);
        let job = planner::plan_level(&self.files.current(), level, &self.planner_options(), &skip)?;
        claims.claim(&job).then_some(job)
    }

    /// Plan and claim a full compaction
    pub fn plan_full(&self) -> Option<CompactionJob> {
        let mut claims = self.claims.lock();
        let skip = self.skip_set(&claims.inputs);
        let job = planner::plan_full(&self.files.current(), &self.planner_options(), &skip)?;
        claims.claim(&job).then_some(job)
    }

    /// Drop the claim of a planned job that will not run
    pub fn release(&self, job: &CompactionJob) {
        self.claims.lock().release(job);
    }

    /// Run one planned job and publish its outputs
    pub fn execute(&self, job: &CompactionJob) -> Result<MergeOutput> {
        let _claim = ClaimGuard { compactor: self, job };
        let started = Instant::now();
        match self.run_job(job) {
            Ok(out) => {
                let elapsed = started.elapsed();
                self.stats.record_success(job.kind, out.points, out.bytes, elapsed);
                info!(
                    kind = ?job.kind,
                    inputs = job.inputs.len(),
                    outputs = out.files.len(),
                    level = job.kind.output_level(),
                    points = out.points,
                    duration_ms = elapsed.as_millis() as u64,
                    "compaction finished"
                );
                Ok(out)
            }
            Err(failure) => {
                if let Some(file) = failure.corrupt_file {
                    if self.excluded.lock().insert(file) {
                        self.files.note_quarantined();
                        error!(
                            file = %file,
                            error = %failure.error,
                            "excluding corrupt file from compaction"
                        );
                    }
                }
                let kind = failure.error.compaction_kind();
                self.record_failure(job.kind, kind, &failure.error);
                Err(AtlasError::Compaction {
                    kind,
                    message: failure.error.to_string(),
                })
            }
        }
    }

    fn run_job(&self, job: &CompactionJob) -> std::result::Result<MergeOutput, JobFailure> {
        let _gate = self.gate.read();
        if self.abort.load(Ordering::Acquire) {
            return Err(AtlasError::Aborted.into());
        }

        let set = self.files.current();
        let mut inputs: Vec<Arc<TsmFile>> = Vec::with_capacity(job.inputs.len());
        for id in &job.inputs {
            match set.get(id) {
                Some(file) => inputs.push(Arc::clone(file)),
                // Planned against a set that has since changed
                None => return Err(AtlasError::Aborted.into()),
            }
        }
        let output = planner::output_id(&set, job.output.generation, job.output.level);
        let max_sequence = inputs
            .iter()
            .map(|f| f.reader().max_sequence())
            .max()
            .unwrap_or(0);
        debug!(kind = ?job.kind, inputs = ?job.inputs.iter().map(|id| id.to_string()).collect::<Vec<_>>(), "compaction started");

        let out = merge_into_files(
            &self.files,
            &inputs,
            None,
            output,
            max_sequence,
            self.output_options(),
            &self.abort,
        )?;
        drop(inputs);
        self.publish(out, &job.inputs)
    }

    /// Publish outputs, deleting them if the file set rejects them
    fn publish(&self, out: MergeOutput, removed: &[FileId]) -> std::result::Result<MergeOutput, JobFailure> {
        if let Err(e) = self.files.publish(&out.files, removed) {
            for meta in &out.files {
                if let Err(rm) = std::fs::remove_file(&meta.path) {
                    warn!(file = %meta.id, error = %rm, "failed to remove unpublished output");
                }
            }
            return Err(e.into());
        }
        Ok(out)
    }

    /// Run level compactions until no run qualifies
    ///
    /// Returns the number of jobs run.
    pub fn compact(&self) -> Result<usize> {
        let mut jobs = 0;
        'plan: loop {
            for level in FLUSH_LEVEL..MAX_LEVEL {
                if let Some(job) = self.plan_level(level) {
                    self.execute(&job)?;
                    jobs += 1;
                    continue 'plan;
                }
            }
            return Ok(jobs);
        }
    }

    /// Merge all files into level 4
    ///
    /// Returns the number of jobs run.
    pub fn compact_full(&self) -> Result<usize> {
        let mut jobs = 0;
        // Each pass removes files or clears tombstones
        let limit = self.files.current().len() + 1;
        while jobs < limit {
            match self.plan_full() {
                Some(job) => {
                    self.execute(&job)?;
                    jobs += 1;
                }
                None => break,
            }
        }
        Ok(jobs)
    }

    // =========================================================================
    // Coordination
    // =========================================================================

    /// Abort running jobs and keep new ones out until the guard drops
    pub fn pause(&self) -> RwLockWriteGuard<'_, ()> {
        self.abort.store(true, Ordering::Release);
        let guard = self.gate.write();
        self.abort.store(false, Ordering::Release);
        guard
    }

    /// Ask running jobs to stop at their next block
    pub fn abort_running(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn clear_abort(&self) {
        self.abort.store(false, Ordering::Release);
    }

    /// Record write activity for cold detection
    pub fn note_write(&self) {
        self.last_write_ms.store(now_millis(), Ordering::Relaxed);
    }

    /// True once no write arrived for `full_compaction_cold_after`
    pub fn is_cold(&self) -> bool {
        match self.config.full_compaction_cold_after {
            Some(after) => {
                let idle = now_millis().saturating_sub(self.last_write_ms.load(Ordering::Relaxed));
                Duration::from_millis(idle) >= after
            }
            None => false,
        }
    }

    /// Files skipped by planning after corruption was found in them
    pub fn excluded_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self.excluded.lock().iter().copied().collect();
        files.sort();
        files
    }

    pub fn stats(&self) -> CompactionStatsSnapshot {
        let files = self.files.stats();
        self.stats
            .snapshot(files.corrupt_blocks, files.quarantined_files)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    fn record_failure(&self, job: JobKind, kind: CompactionErrorKind, error: &AtlasError) {
        match kind {
            CompactionErrorKind::Aborted => {
                self.stats.record_abort();
                debug!(kind = ?job, "compaction aborted");
            }
            _ => {
                self.stats.record_failure();
                warn!(kind = ?job, error = %error, "compaction failed");
            }
        }
    }

    /// Number of files claimed by planned or running jobs
    pub fn claimed_files(&self) -> usize {
        self.claims.lock().inputs.len()
    }

    fn skip_set(&self, busy: &HashSet<FileId>) -> HashSet<FileId> {
        let mut skip = busy.clone();
        skip.extend(self.excluded.lock().iter().copied());
        // Drop ids that no longer exist
        let set = self.files.current();
        self.excluded.lock().retain(|id| set.get(id).is_some());
        skip
    }

    fn planner_options(&self) -> PlannerOptions {
        PlannerOptions::from_config(&self.config)
    }

    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            max_points_per_block: self.config.max_points_per_block,
            max_file_size: self.config.max_file_size,
        }
    }
}

/// Files and output names held by jobs between planning and completion
#[derive(Debug, Default)]
struct Claims {
    inputs: HashSet<FileId>,
    /// (generation, level) each job writes its parts under
    outputs: HashSet<(u64, u8)>,
}

impl Claims {
    fn claim(&mut self, job: &CompactionJob) -> bool {
        let output = (job.output.generation, job.output.level);
        if self.outputs.contains(&output) || job.inputs.iter().any(|id| self.inputs.contains(id)) {
            return false;
        }
        self.outputs.insert(output);
        self.inputs.extend(job.inputs.iter().copied());
        true
    }

    fn release(&mut self, job: &CompactionJob) {
        self.outputs.remove(&(job.output.generation, job.output.level));
        for id in &job.inputs {
            self.inputs.remove(id);
        }
    }
}

struct ClaimGuard<'a> {
    compactor: &'a Compactor,
    job: &'a CompactionJob,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.compactor.release(self.job);
    }
}
