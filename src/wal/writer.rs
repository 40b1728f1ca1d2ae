//! WAL Writer
//!
//! Appends entries to the active segment and makes them durable.
//!
//! ## Concurrency
//! Appends serialize on the segment lock only long enough to assign an LSN
//! and write the frame. Under `GroupCommit` the fsync happens after that lock
//! is released: the first waiter syncs everything written so far and every
//! appender whose LSN is covered returns without a syscall of its own.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, WalSyncStrategy};
use crate::error::{AtlasError, Result};
use crate::storage::tsm::sync_dir;

use super::entry::{encode_frame, now_millis};
use super::{encode_segment_header, segment_path, Operation, RecoveryResult, SegmentInfo, SEGMENT_HEADER_SIZE};

/// Settings the writer takes from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct WalOptions {
    pub sync_strategy: WalSyncStrategy,
    pub segment_size: u64,
}

impl WalOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sync_strategy: config.wal_sync_strategy,
            segment_size: config.wal_segment_size,
        }
    }
}

struct ActiveSegment {
    id: u64,
    path: PathBuf,
    file: Arc<File>,
    size: u64,
    max_lsn: u64,
    entries: u64,
}

struct WriterState {
    active: ActiveSegment,
    /// Sealed segments still needed for recovery, oldest first
    sealed: Vec<SegmentInfo>,
    next_lsn: u64,
}

/// Writes entries to the WAL segments
pub struct WalWriter {
    dir: PathBuf,
    options: WalOptions,
    state: Mutex<WriterState>,
    sync_lock: Mutex<()>,
    synced_lsn: AtomicU64,
}

impl WalWriter {
    /// Open the WAL in `dir`, continuing after what recovery found
    ///
    /// Existing segments are left as they are; appends always go to a new
    /// segment.
    pub fn open(dir: &Path, options: WalOptions, recovered: &RecoveryResult) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let active = create_segment(dir, recovered.next_segment_id())?;
        info!(
            dir = %dir.display(),
            segment = active.id,
            next_lsn = recovered.next_lsn(),
            "WAL opened"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            state: Mutex::new(WriterState {
                active,
                sealed: recovered.segments.clone(),
                next_lsn: recovered.next_lsn(),
            }),
            sync_lock: Mutex::new(()),
            synced_lsn: AtomicU64::new(recovered.last_lsn),
        })
    }

    /// Make sure the next LSN is at least `lsn`
    ///
    /// Used after retired segments took the highest LSNs with them.
    pub fn advance_lsn(&self, lsn: u64) {
        let mut state = self.state.lock();
        if state.next_lsn < lsn {
            state.next_lsn = lsn;
        }
    }

    /// Append an operation and make it durable; returns its LSN
    pub fn append(&self, operation: &Operation) -> Result<u64> {
        let mut state = self.state.lock();
        let lsn = state.next_lsn;
        let frame = encode_frame(lsn, now_millis(), operation)?;

        if state.active.size + frame.len() as u64 > self.options.segment_size
            && state.active.entries > 0
        {
            self.rotate_locked(&mut state)?;
        }

        if let Err(e) = (&*state.active.file).write_all(&frame) {
            // A torn frame hides every later entry of its segment from recovery
            if let Err(rotate_err) = self.rotate_locked(&mut state) {
                warn!(error = %rotate_err, "failed to rotate WAL after a failed append");
            }
            return Err(durability("append", e));
        }
        state.active.size += frame.len() as u64;
        state.active.max_lsn = lsn;
        state.active.entries += 1;
        state.next_lsn = lsn + 1;

        match self.options.sync_strategy {
            WalSyncStrategy::EveryWrite => {
                state.active.file.sync_data().map_err(|e| durability("fsync", e))?;
                self.synced_lsn.fetch_max(lsn, Ordering::AcqRel);
                Ok(lsn)
            }
            WalSyncStrategy::GroupCommit => {
                drop(state);
                self.sync_through(lsn)?;
                Ok(lsn)
            }
        }
    }

    /// Force everything written so far to disk
    pub fn sync(&self) -> Result<()> {
        let last = self.state.lock().next_lsn.saturating_sub(1);
        self.sync_through(last)
    }

    fn sync_through(&self, lsn: u64) -> Result<()> {
        if self.synced_lsn.load(Ordering::Acquire) >= lsn {
            return Ok(());
        }
        let _guard = self.sync_lock.lock();
        if self.synced_lsn.load(Ordering::Acquire) >= lsn {
            return Ok(());
        }
        // Everything up to `written` lives in `file` or an already synced segment
        let (file, written) = {
            let state = self.state.lock();
            (Arc::clone(&state.active.file), state.next_lsn.saturating_sub(1))
        };
        file.sync_data().map_err(|e| durability("fsync", e))?;
        self.synced_lsn.fetch_max(written, Ordering::AcqRel);
        Ok(())
    }

    /// Seal the active segment and start a new one
    ///
    /// Returns the highest LSN in the sealed segments. An empty active
    /// segment is kept.
    pub fn rotate(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.active.entries > 0 {
            self.rotate_locked(&mut state)?;
        }
        Ok(state.next_lsn.saturating_sub(1))
    }

    fn rotate_locked(&self, state: &mut WriterState) -> Result<()> {
        state.active.file.sync_all().map_err(|e| durability("fsync", e))?;
        self.synced_lsn.fetch_max(state.active.max_lsn, Ordering::AcqRel);

        let next = create_segment(&self.dir, state.active.id + 1)?;
        let sealed = std::mem::replace(&mut state.active, next);
        debug!(
            segment = sealed.id,
            max_lsn = sealed.max_lsn,
            bytes = sealed.size,
            "sealed WAL segment"
        );
        state.sealed.push(SegmentInfo {
            id: sealed.id,
            path: sealed.path,
            max_lsn: sealed.max_lsn,
            entries: sealed.entries,
        });
        Ok(())
    }

    /// Delete sealed segments whose entries are all at or below `flushed_lsn`
    ///
    /// Returns how many segments were removed.
    pub fn retire(&self, flushed_lsn: u64) -> Result<usize> {
        let mut state = self.state.lock();
        let mut removed = 0;
        let mut kept = Vec::with_capacity(state.sealed.len());
        for segment in state.sealed.drain(..) {
            if segment.max_lsn <= flushed_lsn {
                match fs::remove_file(&segment.path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => removed += 1,
                    Err(e) => {
                        warn!(segment = %segment.path.display(), error = %e, "failed to retire WAL segment");
                        kept.push(segment);
                    }
                }
            } else {
                kept.push(segment);
            }
        }
        state.sealed = kept;
        if removed > 0 {
            sync_dir(&self.dir)?;
            debug!(removed, flushed_lsn, "retired WAL segments");
        }
        Ok(removed)
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.state.lock().next_lsn
    }

    /// Highest LSN known to be on disk
    pub fn synced_lsn(&self) -> u64 {
        self.synced_lsn.load(Ordering::Acquire)
    }

    /// Sealed plus active segments
    pub fn segment_count(&self) -> usize {
        self.state.lock().sealed.len() + 1
    }

    /// Total bytes across all segments
    pub fn size_bytes(&self) -> u64 {
        let state = self.state.lock();
        let sealed: u64 = state
            .sealed
            .iter()
            .filter_map(|s| fs::metadata(&s.path).ok())
            .map(|m| m.len())
            .sum();
        sealed + state.active.size
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn create_segment(dir: &Path, id: u64) -> Result<ActiveSegment> {
    let path = segment_path(dir, id);
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&path)
        .map_err(|e| durability("create segment", e))?;
    file.write_all(&encode_segment_header(id))
        .map_err(|e| durability("write segment header", e))?;
    file.sync_all().map_err(|e| durability("fsync", e))?;
    sync_dir(dir)?;
    Ok(ActiveSegment {
        id,
        path,
        file: Arc::new(file),
        size: SEGMENT_HEADER_SIZE as u64,
        max_lsn: 0,
        entries: 0,
    })
}

fn durability(what: &str, e: std::io::Error) -> AtlasError {
    AtlasError::Durability(format!("WAL {} failed: {}", what, e))
}
