//! File Store
//!
//! Owns the published set of TSM files and answers merged reads over it.
//!
//! ## Responsibilities
//! - Discover sealed files on startup, discard temp files, quarantine bad ones
//! - Publish new file sets atomically (flush and compaction outputs)
//! - Defer physical deletion of replaced files until the last reader is gone
//! - Record deletes as tombstones against every affected file
//!
//! ## Concurrency
//! - `set`: the current `Arc<FileSet>`, swapped whole under a short write
//!   lock. Readers clone the `Arc` and never block on compaction.
//! - A replaced `TsmFile` is flagged obsolete; its `Drop` removes it from disk
//!   once no `FileSet` or cursor refers to it any more.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{AtlasError, Result};
use crate::point::{TimeRange, ValueType};
use crate::series::{Predicate, SeriesKey};

use super::merge::{BlockPlan, BlockStream, CorruptBlocks, MergeIter, Source};
use super::tsm::{
    FileId, Tombstone, TombstoneLog, TsmFileMeta, TsmReader, BAD_EXTENSION, TMP_EXTENSION,
    TOMBSTONE_EXTENSION, TSM_EXTENSION,
};

// =============================================================================
// TsmFile
// =============================================================================

/// A sealed TSM file with its tombstones
pub struct TsmFile {
    reader: TsmReader,
    tombstones: TombstoneLog,
    obsolete: AtomicBool,
}

impl TsmFile {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = TsmReader::open(path)?;
        let tombstones = TombstoneLog::open(path)?;
        Ok(Self {
            reader,
            tombstones,
            obsolete: AtomicBool::new(false),
        })
    }

    pub fn reader(&self) -> &TsmReader {
        &self.reader
    }

    pub fn tombstones(&self) -> &TombstoneLog {
        &self.tombstones
    }

    pub fn id(&self) -> FileId {
        self.reader.id()
    }

    pub fn level(&self) -> u8 {
        self.reader.id().level
    }

    pub fn size(&self) -> u64 {
        self.reader.size()
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Schedule removal from disk once the last reference drops
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    /// True if some key matching `predicate` has data inside `range`
    pub fn has_matching_data(&self, predicate: &Predicate, range: TimeRange) -> bool {
        match predicate {
            Predicate::Series(key) => self
                .reader
                .key_index(key)
                .is_some_and(|k| range.overlaps(k.min_time(), k.max_time())),
            _ => self
                .reader
                .index()
                .iter()
                .any(|k| predicate.matches(&k.key) && range.overlaps(k.min_time(), k.max_time())),
        }
    }
}

impl Drop for TsmFile {
    fn drop(&mut self) {
        if !self.is_obsolete() {
            return;
        }
        match fs::remove_file(self.reader.path()) {
            Ok(()) => debug!(file = %self.id(), "removed obsolete TSM file"),
            Err(e) => warn!(file = %self.id(), error = %e, "failed to remove obsolete TSM file"),
        }
        if let Err(e) = self.tombstones.remove() {
            warn!(file = %self.id(), error = %e, "failed to remove tombstone file");
        }
    }
}

// =============================================================================
// FileSet
// =============================================================================

/// An immutable snapshot of the published files, oldest first
#[derive(Default, Clone)]
pub struct FileSet {
    files: BTreeMap<FileId, Arc<TsmFile>>,
}

impl FileSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, id: &FileId) -> Option<&Arc<TsmFile>> {
        self.files.get(id)
    }

    /// Files in generation order, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TsmFile>> {
        self.files.values()
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.files.keys().copied().collect()
    }

    /// Highest WAL sequence number durable in any file
    pub fn max_sequence(&self) -> u64 {
        self.iter().map(|f| f.reader().max_sequence()).max().unwrap_or(0)
    }

    pub fn max_generation(&self) -> u64 {
        self.files.keys().map(|id| id.generation).max().unwrap_or(0)
    }

    pub fn total_size(&self) -> u64 {
        self.iter().map(|f| f.size()).sum()
    }

    pub fn files_per_level(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for id in self.files.keys() {
            *counts.entry(id.level).or_insert(0) += 1;
        }
        counts
    }

    /// Block plans for one series; priority is the file's rank, newest highest
    pub fn plan(&self, key: &SeriesKey, range: TimeRange) -> Vec<BlockPlan> {
        self.files
            .values()
            .enumerate()
            .filter_map(|(rank, file)| BlockPlan::new(file, rank as u64, key, range))
            .collect()
    }

    /// Keys present in any file matching `predicate`
    pub fn keys(&self, predicate: &Predicate) -> BTreeSet<SeriesKey> {
        let mut keys = BTreeSet::new();
        for file in self.iter() {
            match predicate {
                Predicate::Series(key) => {
                    if file.reader().contains(key) {
                        keys.insert(key.clone());
                    }
                }
                _ => keys.extend(file.reader().keys().filter(|k| predicate.matches(k)).cloned()),
            }
        }
        keys
    }

    fn with_changes(&self, added: Vec<Arc<TsmFile>>, removed: &[FileId]) -> Self {
        let mut files = self.files.clone();
        for id in removed {
            files.remove(id);
        }
        for file in added {
            files.insert(file.id(), file);
        }
        Self { files }
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// Statistics about the published files
#[derive(Debug, Clone, Default)]
pub struct FileStoreStats {
    pub files_per_level: BTreeMap<u8, usize>,
    pub total_file_bytes: u64,
    pub tombstoned_files: usize,
    pub corrupt_blocks: u64,
    pub quarantined_files: u64,
}

pub struct FileStore {
    dir: PathBuf,
    set: RwLock<Arc<FileSet>>,
    next_generation: AtomicU64,
    corrupt_blocks: Arc<AtomicU64>,
    quarantined_files: AtomicU64,
}

impl FileStore {
    /// Open the store in `dir`
    ///
    /// On startup:
    /// 1. Remove leftover `.tmp` outputs of interrupted flushes/compactions
    /// 2. Open every sealed `.tsm`; rename unreadable ones to `.bad`
    /// 3. Drop tombstone files whose TSM file is gone
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut files = BTreeMap::new();
        let mut quarantined = 0u64;
        let mut tombstone_paths = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_EXTENSION) => {
                    info!(path = %path.display(), "removing incomplete TSM output");
                    fs::remove_file(&path)?;
                }
                Some(TOMBSTONE_EXTENSION) => tombstone_paths.push(path),
                Some(TSM_EXTENSION) if FileId::parse(&path).is_none() => {
                    warn!(path = %path.display(), "ignoring TSM file with a foreign name");
                }
                Some(TSM_EXTENSION) => match TsmFile::open(&path) {
                    Ok(file) => {
                        files.insert(file.id(), Arc::new(file));
                    }
                    Err(e) if is_unreadable(&e) => {
                        quarantine(&path, &e)?;
                        quarantined += 1;
                    }
                    Err(e) => return Err(e),
                },
                _ => {}
            }
        }

        for path in tombstone_paths {
            let tsm = path.with_extension(TSM_EXTENSION);
            let orphaned = FileId::parse(&tsm).is_some()
                && !files.values().any(|f: &Arc<TsmFile>| f.path() == tsm);
            // A quarantined file already took its sidecar along
            if orphaned && path.exists() {
                debug!(path = %path.display(), "removing orphaned tombstone file");
                fs::remove_file(&path)?;
            }
        }

        let set = FileSet { files };
        let next_generation = set.max_generation() + 1;
        info!(
            dir = %dir.display(),
            files = set.len(),
            max_sequence = set.max_sequence(),
            quarantined,
            "opened file store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            set: RwLock::new(Arc::new(set)),
            next_generation: AtomicU64::new(next_generation),
            corrupt_blocks: Arc::new(AtomicU64::new(0)),
            quarantined_files: AtomicU64::new(quarantined),
        })
    }

    /// The currently published files
    pub fn current(&self) -> Arc<FileSet> {
        Arc::clone(&self.set.read())
    }

    /// Allocate a generation for a new flush
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Swap in `added` and retire `removed` in one step
    ///
    /// New files are opened before the swap, so a file that fails to open
    /// leaves the published set untouched.
    pub fn publish(&self, added: &[TsmFileMeta], removed: &[FileId]) -> Result<()> {
        let mut opened = Vec::with_capacity(added.len());
        for meta in added {
            opened.push(Arc::new(TsmFile::open(&meta.path)?));
        }

        let mut set = self.set.write();
        for id in removed {
            if let Some(file) = set.get(id) {
                file.mark_obsolete();
            }
        }
        let next = set.with_changes(opened, removed);
        *set = Arc::new(next);
        drop(set);

        debug!(
            added = ?added.iter().map(|m| m.id.to_string()).collect::<Vec<_>>(),
            removed = ?removed.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            "published file set"
        );
        Ok(())
    }

    /// Merged, tombstone-filtered points of `key` in `range` across all files
    pub fn read(&self, key: &SeriesKey, range: TimeRange) -> MergeIter {
        let set = self.current();
        let sources = set
            .plan(key, range)
            .into_iter()
            .map(|plan| {
                let priority = plan.priority;
                (priority, Source::Blocks(self.stream(plan, key, range, CorruptBlocks::Skip)))
            })
            .collect();
        MergeIter::new(sources)
    }

    /// Build a block stream that reports into this store's counters
    pub fn stream(
        &self,
        plan: BlockPlan,
        key: &SeriesKey,
        range: TimeRange,
        policy: CorruptBlocks,
    ) -> BlockStream {
        BlockStream::new(plan, key.clone(), range, Arc::clone(&self.corrupt_blocks), policy)
    }

    /// Tombstone matching data in every file that holds some
    ///
    /// Returns the number of files touched.
    pub fn delete_range(&self, predicate: &Predicate, range: TimeRange) -> Result<usize> {
        let set = self.current();
        let mut touched = 0;
        let tombstone = Tombstone::new(predicate.clone(), range);
        for file in set.iter() {
            // Replaying a delete must not stack identical records
            if file.has_matching_data(predicate, range) && !file.tombstones().contains(&tombstone) {
                file.tombstones().add(tombstone.clone())?;
                touched += 1;
            }
        }
        if touched > 0 {
            debug!(files = touched, ?range, "recorded tombstones");
        }
        Ok(touched)
    }

    /// Highest WAL sequence number durable in the published files
    pub fn max_sequence(&self) -> u64 {
        self.current().max_sequence()
    }

    /// Every (key, type) pair in the published files
    pub fn value_types(&self) -> Vec<(SeriesKey, ValueType)> {
        let set = self.current();
        let mut out = Vec::new();
        for file in set.iter() {
            out.extend(file.reader().index().iter().map(|k| (k.key.clone(), k.value_type)));
        }
        out
    }

    pub fn corrupt_blocks(&self) -> u64 {
        self.corrupt_blocks.load(Ordering::Relaxed)
    }

    /// Shared counter for block streams built outside the store
    pub(crate) fn corrupt_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.corrupt_blocks)
    }

    pub fn stats(&self) -> FileStoreStats {
        let set = self.current();
        FileStoreStats {
            files_per_level: set.files_per_level(),
            total_file_bytes: set.total_size(),
            tombstoned_files: set.iter().filter(|f| !f.tombstones().is_empty()).count(),
            corrupt_blocks: self.corrupt_blocks(),
            quarantined_files: self.quarantined_files.load(Ordering::Relaxed),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Count a file excluded from compaction after corruption was found
    pub(crate) fn note_quarantined(&self) {
        self.quarantined_files.fetch_add(1, Ordering::Relaxed);
    }
}

fn is_unreadable(e: &AtlasError) -> bool {
    match e {
        AtlasError::Corruption(_) | AtlasError::Serialization(_) => true,
        AtlasError::Io(io) => io.kind() == ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// Rename a file that cannot be opened to `<name>.bad`
fn quarantine(path: &Path, cause: &AtlasError) -> Result<()> {
    let mut bad = path.as_os_str().to_owned();
    bad.push(".");
    bad.push(BAD_EXTENSION);
    let bad = PathBuf::from(bad);
    warn!(
        path = %path.display(),
        quarantined_as = %bad.display(),
        error = %cause,
        "quarantining unreadable TSM file"
    );
    fs::rename(path, &bad)?;

    let sidecar = TombstoneLog::path_for(path);
    if sidecar.exists() {
        let mut bad = sidecar.as_os_str().to_owned();
        bad.push(".");
        bad.push(BAD_EXTENSION);
        fs::rename(&sidecar, PathBuf::from(bad))?;
    }
    Ok(())
}
