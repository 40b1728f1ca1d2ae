//! Merged Point Iteration
//!
//! Reads of one series combine several time-ordered sources: the cache copy
//! and one block stream per overlapping TSM file. A min-heap keyed on
//! timestamp merges them lazily; when sources collide on a timestamp the one
//! with the highest priority (newest) wins and the rest are dropped.
//!
//! Blocks are decoded only when the merge reaches them. Deleted ranges are
//! captured when a read starts, so a stream never observes later deletes.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::error;

use crate::error::{AtlasError, Result};
use crate::point::{Point, TimeRange};
use crate::series::SeriesKey;

use super::file_store::TsmFile;
use super::tsm::{FileId, IndexEntry};

/// Priority of cache data: above every file
pub const CACHE_PRIORITY: u64 = u64::MAX;

/// What a block stream does with a block that fails its checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptBlocks {
    /// Log, count and continue with the next block (queries)
    Skip,
    /// Stop with `AtlasError::Corruption` (compaction)
    Fail,
}

// =============================================================================
// Block Plans
// =============================================================================

/// The blocks of one file a read will visit, fixed when the read starts
#[derive(Clone)]
pub struct BlockPlan {
    pub file: Arc<TsmFile>,
    pub priority: u64,
    pub entries: Vec<IndexEntry>,
    /// Ranges tombstoned for this key at plan time
    pub deleted: Vec<TimeRange>,
}

impl BlockPlan {
    /// Plan a read of `key` within `range` from `file`, or None if nothing overlaps
    pub fn new(file: &Arc<TsmFile>, priority: u64, key: &SeriesKey, range: TimeRange) -> Option<Self> {
        let entries = file.reader().entries(key, range);
        if entries.is_empty() {
            return None;
        }
        let deleted = file.tombstones().ranges_for(key);
        // Skip files whose overlapping span is wholly deleted
        if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
            let span_min = first.min_time.max(range.min);
            let span_max = last.max_time.min(range.max);
            if deleted.iter().any(|d| d.covers(span_min, span_max)) {
                return None;
            }
        }
        Some(Self {
            file: Arc::clone(file),
            priority,
            entries,
            deleted,
        })
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Lazily decodes the planned blocks of one file
pub struct BlockStream {
    plan: BlockPlan,
    key: SeriesKey,
    range: TimeRange,
    next_block: usize,
    current: std::vec::IntoIter<Point>,
    corrupt_blocks: Arc<AtomicU64>,
    policy: CorruptBlocks,
    error: Option<AtlasError>,
}

impl BlockStream {
    pub fn new(
        plan: BlockPlan,
        key: SeriesKey,
        range: TimeRange,
        corrupt_blocks: Arc<AtomicU64>,
        policy: CorruptBlocks,
    ) -> Self {
        Self {
            plan,
            key,
            range,
            next_block: 0,
            current: Vec::new().into_iter(),
            corrupt_blocks,
            policy,
            error: None,
        }
    }

    pub fn file_id(&self) -> FileId {
        self.plan.file.id()
    }

    fn is_live(&self, ts: i64) -> bool {
        self.range.contains(ts) && !self.plan.deleted.iter().any(|d| d.contains(ts))
    }

    /// Decode the next block into `current`; false when exhausted or failed
    fn load_next_block(&mut self) -> bool {
        while let Some(entry) = self.plan.entries.get(self.next_block).copied() {
            self.next_block += 1;
            match self.plan.file.reader().decode(&entry) {
                Ok(points) => {
                    self.current = points.into_iter();
                    return true;
                }
                Err(AtlasError::Corruption(msg)) if self.policy == CorruptBlocks::Skip => {
                    self.corrupt_blocks.fetch_add(1, Ordering::Relaxed);
                    error!(
                        file = %self.plan.file.id(),
                        key = %self.key,
                        offset = entry.offset,
                        error = %msg,
                        "skipping corrupt block"
                    );
                }
                Err(e) => {
                    self.error = Some(match e {
                        AtlasError::Corruption(msg) => AtlasError::Corruption(format!(
                            "{} block at {} for '{}': {}",
                            self.plan.file.id(),
                            entry.offset,
                            self.key,
                            msg
                        )),
                        other => other,
                    });
                    return false;
                }
            }
        }
        false
    }

    fn take_error(&mut self) -> Option<AtlasError> {
        self.error.take()
    }
}

impl Iterator for BlockStream {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        loop {
            while let Some(p) = self.current.next() {
                if self.is_live(p.timestamp) {
                    return Some(p);
                }
                if p.timestamp > self.range.max {
                    self.next_block = self.plan.entries.len();
                    return None;
                }
            }
            if !self.load_next_block() {
                return None;
            }
        }
    }
}

/// One input of a merge
pub enum Source {
    /// Sorted, deduplicated points held in memory
    Memory { points: Arc<Vec<Point>>, pos: usize },
    Blocks(BlockStream),
}

impl Source {
    fn next_point(&mut self) -> Option<Point> {
        match self {
            Source::Memory { points, pos } => {
                let p = points.get(*pos).cloned();
                *pos += 1;
                p
            }
            Source::Blocks(stream) => stream.next(),
        }
    }
}

// =============================================================================
// Merge Iterator
// =============================================================================

struct HeapEntry {
    point: Point,
    priority: u64,
    source_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    /// Max-heap order: earliest timestamp first, then highest priority
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .point
            .timestamp
            .cmp(&self.point.timestamp)
            .then(self.priority.cmp(&other.priority))
    }
}

/// Ascending, last-write-wins merge of several sources
///
/// Stops early if a source fails; the error is available through
/// [`take_error`](Self::take_error).
pub struct MergeIter {
    heap: BinaryHeap<HeapEntry>,
    sources: Vec<(u64, Source)>,
    error: Option<AtlasError>,
    failed_file: Option<FileId>,
}

impl MergeIter {
    /// Sources are `(priority, source)`; priorities must be distinct
    pub fn new(sources: Vec<(u64, Source)>) -> Self {
        let mut iter = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            error: None,
            failed_file: None,
        };
        for idx in 0..iter.sources.len() {
            iter.advance_source(idx);
        }
        iter
    }

    /// Takes the error that stopped iteration, if any
    pub fn take_error(&mut self) -> Option<AtlasError> {
        self.error.take()
    }

    /// The file whose stream failed, if the error came from one
    pub fn failed_file(&self) -> Option<FileId> {
        self.failed_file
    }

    /// Drain the iterator, surfacing a stream error
    pub fn collect_points(mut self) -> Result<Vec<Point>> {
        let points: Vec<Point> = self.by_ref().collect();
        match self.take_error() {
            Some(e) => Err(e),
            None => Ok(points),
        }
    }

    fn advance_source(&mut self, source_idx: usize) {
        let (priority, source) = &mut self.sources[source_idx];
        match source.next_point() {
            Some(point) => self.heap.push(HeapEntry {
                point,
                priority: *priority,
                source_idx,
            }),
            None => {
                if let Source::Blocks(stream) = source {
                    if let Some(e) = stream.take_error() {
                        self.failed_file = Some(stream.file_id());
                        self.error = Some(e);
                    }
                }
            }
        }
    }
}

impl Iterator for MergeIter {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.error.is_some() {
            return None;
        }
        let top = self.heap.pop()?;
        // Older versions of the same timestamp lose
        while let Some(shadowed) = self.heap.peek() {
            if shadowed.point.timestamp != top.point.timestamp {
                break;
            }
            let idx = shadowed.source_idx;
            self.heap.pop();
            self.advance_source(idx);
        }
        self.advance_source(top.source_idx);
        if self.error.is_some() {
            return None;
        }
        Some(top.point)
    }
}
