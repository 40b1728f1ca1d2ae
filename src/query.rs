//! Query results
//!
//! A query returns one cursor per matching series. Each cursor owns a copy
//! of the cached points and a fixed set of block plans taken when the query
//! started, so it keeps answering the same way while flushes, compactions
//! and deletes go on. Cursors can be iterated any number of times.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::error::Result;
use crate::point::{Point, TimeRange};
use crate::series::SeriesKey;
use crate::storage::merge::{BlockPlan, BlockStream, Source, CACHE_PRIORITY};
use crate::storage::{CorruptBlocks, MergeIter};

/// Restartable view of one series within a time range
pub struct SeriesCursor {
    key: SeriesKey,
    range: TimeRange,
    cached: Arc<Vec<Point>>,
    plans: Vec<BlockPlan>,
    corrupt_blocks: Arc<AtomicU64>,
}

impl SeriesCursor {
    pub(crate) fn new(
        key: SeriesKey,
        range: TimeRange,
        cached: Vec<Point>,
        plans: Vec<BlockPlan>,
        corrupt_blocks: Arc<AtomicU64>,
    ) -> Self {
        Self {
            key,
            range,
            cached: Arc::new(cached),
            plans,
            corrupt_blocks,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Number of TSM files contributing to this cursor
    pub fn file_count(&self) -> usize {
        self.plans.len()
    }

    /// Ascending points, last write wins per timestamp
    ///
    /// Corrupt blocks are skipped and counted; an I/O error ends the
    /// iteration early and is reported by [`MergeIter::take_error`].
    pub fn iter(&self) -> MergeIter {
        let mut sources = Vec::with_capacity(self.plans.len() + 1);
        for plan in &self.plans {
            let stream = BlockStream::new(
                plan.clone(),
                self.key.clone(),
                self.range,
                Arc::clone(&self.corrupt_blocks),
                CorruptBlocks::Skip,
            );
            sources.push((plan.priority, Source::Blocks(stream)));
        }
        if !self.cached.is_empty() {
            sources.push((
                CACHE_PRIORITY,
                Source::Memory {
                    points: Arc::clone(&self.cached),
                    pos: 0,
                },
            ));
        }
        MergeIter::new(sources)
    }

    /// All points, or the error that cut iteration short
    pub fn collect_points(&self) -> Result<Vec<Point>> {
        self.iter().collect_points()
    }
}

/// Cursors of every series matched by a query, in key order
#[derive(Default)]
pub struct QueryResult {
    cursors: Vec<SeriesCursor>,
}

impl QueryResult {
    pub(crate) fn new(cursors: Vec<SeriesCursor>) -> Self {
        Self { cursors }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.cursors.iter().map(|c| c.key())
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&SeriesCursor> {
        self.cursors
            .binary_search_by(|c| c.key().cmp(key))
            .ok()
            .map(|i| &self.cursors[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SeriesCursor> {
        self.cursors.iter()
    }

    /// Total points across all cursors
    pub fn point_count(&self) -> Result<usize> {
        let mut total = 0;
        for cursor in &self.cursors {
            total += cursor.collect_points()?.len();
        }
        Ok(total)
    }
}

impl IntoIterator for QueryResult {
    type Item = SeriesCursor;
    type IntoIter = std::vec::IntoIter<SeriesCursor>;

    fn into_iter(self) -> Self::IntoIter {
        self.cursors.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a SeriesCursor;
    type IntoIter = std::slice::Iter<'a, SeriesCursor>;

    fn into_iter(self) -> Self::IntoIter {
        self.cursors.iter()
    }
}
