//! Compaction execution
//!
//! Streams every series of the inputs through a last-write-wins merge and
//! re-encodes the survivors into new TSM files. Outputs are split at series
//! boundaries once a file grows past `max_file_size`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::cache::CacheSnapshot;
use crate::error::AtlasError;
use crate::point::{Point, TimeRange};
use crate::series::SeriesKey;
use crate::storage::file_store::TsmFile;
use crate::storage::merge::{BlockPlan, Source, CACHE_PRIORITY};
use crate::storage::{CorruptBlocks, FileId, FileStore, MergeIter, TsmFileMeta, TsmWriter};

/// Why a job stopped
#[derive(Debug)]
pub struct JobFailure {
    pub error: AtlasError,
    /// Input whose block failed its checksum, if that is what happened
    pub corrupt_file: Option<FileId>,
}

impl From<AtlasError> for JobFailure {
    fn from(error: AtlasError) -> Self {
        Self {
            error,
            corrupt_file: None,
        }
    }
}

/// What a finished merge produced
#[derive(Debug, Default)]
pub struct MergeOutput {
    pub files: Vec<TsmFileMeta>,
    pub points: u64,
    pub bytes: u64,
}

/// Sizing of merge outputs
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub max_points_per_block: usize,
    pub max_file_size: u64,
}

/// Merge `inputs` (oldest first) and an optional cache snapshot into new files
///
/// Outputs are named from `first_id` upwards by part and carry
/// `max_sequence`. On any failure the outputs written so far are deleted.
pub fn merge_into_files(
    store: &FileStore,
    inputs: &[Arc<TsmFile>],
    snapshot: Option<&CacheSnapshot>,
    first_id: FileId,
    max_sequence: u64,
    options: OutputOptions,
    cancel: &AtomicBool,
) -> Result<MergeOutput, JobFailure> {
    let mut output = Outputs::new(store.dir(), first_id, max_sequence, options);
    match merge_all(store, inputs, snapshot, &mut output, cancel) {
        Ok(()) => output.finish().map_err(JobFailure::from),
        Err(failure) => {
            output.discard();
            Err(failure)
        }
    }
}

fn merge_all(
    store: &FileStore,
    inputs: &[Arc<TsmFile>],
    snapshot: Option<&CacheSnapshot>,
    output: &mut Outputs,
    cancel: &AtomicBool,
) -> Result<(), JobFailure> {
    let mut keys: BTreeSet<&SeriesKey> = BTreeSet::new();
    for file in inputs {
        keys.extend(file.reader().keys());
    }
    if let Some(snapshot) = snapshot {
        keys.extend(snapshot.keys());
    }

    let range = TimeRange::all();
    let mut block = Vec::with_capacity(output.options.max_points_per_block);

    for key in keys {
        let mut sources = Vec::with_capacity(inputs.len() + 1);
        for (rank, file) in inputs.iter().enumerate() {
            if let Some(plan) = BlockPlan::new(file, rank as u64, key, range) {
                let stream = store.stream(plan, key, range, CorruptBlocks::Fail);
                sources.push((rank as u64, Source::Blocks(stream)));
            }
        }
        if let Some(entry) = snapshot.and_then(|s| s.get(key)) {
            sources.push((
                CACHE_PRIORITY,
                Source::Memory {
                    points: Arc::clone(&entry.points),
                    pos: 0,
                },
            ));
        }

        let mut merged = MergeIter::new(sources);
        for point in merged.by_ref() {
            block.push(point);
            if block.len() == output.options.max_points_per_block {
                output.write_block(key, &block)?;
                block.clear();
                check_cancel(cancel)?;
            }
        }
        if let Some(error) = merged.take_error() {
            return Err(JobFailure {
                corrupt_file: match error {
                    AtlasError::Corruption(_) => merged.failed_file(),
                    _ => None,
                },
                error,
            });
        }
        if !block.is_empty() {
            output.write_block(key, &block)?;
            block.clear();
            check_cancel(cancel)?;
        }
        output.end_series()?;
    }
    Ok(())
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), JobFailure> {
    if cancel.load(Ordering::Acquire) {
        return Err(AtlasError::Aborted.into());
    }
    Ok(())
}

/// The files a merge is writing, rolled over at series boundaries
struct Outputs {
    dir: std::path::PathBuf,
    next_id: FileId,
    max_sequence: u64,
    options: OutputOptions,
    current: Option<TsmWriter>,
    done: MergeOutput,
}

impl Outputs {
    fn new(dir: &Path, first_id: FileId, max_sequence: u64, options: OutputOptions) -> Self {
        Self {
            dir: dir.to_path_buf(),
            next_id: first_id,
            max_sequence,
            options,
            current: None,
            done: MergeOutput::default(),
        }
    }

    fn write_block(&mut self, key: &SeriesKey, points: &[Point]) -> crate::error::Result<()> {
        if self.current.is_none() {
            let id = self.next_id;
            self.next_id = FileId::new(id.generation, id.level, id.part.saturating_add(1));
            self.current = Some(TsmWriter::create(&self.dir, id, self.options.max_points_per_block)?);
        }
        if let Some(writer) = self.current.as_mut() {
            writer.write_block(key, points)?;
        }
        self.done.points += points.len() as u64;
        Ok(())
    }

    /// Roll over to a new file if the current one is full
    fn end_series(&mut self) -> crate::error::Result<()> {
        if self
            .current
            .as_ref()
            .map_or(false, |w| w.size() >= self.options.max_file_size)
        {
            self.seal()?;
        }
        Ok(())
    }

    fn seal(&mut self) -> crate::error::Result<()> {
        if let Some(writer) = self.current.take() {
            if writer.is_empty() {
                return Ok(());
            }
            let meta = writer.finish(self.max_sequence)?;
            self.done.bytes += meta.size;
            self.done.files.push(meta);
        }
        Ok(())
    }

    fn finish(mut self) -> crate::error::Result<MergeOutput> {
        if let Err(e) = self.seal() {
            self.discard();
            return Err(e);
        }
        Ok(std::mem::take(&mut self.done))
    }

    /// Remove sealed outputs; an unfinished writer cleans up on drop
    fn discard(&mut self) {
        self.current = None;
        for meta in self.done.files.drain(..) {
            if let Err(e) = fs::remove_file(&meta.path) {
                warn!(file = %meta.id, error = %e, "failed to remove discarded compaction output");
            }
        }
    }
}
