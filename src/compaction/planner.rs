//! Compaction planning
//!
//! Picks input files for a job from a published file set. Plans only ever
//! take runs of files that are adjacent in generation order: an output
//! inherits the newest input generation, so any file left between two inputs
//! would end up ranked below data older than its own.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::storage::{FileId, FileSet, TsmFile};

/// Level of flush output
pub const FLUSH_LEVEL: u8 = 1;

/// Highest level reached by level compactions
pub const MAX_LEVEL: u8 = 3;

/// Level of full compaction output
pub const FULL_LEVEL: u8 = 4;

/// What a job does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Write the cache snapshot into a new level-1 file
    Flush,
    /// Merge a run of level-N files into level N+1
    Level(u8),
    /// Merge everything into level 4, dropping deleted data
    Full,
}

impl JobKind {
    pub fn output_level(self) -> u8 {
        match self {
            JobKind::Flush => FLUSH_LEVEL,
            JobKind::Level(n) => n + 1,
            JobKind::Full => FULL_LEVEL,
        }
    }
}

/// A planned merge of existing files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionJob {
    pub kind: JobKind,
    /// Inputs, oldest first
    pub inputs: Vec<FileId>,
    /// Id of the first output; further outputs take the following parts
    pub output: FileId,
}

/// Limits that shape plans
#[derive(Debug, Clone, Copy)]
pub struct PlannerOptions {
    pub level_file_threshold: usize,
    pub max_file_size: u64,
    pub max_input_files: usize,
}

impl PlannerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            level_file_threshold: config.level_file_threshold,
            max_file_size: config.max_file_size,
            max_input_files: config.max_compaction_input_files,
        }
    }
}

/// Plan a compaction of level-`level` files, if a run qualifies
///
/// A run qualifies once it holds `level_file_threshold` files or its files
/// together exceed `max_file_size`. Files in `skip` break runs.
pub fn plan_level(
    set: &FileSet,
    level: u8,
    options: &PlannerOptions,
    skip: &HashSet<FileId>,
) -> Option<CompactionJob> {
    if !(FLUSH_LEVEL..MAX_LEVEL).contains(&level) {
        return None;
    }
    for run in runs(set, skip, |f| f.level() == level) {
        let run: Vec<&Arc<TsmFile>> = run.into_iter().take(options.max_input_files.max(2)).collect();
        let total: u64 = run.iter().map(|f| f.size()).sum();
        let by_count = run.len() >= options.level_file_threshold.max(2);
        let by_size = run.len() >= 2 && total > options.max_file_size;
        if by_count || by_size {
            if let Some(job) = make_job(set, JobKind::Level(level), &run) {
                return Some(job);
            }
        }
    }
    None
}

/// Plan a full compaction of the longest run of files not in `skip`
///
/// Returns None when there is nothing to gain: level-4 files without
/// tombstones (the parts of an earlier full compaction) are left alone.
pub fn plan_full(set: &FileSet, options: &PlannerOptions, skip: &HashSet<FileId>) -> Option<CompactionJob> {
    let run = runs(set, skip, |_| true)
        .into_iter()
        .max_by_key(|run| run.len())?;
    let run: Vec<&Arc<TsmFile>> = run.into_iter().take(options.max_input_files.max(2)).collect();
    if run
        .iter()
        .all(|f| f.level() == FULL_LEVEL && f.tombstones().is_empty())
    {
        return None;
    }
    make_job(set, JobKind::Full, &run)
}

/// First output id for a job writing `level` at `generation`
///
/// Parts continue after any file already holding that generation and level,
/// so an output never takes the name of a live file.
pub fn output_id(set: &FileSet, generation: u64, level: u8) -> FileId {
    let part = set
        .iter()
        .map(|f| f.id())
        .filter(|id| id.generation == generation && id.level == level)
        .map(|id| id.part.saturating_add(1))
        .max()
        .unwrap_or(0);
    FileId::new(generation, level, part)
}

/// Maximal runs of adjacent files accepted by `include`, oldest first
fn runs<'a>(
    set: &'a FileSet,
    skip: &HashSet<FileId>,
    include: impl Fn(&TsmFile) -> bool,
) -> Vec<Vec<&'a Arc<TsmFile>>> {
    let mut runs = Vec::new();
    let mut current: Vec<&Arc<TsmFile>> = Vec::new();
    for file in set.iter() {
        if !skip.contains(&file.id()) && include(file.as_ref()) {
            current.push(file);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn make_job(set: &FileSet, kind: JobKind, run: &[&Arc<TsmFile>]) -> Option<CompactionJob> {
    let (first, last) = (run.first()?, run.last()?);
    let generation = run.iter().map(|f| f.id().generation).max()?;
    let output = output_id(set, generation, kind.output_level());

    // The output must land in the slot the run leaves behind
    let older = set.iter().map(|f| f.id()).filter(|id| *id < first.id()).last();
    if older.map_or(false, |older| older >= output) {
        return None;
    }
    let newer = set.iter().map(|f| f.id()).find(|id| *id > last.id());
    if newer.map_or(false, |newer| newer.generation <= generation) {
        return None;
    }

    Some(CompactionJob {
        kind,
        inputs: run.iter().map(|f| f.id()).collect(),
        output,
    })
}
