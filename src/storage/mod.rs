//! Storage Module
//!
//! Persistent storage layer built from immutable TSM files.
//!
//! ## Responsibilities
//! - Compress point columns with per-type codecs (`codec`)
//! - Write, validate and index TSM files (`tsm`)
//! - Track the published file set and answer merged range reads (`file_store`)
//! - Merge sorted point sources with last-write-wins semantics (`merge`)
//!
//! ## Layout
//! ```text
//! {data_dir}/tsm/
//!   ├── 000000001-01-000.tsm         sealed flush output
//!   ├── 000000001-01-000.tombstone   deletes against that file
//!   ├── 000000004-02-000.tsm         level 2 compaction output
//!   ├── 000000007-01-000.tsm.tmp     in progress (removed on open)
//!   └── 000000003-01-000.tsm.bad     quarantined, never read
//! ```

pub mod codec;
pub mod file_store;
pub mod merge;
pub mod tsm;

pub use file_store::{FileSet, FileStore, FileStoreStats, TsmFile};
pub use merge::{CorruptBlocks, MergeIter};
pub use tsm::{FileId, TsmFileMeta, TsmReader, TsmWriter};
