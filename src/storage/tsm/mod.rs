//! TSM Module
//!
//! Time-Structured Merge files: immutable, compressed, indexed containers of
//! per-series point blocks.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (5 bytes)                                            │
//! │   Magic: "ATSM" (4) | Version: u8 (1)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Blocks (variable)                                           │
//! │   [Type: u8][Count: u32][TsLen: u32][Ts][Values][CRC: u32]  │
//! │   ... grouped by series key, time ordered within a key ...  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Index (variable, keys ascending)                            │
//! │   [KeyLen: u16][Key][Type: u8][Count: u32]                  │
//! │   Count × [MinTime: i64][MaxTime: i64][Offset: u64][Size: u32]
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (33 bytes)                                           │
//! │   IndexOffset: u64 | IndexLen: u64 | IndexCRC: u32          │
//! │   MaxSequence: u64 | Magic (4) | Version: u8                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `MaxSequence` is the highest WAL sequence
//! number whose data is contained in the file; the WAL may be retired up to
//! the maximum of this value across the published files.
//!
//! ## File Names
//! `{generation:09}-{level:02}-{part:03}.tsm`, built as `<name>.tmp` and
//! renamed once sealed. Deletes live beside the file as `<stem>.tombstone`.

mod block;
mod reader;
mod tombstone;
mod writer;

use std::fmt;
use std::path::Path;

pub use block::{decode_block, encode_block};
pub use reader::TsmReader;
pub use tombstone::{Tombstone, TombstoneLog};
pub use writer::{TsmFileMeta, TsmWriter};
pub(crate) use writer::sync_dir;

use crate::point::ValueType;
use crate::series::SeriesKey;

// =============================================================================
// Shared Constants (used by writer, reader, file store)
// =============================================================================

/// Magic bytes identifying an AtlasTS TSM file
pub(crate) const MAGIC: &[u8; 4] = b"ATSM";

/// Current TSM format version
pub(crate) const VERSION: u8 = 1;

/// Header size: Magic (4) + Version (1)
pub(crate) const HEADER_SIZE: u64 = 5;

/// Footer size: IndexOffset (8) + IndexLen (8) + IndexCRC (4) + MaxSequence (8)
/// + Magic (4) + Version (1)
pub(crate) const FOOTER_SIZE: u64 = 33;

/// Block framing: Type (1) + Count (4) + TsLen (4) + CRC (4)
pub(crate) const BLOCK_OVERHEAD: usize = 13;

/// Bytes per index entry: MinTime (8) + MaxTime (8) + Offset (8) + Size (4)
pub(crate) const INDEX_ENTRY_SIZE: usize = 28;

pub const TSM_EXTENSION: &str = "tsm";
pub const TMP_EXTENSION: &str = "tmp";
pub const BAD_EXTENSION: &str = "bad";
pub const TOMBSTONE_EXTENSION: &str = "tombstone";

// =============================================================================
// File Identity
// =============================================================================

/// Identity of a TSM file, ordered by generation then level then part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
    /// Recency: a higher generation holds newer data
    pub generation: u64,
    /// Compaction depth: 1 for flushes, up to 4 for full compactions
    pub level: u8,
    /// Distinguishes the outputs of one compaction
    pub part: u16,
}

impl FileId {
    pub fn new(generation: u64, level: u8, part: u16) -> Self {
        Self {
            generation,
            level,
            part,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{:09}-{:02}-{:03}.{}",
            self.generation, self.level, self.part, TSM_EXTENSION
        )
    }

    /// "000000042-02-001.tsm" → generation 42, level 2, part 1
    pub fn parse(path: &Path) -> Option<Self> {
        if path.extension()? != TSM_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let mut parts = stem.split('-');
        let generation = parts.next()?.parse().ok()?;
        let level = parts.next()?.parse().ok()?;
        let part = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(generation, level, part))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:09}-{:02}-{:03}", self.generation, self.level, self.part)
    }
}

// =============================================================================
// Index Types
// =============================================================================

/// Location and time span of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub min_time: i64,
    pub max_time: i64,
    pub offset: u64,
    pub size: u32,
}

/// All blocks of one series in a file, time ordered
#[derive(Debug, Clone)]
pub struct KeyIndex {
    pub key: SeriesKey,
    pub value_type: ValueType,
    pub entries: Vec<IndexEntry>,
}

impl KeyIndex {
    pub fn min_time(&self) -> i64 {
        self.entries.first().map(|e| e.min_time).unwrap_or(i64::MAX)
    }

    pub fn max_time(&self) -> i64 {
        self.entries.last().map(|e| e.max_time).unwrap_or(i64::MIN)
    }
}
