//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any cache mutation
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Rotate into numbered segments and retire segments already flushed to TSM
//! - Crash recovery and replay
//!
//! ## Segment Format
//! ```text
//! {data_dir}/wal/00000001.wal
//! ┌─────────────────────────────────────────┐
//! │ Magic "ATWL" (4) │ Version (2) │ Id (8) │
//! ├─────────────────────────────────────────┤
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2 ...                             │
//! └─────────────────────────────────────────┘
//! ```
//! Multi-byte integers are little-endian. `Data` is the bincode encoding of
//! the entry timestamp and its [`Operation`].

mod entry;
mod reader;
mod recovery;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};

pub use entry::{Operation, WalEntry, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub(crate) use entry::now_millis;
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::{WalOptions, WalWriter};

/// Segment file magic
pub const SEGMENT_MAGIC: &[u8; 4] = b"ATWL";

/// Segment format version
pub const SEGMENT_VERSION: u16 = 1;

/// Segment header: magic (4) + version (2) + segment id (8)
pub const SEGMENT_HEADER_SIZE: usize = 14;

/// Extension of WAL segment files
pub const SEGMENT_EXTENSION: &str = "wal";

/// What is known about one segment on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub id: u64,
    pub path: PathBuf,
    /// Highest LSN stored in the segment, 0 if it holds no entries
    pub max_lsn: u64,
    pub entries: u64,
}

/// Path of segment `id` inside `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{:08}.{}", id, SEGMENT_EXTENSION))
}

/// Segment id encoded in a file name, if it is a segment
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()? != SEGMENT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// All segment files in `dir`, ordered by id
pub fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();
    if !dir.exists() {
        return Ok(segments);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(id) = parse_segment_id(&path) {
            segments.push((id, path));
        }
    }
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

pub(crate) fn encode_segment_header(id: u64) -> [u8; SEGMENT_HEADER_SIZE] {
    let mut header = [0u8; SEGMENT_HEADER_SIZE];
    header[0..4].copy_from_slice(SEGMENT_MAGIC);
    header[4..6].copy_from_slice(&SEGMENT_VERSION.to_le_bytes());
    header[6..14].copy_from_slice(&id.to_le_bytes());
    header
}

/// Validate a segment header and return its id
pub(crate) fn decode_segment_header(header: &[u8]) -> Result<u64> {
    if header.len() < SEGMENT_HEADER_SIZE {
        return Err(AtlasError::Corruption("WAL segment header truncated".into()));
    }
    if &header[0..4] != SEGMENT_MAGIC {
        return Err(AtlasError::Corruption("bad WAL segment magic".into()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != SEGMENT_VERSION {
        return Err(AtlasError::Corruption(format!(
            "unsupported WAL segment version {}",
            version
        )));
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&header[6..14]);
    Ok(u64::from_le_bytes(id))
}
