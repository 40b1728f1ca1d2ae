//! WAL Recovery
//!
//! Handles crash recovery by reading every segment in order.
//!
//! A crash can leave the last entries of a segment torn. Recovery keeps the
//! valid prefix of each segment, truncates the rest away and continues with
//! the next segment, so a damaged tail never hides later segments.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;

use super::{list_segments, SegmentInfo, WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries (or unreadable segments) skipped
    pub entries_corrupted: u64,

    /// Last valid LSN, 0 if the log is empty
    pub last_lsn: u64,

    /// Whether any segment was truncated (partial writes removed)
    pub was_truncated: bool,

    /// Segments found, in id order
    pub segments: Vec<SegmentInfo>,
}

impl RecoveryResult {
    /// LSN the next append should use
    pub fn next_lsn(&self) -> u64 {
        self.last_lsn + 1
    }

    /// Id the next segment should use
    pub fn next_segment_id(&self) -> u64 {
        self.segments.last().map(|s| s.id + 1).unwrap_or(1)
    }
}

impl WalRecovery {
    /// Recover entries from the segments in `dir`
    ///
    /// This will:
    /// 1. Read all valid entries of every segment
    /// 2. Detect and skip corrupted entries
    /// 3. Truncate partial writes at the end of each segment
    /// 4. Return all valid entries in LSN order
    pub fn recover(dir: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result) = scan(dir, true)?;
        info!(
            dir = %dir.display(),
            segments = result.segments.len(),
            entries = result.entries_recovered,
            corrupted = result.entries_corrupted,
            last_lsn = result.last_lsn,
            "WAL recovered"
        );
        Ok((entries, result))
    }

    /// Entries of `dir` in LSN order, repairing damaged tails on the way
    pub fn replay(dir: &Path) -> Result<Vec<WalEntry>> {
        Ok(Self::recover(dir)?.0)
    }

    /// Verify integrity of the segments in `dir` without modifying them
    pub fn verify(dir: &Path) -> Result<RecoveryResult> {
        let (_, result) = scan(dir, false)?;
        Ok(result)
    }
}

fn scan(dir: &Path, repair: bool) -> Result<(Vec<WalEntry>, RecoveryResult)> {
    let mut result = RecoveryResult::default();
    let mut entries = Vec::new();

    for (id, path) in list_segments(dir)? {
        let mut info = SegmentInfo {
            id,
            path: path.clone(),
            max_lsn: 0,
            entries: 0,
        };

        let mut reader = match WalReader::open(&path) {
            Ok(reader) => reader,
            Err(e) => {
                // Header never made it to disk; nothing in it is recoverable
                warn!(segment = %path.display(), error = %e, "unreadable WAL segment");
                result.entries_corrupted += 1;
                if repair {
                    OpenOptions::new().write(true).open(&path)?.set_len(0)?;
                    result.was_truncated = true;
                }
                result.segments.push(info);
                continue;
            }
        };

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    if entry.lsn <= result.last_lsn {
                        warn!(
                            segment = %path.display(),
                            lsn = entry.lsn,
                            last_lsn = result.last_lsn,
                            "skipping out-of-order WAL entry"
                        );
                        result.entries_corrupted += 1;
                        continue;
                    }
                    result.last_lsn = entry.lsn;
                    result.entries_recovered += 1;
                    info.max_lsn = entry.lsn;
                    info.entries += 1;
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(e) => {
                    let valid = reader.position();
                    warn!(
                        segment = %path.display(),
                        valid_bytes = valid,
                        error = %e,
                        "WAL segment has a damaged tail"
                    );
                    result.entries_corrupted += 1;
                    if repair {
                        OpenOptions::new().write(true).open(&path)?.set_len(valid)?;
                        result.was_truncated = true;
                    }
                    break;
                }
            }
        }

        debug!(segment = id, entries = info.entries, max_lsn = info.max_lsn, "scanned WAL segment");
        result.segments.push(info);
    }

    Ok((entries, result))
}
