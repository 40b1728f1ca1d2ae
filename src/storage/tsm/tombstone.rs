//! Tombstones
//!
//! Deletes never rewrite a sealed file. Each TSM file gets an append-only
//! sidecar log of `(predicate, range)` records; readers filter matching points
//! and compaction drops them for good.
//!
//! ## Sidecar Format
//! ```text
//! [Len: u32][CRC: u32][bincode(Tombstone)] ...
//! ```
//! A torn record at the tail (crash mid-append) is cut off on load. A damaged
//! record with valid records after it fails the load with `Corruption`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AtlasError, Result};
use crate::point::TimeRange;
use crate::series::{Predicate, SeriesKey};

use super::TOMBSTONE_EXTENSION;

/// A logical delete of the points of matching series within a range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub predicate: Predicate,
    pub range: TimeRange,
}

impl Tombstone {
    pub fn new(predicate: Predicate, range: TimeRange) -> Self {
        Self { predicate, range }
    }

    pub fn deletes(&self, key: &SeriesKey, ts: i64) -> bool {
        self.range.contains(ts) && self.predicate.matches(key)
    }
}

/// The tombstone sidecar of one TSM file
pub struct TombstoneLog {
    path: PathBuf,
    entries: RwLock<Vec<Tombstone>>,
    append_lock: Mutex<()>,
}

impl TombstoneLog {
    /// Sidecar path for a TSM file: same stem, `.tombstone` extension
    pub fn path_for(tsm_path: &Path) -> PathBuf {
        tsm_path.with_extension(TOMBSTONE_EXTENSION)
    }

    /// Load the sidecar of `tsm_path`, if any
    pub fn open(tsm_path: &Path) -> Result<Self> {
        let path = Self::path_for(tsm_path);
        let entries = if path.exists() {
            load(&path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            append_lock: Mutex::new(()),
        })
    }

    /// Durably record a tombstone, then make it visible to readers
    pub fn add(&self, tombstone: Tombstone) -> Result<()> {
        let _guard = self.append_lock.lock();
        let payload = bincode::serialize(&tombstone)?;
        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&frame)?;
        file.sync_all()?;

        self.entries.write().push(tombstone);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn contains(&self, tombstone: &Tombstone) -> bool {
        self.entries.read().contains(tombstone)
    }

    pub fn entries(&self) -> Vec<Tombstone> {
        self.entries.read().clone()
    }

    /// Deleted ranges that apply to `key`
    pub fn ranges_for(&self, key: &SeriesKey) -> Vec<TimeRange> {
        self.entries
            .read()
            .iter()
            .filter(|t| t.predicate.matches(key))
            .map(|t| t.range)
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the sidecar file
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn load(path: &Path) -> Result<Vec<Tombstone>> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;

    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos < raw.len() {
        match read_record(&raw[pos..]) {
            Record::Valid(tombstone, used) => {
                entries.push(tombstone);
                pos += used;
            }
            Record::Damaged(used) if pos + used < raw.len() => {
                return Err(AtlasError::Corruption(format!(
                    "{}: damaged tombstone record at byte {} of {}",
                    path.display(),
                    pos,
                    raw.len()
                )));
            }
            Record::Torn | Record::Damaged(_) => {
                warn!(
                    path = %path.display(),
                    valid_bytes = pos,
                    total_bytes = raw.len(),
                    "truncating torn tombstone record"
                );
                OpenOptions::new().write(true).open(path)?.set_len(pos as u64)?;
                break;
            }
        }
    }
    Ok(entries)
}

enum Record {
    Valid(Tombstone, usize),
    /// Runs past the end of the file
    Torn,
    /// Complete but fails its checksum or decoding; holds the record size
    Damaged(usize),
}

fn read_record(buf: &[u8]) -> Record {
    let header = match buf.get(0..8) {
        Some(header) => header,
        None => return Record::Torn,
    };
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let payload = match 8usize.checked_add(len).and_then(|end| buf.get(8..end)) {
        Some(payload) => payload,
        None => return Record::Torn,
    };
    if crc32fast::hash(payload) != crc {
        return Record::Damaged(8 + len);
    }
    match bincode::deserialize(payload) {
        Ok(tombstone) => Record::Valid(tombstone, 8 + len),
        Err(_) => Record::Damaged(8 + len),
    }
}
