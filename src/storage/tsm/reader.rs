//! TSM Reader
//!
//! Opens sealed TSM files, validates them, and keeps the whole index in
//! memory for binary search. Blocks are read and decoded on demand.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{AtlasError, Result};
use crate::point::{Point, TimeRange, ValueType};
use crate::series::SeriesKey;

use super::{
    decode_block, FileId, IndexEntry, KeyIndex, BLOCK_OVERHEAD, FOOTER_SIZE, HEADER_SIZE,
    INDEX_ENTRY_SIZE, MAGIC, VERSION,
};

/// Reader for one sealed TSM file
pub struct TsmReader {
    id: FileId,
    path: PathBuf,
    /// Shared handle; seeks are serialized
    file: Mutex<File>,
    /// Per-key block lists, sorted by key
    index: Vec<KeyIndex>,
    size: u64,
    max_sequence: u64,
}

impl TsmReader {
    /// Open and validate a TSM file
    ///
    /// Fails with `AtlasError::Corruption` when the header, footer or index
    /// checksum do not line up.
    pub fn open(path: &Path) -> Result<Self> {
        let id = FileId::parse(path).ok_or_else(|| {
            AtlasError::Storage(format!("not a TSM file name: {}", path.display()))
        })?;
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE + FOOTER_SIZE {
            return Err(AtlasError::Corruption(format!(
                "{}: {} bytes is shorter than header and footer",
                path.display(),
                size
            )));
        }

        // Header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC || header[4] != VERSION {
            return Err(AtlasError::Corruption(format!(
                "{}: bad header magic {:?} version {}",
                path.display(),
                &header[0..4],
                header[4]
            )));
        }

        // Footer
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let mut f = Cursor::new(&footer);
        let index_offset = f.u64()?;
        let index_len = f.u64()?;
        let index_crc = f.u32()?;
        let max_sequence = f.u64()?;
        let magic = f.take(4)?;
        let version = f.u8()?;
        if magic != MAGIC || version != VERSION {
            return Err(AtlasError::Corruption(format!(
                "{}: bad footer magic or version",
                path.display()
            )));
        }
        if index_offset < HEADER_SIZE
            || index_offset.checked_add(index_len).and_then(|n| n.checked_add(FOOTER_SIZE))
                != Some(size)
        {
            return Err(AtlasError::Corruption(format!(
                "{}: index at {} (+{}) does not fit a {} byte file",
                path.display(),
                index_offset,
                index_len,
                size
            )));
        }

        // Index
        file.seek(SeekFrom::Start(index_offset))?;
        let mut raw = vec![0u8; index_len as usize];
        file.read_exact(&mut raw)?;
        let computed = crc32fast::hash(&raw);
        if computed != index_crc {
            return Err(AtlasError::Corruption(format!(
                "{}: index checksum mismatch: stored {:08x}, computed {:08x}",
                path.display(),
                index_crc,
                computed
            )));
        }
        let index = parse_index(&raw, index_offset)
            .map_err(|e| AtlasError::Corruption(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            size,
            max_sequence,
        })
    }

    // =========================================================================
    // Index Lookups
    // =========================================================================

    pub fn key_index(&self, key: &SeriesKey) -> Option<&KeyIndex> {
        self.index
            .binary_search_by(|k| k.key.cmp(key))
            .ok()
            .map(|i| &self.index[i])
    }

    pub fn contains(&self, key: &SeriesKey) -> bool {
        self.key_index(key).is_some()
    }

    pub fn value_type(&self, key: &SeriesKey) -> Option<ValueType> {
        self.key_index(key).map(|k| k.value_type)
    }

    /// Blocks of `key` overlapping `range`, in time order
    pub fn entries(&self, key: &SeriesKey, range: TimeRange) -> Vec<IndexEntry> {
        let Some(ki) = self.key_index(key) else {
            return Vec::new();
        };
        // Blocks are time ordered and disjoint: skip those ending before range.min
        let start = ki.entries.partition_point(|e| e.max_time < range.min);
        ki.entries[start..]
            .iter()
            .take_while(|e| e.min_time <= range.max)
            .copied()
            .collect()
    }

    /// Every key index, ascending
    pub fn index(&self) -> &[KeyIndex] {
        &self.index
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.index.iter().map(|k| &k.key)
    }

    // =========================================================================
    // Block Access
    // =========================================================================

    /// Read the raw bytes of one block
    pub fn read_block(&self, entry: &IndexEntry) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; entry.size as usize];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(entry.offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read, verify and decode one block
    pub fn decode(&self, entry: &IndexEntry) -> Result<Vec<Point>> {
        let buf = self.read_block(entry)?;
        let (_, points) = decode_block(&buf)?;
        Ok(points)
    }

    /// Decode every block, returning the blocks that fail
    pub fn verify(&self) -> Vec<(SeriesKey, IndexEntry, AtlasError)> {
        let mut bad = Vec::new();
        for ki in &self.index {
            for entry in &ki.entries {
                if let Err(e) = self.decode(entry) {
                    bad.push((ki.key.clone(), *entry, e));
                }
            }
        }
        bad
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Highest WAL sequence number contained in this file
    pub fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    pub fn block_count(&self) -> usize {
        self.index.iter().map(|k| k.entries.len()).sum()
    }

    /// Overall time span, or None for an empty file
    pub fn time_range(&self) -> Option<TimeRange> {
        let min = self.index.iter().map(|k| k.min_time()).min()?;
        let max = self.index.iter().map(|k| k.max_time()).max()?;
        Some(TimeRange::new(min, max))
    }
}

// =============================================================================
// Index Parsing
// =============================================================================

fn parse_index(raw: &[u8], index_offset: u64) -> std::result::Result<Vec<KeyIndex>, String> {
    let mut c = Cursor::new(raw);
    let mut index: Vec<KeyIndex> = Vec::new();
    while !c.is_done() {
        let key_len = c.u16().map_err(|e| e.to_string())? as usize;
        let key_bytes = c.take(key_len).map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(key_bytes)
            .map_err(|e| format!("index key is not utf-8: {}", e))?
            .to_string();
        let key = SeriesKey::from_canonical(key);
        if let Some(prev) = index.last() {
            if prev.key >= key {
                return Err(format!("index keys out of order at '{}'", key));
            }
        }
        let value_type = ValueType::try_from(c.u8().map_err(|e| e.to_string())?)
            .map_err(|e| e.to_string())?;
        let count = c.u32().map_err(|e| e.to_string())? as usize;
        if count == 0 || count.saturating_mul(INDEX_ENTRY_SIZE) > c.remaining() {
            return Err(format!("index for '{}' declares {} blocks", key, count));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = IndexEntry {
                min_time: c.i64().map_err(|e| e.to_string())?,
                max_time: c.i64().map_err(|e| e.to_string())?,
                offset: c.u64().map_err(|e| e.to_string())?,
                size: c.u32().map_err(|e| e.to_string())?,
            };
            if entry.offset < HEADER_SIZE
                || (entry.size as usize) < BLOCK_OVERHEAD
                || entry.offset.saturating_add(u64::from(entry.size)) > index_offset
                || entry.min_time > entry.max_time
            {
                return Err(format!("index entry for '{}' out of bounds: {:?}", key, entry));
            }
            entries.push(entry);
        }
        index.push(KeyIndex {
            key,
            value_type,
            entries,
        });
    }
    Ok(index)
}

/// Little-endian field reader over a byte slice
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len()).ok_or_else(|| {
            AtlasError::Corruption(format!("unexpected end of data at byte {}", self.pos))
        })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
