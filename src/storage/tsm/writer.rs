//! TSM Writer
//!
//! Streams blocks into a new `.tmp` file, then seals it: index, footer,
//! fsync, rename. An unfinished writer removes its temp file on drop.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;
use tracing::{debug, warn};

use crate::error::{AtlasError, Result};
use crate::point::Point;
use crate::series::SeriesKey;

use super::{
    encode_block, FileId, IndexEntry, KeyIndex, FOOTER_SIZE, HEADER_SIZE, INDEX_ENTRY_SIZE, MAGIC,
    TMP_EXTENSION, VERSION,
};

/// Summary of a sealed TSM file
#[derive(Debug, Clone)]
pub struct TsmFileMeta {
    pub id: FileId,
    pub path: PathBuf,
    pub size: u64,
    pub key_count: usize,
    pub point_count: u64,
    pub max_sequence: u64,
}

/// Builder for one TSM file
pub struct TsmWriter {
    id: FileId,
    dir: PathBuf,
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    /// Current write position (next block offset)
    offset: u64,
    /// One entry per key, in write order (ascending)
    index: Vec<KeyIndex>,
    /// Encoded size of `index`
    index_len: usize,
    max_points_per_block: usize,
    point_count: u64,
    finished: bool,
}

impl TsmWriter {
    /// Create `<dir>/<id>.tsm.tmp` and write the header
    pub fn create(dir: &Path, id: FileId, max_points_per_block: usize) -> Result<Self> {
        let final_path = dir.join(id.file_name());
        let tmp_path = dir.join(format!("{}.{}", id.file_name(), TMP_EXTENSION));

        // Never share a temp file with another writer of the same id
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&[VERSION])?;

        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            final_path,
            tmp_path,
            writer,
            offset: HEADER_SIZE,
            index: Vec::new(),
            index_len: 0,
            max_points_per_block: max_points_per_block.max(1),
            point_count: 0,
            finished: false,
        })
    }

    /// Write all points of one series, split into blocks
    ///
    /// Points must be sorted by timestamp, unique, and of one type.
    pub fn write_series(&mut self, key: &SeriesKey, points: &[Point]) -> Result<()> {
        for chunk in points.chunks(self.max_points_per_block) {
            self.write_block(key, chunk)?;
        }
        Ok(())
    }

    /// Append one block for `key`
    ///
    /// Keys must arrive in ascending order; blocks of the same key must
    /// follow each other in time.
    pub fn write_block(&mut self, key: &SeriesKey, points: &[Point]) -> Result<()> {
        let (first, last) = match (points.first(), points.last()) {
            (Some(f), Some(l)) => (f.timestamp, l.timestamp),
            _ => return Ok(()),
        };
        if points.windows(2).any(|w| w[0].timestamp >= w[1].timestamp) {
            return Err(AtlasError::Storage(format!(
                "points for '{}' are not strictly increasing",
                key
            )));
        }

        let (ty, block) = encode_block(points)?;
        let entry = IndexEntry {
            min_time: first,
            max_time: last,
            offset: self.offset,
            size: block.len() as u32,
        };

        match self.index.last_mut() {
            Some(current) if current.key == *key => {
                if current.value_type != ty {
                    return Err(AtlasError::Validation(format!(
                        "series '{}' mixes {} and {} blocks",
                        key, current.value_type, ty
                    )));
                }
                if current.max_time() >= first {
                    return Err(AtlasError::Storage(format!(
                        "block for '{}' starting at {} overlaps the previous block",
                        key, first
                    )));
                }
                current.entries.push(entry);
                self.index_len += INDEX_ENTRY_SIZE;
            }
            Some(current) if current.key > *key => {
                return Err(AtlasError::Storage(format!(
                    "series '{}' written after '{}'",
                    key, current.key
                )));
            }
            _ => {
                self.index.push(KeyIndex {
                    key: key.clone(),
                    value_type: ty,
                    entries: vec![entry],
                });
                self.index_len += 2 + key.as_bytes().len() + 1 + 4 + INDEX_ENTRY_SIZE;
            }
        }

        self.writer.write_all(&block)?;
        self.offset += block.len() as u64;
        self.point_count += points.len() as u64;
        Ok(())
    }

    /// Bytes written so far, including the pending index
    pub fn size(&self) -> u64 {
        self.offset + self.index_len as u64 + FOOTER_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// Write index and footer, sync, and atomically publish the file name
    pub fn finish(mut self, max_sequence: u64) -> Result<TsmFileMeta> {
        let mut index = Vec::with_capacity(self.index_len);
        for key_index in &self.index {
            let key = key_index.key.as_bytes();
            let key_len = u16::try_from(key.len()).map_err(|_| {
                AtlasError::Validation(format!("series key of {} bytes is too long", key.len()))
            })?;
            index.put_u16_le(key_len);
            index.extend_from_slice(key);
            index.put_u8(key_index.value_type.as_u8());
            index.put_u32_le(key_index.entries.len() as u32);
            for e in &key_index.entries {
                index.put_i64_le(e.min_time);
                index.put_i64_le(e.max_time);
                index.put_u64_le(e.offset);
                index.put_u32_le(e.size);
            }
        }

        let index_offset = self.offset;
        let mut footer = Vec::with_capacity(FOOTER_SIZE as usize);
        footer.put_u64_le(index_offset);
        footer.put_u64_le(index.len() as u64);
        footer.put_u32_le(crc32fast::hash(&index));
        footer.put_u64_le(max_sequence);
        footer.extend_from_slice(MAGIC);
        footer.put_u8(VERSION);

        self.writer.write_all(&index)?;
        self.writer.write_all(&footer)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        fs::rename(&self.tmp_path, &self.final_path)?;
        self.finished = true;
        sync_dir(&self.dir)?;

        let size = index_offset + index.len() as u64 + FOOTER_SIZE;
        debug!(
            file = %self.id,
            size,
            keys = self.index.len(),
            points = self.point_count,
            "sealed TSM file"
        );

        Ok(TsmFileMeta {
            id: self.id,
            path: self.final_path.clone(),
            size,
            key_count: self.index.len(),
            point_count: self.point_count,
            max_sequence,
        })
    }
}

impl Drop for TsmWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                warn!(path = %self.tmp_path.display(), error = %e, "failed to remove abandoned TSM temp file");
            }
        }
    }
}

/// fsync a directory so a rename inside it is durable
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
