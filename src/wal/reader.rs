//! WAL Reader
//!
//! Reads the entries of one segment in order, stopping at the first entry
//! that is torn or fails its checksum.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};

use super::entry::{parse_header, HEADER_SIZE};
use super::{decode_segment_header, WalEntry, SEGMENT_HEADER_SIZE};

/// Reads entries from a WAL segment
pub struct WalReader {
    path: PathBuf,
    reader: BufReader<File>,
    segment_id: u64,
    /// Offset just past the last entry read successfully
    position: u64,
}

impl WalReader {
    /// Open a segment and validate its header
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        read_full(&mut reader, &mut header).and_then(|n| {
            if n < SEGMENT_HEADER_SIZE {
                Err(AtlasError::Corruption(format!(
                    "{}: segment header truncated at {} bytes",
                    path.display(),
                    n
                )))
            } else {
                Ok(())
            }
        })?;
        let segment_id = decode_segment_header(&header)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            segment_id,
            position: SEGMENT_HEADER_SIZE as u64,
        })
    }

    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset where the next entry starts
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next entry from the segment
    ///
    /// Returns `Ok(None)` at a clean end of file and `Corruption` for a torn
    /// or damaged entry. The position is not advanced past a bad entry.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                return Err(AtlasError::Corruption(format!(
                    "torn entry header at offset {} ({} of {} bytes)",
                    self.position, n, HEADER_SIZE
                )))
            }
            _ => {}
        }
        let (lsn, crc, len) = parse_header(&header)?;

        let mut payload = vec![0u8; len];
        let n = read_full(&mut self.reader, &mut payload)?;
        if n < len {
            return Err(AtlasError::Corruption(format!(
                "torn entry {} at offset {} ({} of {} payload bytes)",
                lsn, self.position, n, len
            )));
        }
        let entry = WalEntry::from_payload(lsn, crc, &payload)?;
        self.position += (HEADER_SIZE + len) as u64;
        Ok(Some(entry))
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries; yields at most one error, then stops
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill as much of `buf` as the file holds; returns the bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
