//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::point::{Point, TimeRange};
use crate::series::{Predicate, SeriesKey};

/// Entry header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on one entry payload; larger lengths are treated as corruption
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Points for one or more series, already in nanoseconds
    Write { series: Vec<(SeriesKey, Vec<Point>)> },

    /// Remove points of matching series within a range
    Delete { predicate: Predicate, range: TimeRange },
}

impl Operation {
    pub fn point_count(&self) -> usize {
        match self {
            Operation::Write { series } => series.iter().map(|(_, p)| p.len()).sum(),
            Operation::Delete { .. } => 0,
        }
    }
}

/// Borrowed payload, so appends do not clone the operation
#[derive(Serialize)]
struct PayloadRef<'a> {
    timestamp: u64,
    operation: &'a Operation,
}

#[derive(Deserialize)]
struct Payload {
    timestamp: u64,
    operation: Operation,
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self {
            lsn,
            operation,
            timestamp: now_millis(),
        }
    }

    /// Frame as `[LSN][CRC][Len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode_frame(self.lsn, self.timestamp, &self.operation)
    }

    /// Parse and verify one framed entry
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(AtlasError::Corruption(format!(
                "WAL entry of {} bytes is shorter than its header",
                bytes.len()
            )));
        }
        let (lsn, crc, len) = parse_header(&bytes[..HEADER_SIZE])?;
        let payload = bytes.get(HEADER_SIZE..HEADER_SIZE + len).ok_or_else(|| {
            AtlasError::Corruption(format!(
                "WAL entry {} declares {} payload bytes, {} present",
                lsn,
                len,
                bytes.len() - HEADER_SIZE
            ))
        })?;
        Self::from_payload(lsn, crc, payload)
    }

    /// Verify `payload` against `crc` and decode it
    pub(crate) fn from_payload(lsn: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let computed = crc32fast::hash(payload);
        if computed != crc {
            return Err(AtlasError::Corruption(format!(
                "WAL entry {} checksum mismatch: stored {:08x}, computed {:08x}",
                lsn, crc, computed
            )));
        }
        let payload: Payload = bincode::deserialize(payload)
            .map_err(|e| AtlasError::Corruption(format!("WAL entry {} payload: {}", lsn, e)))?;
        Ok(Self {
            lsn,
            operation: payload.operation,
            timestamp: payload.timestamp,
        })
    }

    /// Size of the framed entry in bytes
    pub fn serialized_size(&self) -> Result<usize> {
        let payload = PayloadRef {
            timestamp: self.timestamp,
            operation: &self.operation,
        };
        Ok(HEADER_SIZE + bincode::serialized_size(&payload)? as usize)
    }

    /// CRC32 of the payload
    pub fn compute_crc(&self) -> Result<u32> {
        let payload = bincode::serialize(&PayloadRef {
            timestamp: self.timestamp,
            operation: &self.operation,
        })?;
        Ok(crc32fast::hash(&payload))
    }
}

/// Frame an operation without building a `WalEntry`
pub(crate) fn encode_frame(lsn: u64, timestamp: u64, operation: &Operation) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&PayloadRef {
        timestamp,
        operation,
    })?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(AtlasError::Validation(format!(
            "WAL entry of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&lsn.to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Split a 16 byte header into (lsn, crc, payload length)
pub(crate) fn parse_header(header: &[u8]) -> Result<(u64, u32, usize)> {
    let mut lsn = [0u8; 8];
    let mut crc = [0u8; 4];
    let mut len = [0u8; 4];
    lsn.copy_from_slice(&header[0..8]);
    crc.copy_from_slice(&header[8..12]);
    len.copy_from_slice(&header[12..16]);
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(AtlasError::Corruption(format!("WAL entry length {} is implausible", len)));
    }
    Ok((u64::from_le_bytes(lsn), u32::from_le_bytes(crc), len))
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
