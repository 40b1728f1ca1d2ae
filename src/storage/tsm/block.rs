//! TSM Block encoding
//!
//! A block is one series' run of points, compressed column-wise.

use bytes::BufMut;

use crate::error::{AtlasError, Result};
use crate::point::{batch_type, Point, ValueType};
use crate::storage::codec::{decode_values, encode_values, timestamp};

use super::BLOCK_OVERHEAD;

/// Encode sorted points of a single type into a checksummed block
pub fn encode_block(points: &[Point]) -> Result<(ValueType, Vec<u8>)> {
    let ty = batch_type(points)?;

    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    let values: Vec<_> = points.iter().map(|p| p.value.clone()).collect();
    let ts_buf = timestamp::encode(&timestamps)?;
    let value_buf = encode_values(ty, &values)?;

    let mut buf = Vec::with_capacity(BLOCK_OVERHEAD + ts_buf.len() + value_buf.len());
    buf.put_u8(ty.as_u8());
    buf.put_u32_le(points.len() as u32);
    buf.put_u32_le(ts_buf.len() as u32);
    buf.extend_from_slice(&ts_buf);
    buf.extend_from_slice(&value_buf);
    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    Ok((ty, buf))
}

/// Verify and decode a block. Output is freshly allocated.
pub fn decode_block(buf: &[u8]) -> Result<(ValueType, Vec<Point>)> {
    if buf.len() < BLOCK_OVERHEAD {
        return Err(AtlasError::Corruption(format!("block of {} bytes is too short", buf.len())));
    }
    let (body, crc_bytes) = buf.split_at(buf.len() - 4);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(AtlasError::Corruption(format!(
            "block checksum mismatch: stored {:08x}, computed {:08x}",
            stored, computed
        )));
    }

    let ty = ValueType::try_from(body[0])?;
    let count = u32::from_le_bytes([body[1], body[2], body[3], body[4]]) as usize;
    let ts_len = u32::from_le_bytes([body[5], body[6], body[7], body[8]]) as usize;
    let columns = &body[9..];
    if ts_len > columns.len() {
        return Err(AtlasError::Corruption("timestamp column past end of block".to_string()));
    }
    let (ts_buf, value_buf) = columns.split_at(ts_len);

    let timestamps = timestamp::decode(ts_buf)?;
    let values = decode_values(ty, value_buf)?;
    if timestamps.len() != count || values.len() != count {
        return Err(AtlasError::Corruption(format!(
            "block declares {} points, decoded {} timestamps and {} values",
            count,
            timestamps.len(),
            values.len()
        )));
    }

    let points = timestamps
        .into_iter()
        .zip(values)
        .map(|(timestamp, value)| Point { timestamp, value })
        .collect();
    Ok((ty, points))
}
