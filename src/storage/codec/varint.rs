//! Unsigned LEB128 varints

use crate::error::{AtlasError, Result};

/// Longest encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Append `v` to `buf`
pub fn put_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Read a varint from the front of `buf`, returning it and the bytes consumed
pub fn get_uvarint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut v: u64 = 0;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate().take(MAX_VARINT_LEN) {
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err(AtlasError::Corruption("varint overflows u64".to_string()));
        }
        v |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok((v, i + 1));
        }
        shift += 7;
    }
    Err(AtlasError::Corruption("truncated varint".to_string()))
}
