//! String codec
//!
//! Strings are concatenated with varint length prefixes and the whole buffer
//! is Snappy compressed behind a 1 byte header.

use crate::error::{AtlasError, Result};

use super::varint::{get_uvarint, put_uvarint};

const ENCODING_SNAPPY: u8 = 1;

pub fn encode<S: AsRef<str>>(values: &[S]) -> Result<Vec<u8>> {
    let raw_len: usize = values.iter().map(|s| s.as_ref().len() + 2).sum();
    let mut raw = Vec::with_capacity(raw_len);
    for s in values {
        let s = s.as_ref();
        put_uvarint(&mut raw, s.len() as u64);
        raw.extend_from_slice(s.as_bytes());
    }

    let mut out = vec![0u8; 1 + snap::raw::max_compress_len(raw.len())];
    out[0] = ENCODING_SNAPPY << 4;
    let n = snap::raw::Encoder::new()
        .compress(&raw, &mut out[1..])
        .map_err(|e| AtlasError::Storage(format!("snappy compression failed: {}", e)))?;
    out.truncate(1 + n);
    Ok(out)
}

pub fn decode(buf: &[u8]) -> Result<Vec<String>> {
    let Some((&header, body)) = buf.split_first() else {
        return Ok(Vec::new());
    };
    if header >> 4 != ENCODING_SNAPPY {
        return Err(AtlasError::Corruption(format!("unknown string encoding {}", header >> 4)));
    }
    let raw = snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| AtlasError::Corruption(format!("snappy: {}", e)))?;

    let mut out = Vec::new();
    let mut pos = 0;
    while pos < raw.len() {
        let (len, n) = get_uvarint(&raw[pos..])?;
        pos += n;
        let end = pos
            .checked_add(len as usize)
            .filter(|&end| end <= raw.len())
            .ok_or_else(|| AtlasError::Corruption("string length past end of block".to_string()))?;
        let s = std::str::from_utf8(&raw[pos..end])
            .map_err(|e| AtlasError::Corruption(format!("invalid utf-8 in string block: {}", e)))?;
        out.push(s.to_string());
        pos = end;
    }
    Ok(out)
}
