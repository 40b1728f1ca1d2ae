//! Boolean codec: one bit per value
//!
//! ```text
//! [header: 1 << 4][count varint][bits, MSB first, zero padded]
//! ```

use crate::error::{AtlasError, Result};

use super::bits::{BitReader, BitWriter};
use super::varint::{get_uvarint, put_uvarint};

const ENCODING_BITPACKED: u8 = 1;

pub fn encode(values: &[bool]) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(1 + 10 + values.len() / 8 + 1);
    head.push(ENCODING_BITPACKED << 4);
    put_uvarint(&mut head, values.len() as u64);
    let mut w = BitWriter::new(head);
    for &v in values {
        w.write_bit(v);
    }
    Ok(w.into_inner())
}

pub fn decode(buf: &[u8]) -> Result<Vec<bool>> {
    let Some((&header, body)) = buf.split_first() else {
        return Ok(Vec::new());
    };
    if header >> 4 != ENCODING_BITPACKED {
        return Err(AtlasError::Corruption(format!("unknown boolean encoding {}", header >> 4)));
    }
    let (count, n) = get_uvarint(body)?;
    let bits = &body[n..];
    if (count as usize).div_ceil(8) > bits.len() {
        return Err(AtlasError::Corruption(format!(
            "boolean block claims {} values in {} bytes",
            count,
            bits.len()
        )));
    }
    let mut r = BitReader::new(bits);
    (0..count).map(|_| r.read_bit()).collect()
}
