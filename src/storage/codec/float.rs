//! Float codec: Gorilla XOR compression
//!
//! Each value is XORed with its predecessor. Identical values cost one bit;
//! otherwise only the meaningful bits between the leading and trailing zeros
//! are stored, reusing the previous window when the new bits fit inside it.
//!
//! ```text
//! [header: 1 << 4][count varint][first value: 64 bits]
//! per value:  0                               same as previous
//!             1 0 [meaningful bits]           fits previous window
//!             1 1 [lead: 5][len: 6][bits]     new window (len 64 stored as 0)
//! ```
//!
//! The count is stored up front, so NaN and infinities round-trip like any
//! other bit pattern.

use crate::error::{AtlasError, Result};

use super::bits::{BitReader, BitWriter};
use super::varint::{get_uvarint, put_uvarint};

const ENCODING_GORILLA: u8 = 1;

pub fn encode(values: &[f64]) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(1 + values.len() * 2);
    head.push(ENCODING_GORILLA << 4);
    put_uvarint(&mut head, values.len() as u64);

    let Some((first, rest)) = values.split_first() else {
        return Ok(head);
    };

    let mut w = BitWriter::new(head);
    let mut prev = first.to_bits();
    w.write_bits(prev, 64);

    // (leading zeros, meaningful length) of the current window
    let mut window: Option<(u32, u32)> = None;

    for v in rest {
        let bits = v.to_bits();
        let xor = bits ^ prev;
        prev = bits;

        if xor == 0 {
            w.write_bit(false);
            continue;
        }
        w.write_bit(true);

        let lead = xor.leading_zeros().min(31);
        let trail = xor.trailing_zeros();

        match window {
            Some((wl, wlen)) if lead >= wl && trail >= 64 - wl - wlen => {
                w.write_bit(false);
                w.write_bits(xor >> (64 - wl - wlen), wlen);
            }
            _ => {
                let len = 64 - lead - trail;
                w.write_bit(true);
                w.write_bits(u64::from(lead), 5);
                w.write_bits(u64::from(len % 64), 6);
                w.write_bits(xor >> trail, len);
                window = Some((lead, len));
            }
        }
    }
    Ok(w.into_inner())
}

pub fn decode(buf: &[u8]) -> Result<Vec<f64>> {
    let Some((&header, body)) = buf.split_first() else {
        return Ok(Vec::new());
    };
    if header >> 4 != ENCODING_GORILLA {
        return Err(AtlasError::Corruption(format!("unknown float encoding {}", header >> 4)));
    }
    let (count, n) = get_uvarint(body)?;
    let count = count as usize;
    let mut out = Vec::with_capacity(count);
    if count == 0 {
        return Ok(out);
    }

    let mut r = BitReader::new(&body[n..]);
    let mut prev = r.read_bits(64)?;
    out.push(f64::from_bits(prev));

    let mut window: Option<(u32, u32)> = None;
    while out.len() < count {
        if r.read_bit()? {
            let (lead, len) = if r.read_bit()? {
                let lead = r.read_bits(5)? as u32;
                let len = match r.read_bits(6)? as u32 {
                    0 => 64,
                    l => l,
                };
                if lead + len > 64 {
                    return Err(AtlasError::Corruption("float window out of range".to_string()));
                }
                window = Some((lead, len));
                (lead, len)
            } else {
                window.ok_or_else(|| {
                    AtlasError::Corruption("float window reused before being set".to_string())
                })?
            };
            let meaningful = r.read_bits(len)?;
            prev ^= meaningful << (64 - lead - len);
        }
        out.push(f64::from_bits(prev));
    }
    Ok(out)
}
