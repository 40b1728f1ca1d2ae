//! Timestamp codec
//!
//! Timestamps arrive sorted. They are delta encoded (the first value is kept
//! whole) and the deltas are divided by the largest power of ten that divides
//! all of them, which turns "every 10s in nanoseconds" into runs of 1.
//!
//! ```text
//! header byte: [encoding: high 4 bits][log10 divisor: low 4 bits]
//!
//! RLE     (all deltas equal):  [first u64][delta/div varint][count varint]
//! PACKED  (deltas < 2^60):     [first u64][simple8b words of delta/div]
//! RAW     (fallback):          [delta u64]...   (first entry is the value)
//! ```

use bytes::BufMut;

use crate::error::{AtlasError, Result};

use super::simple8b;
use super::varint::{get_uvarint, put_uvarint};

const ENCODING_RAW: u8 = 0;
const ENCODING_PACKED: u8 = 1;
const ENCODING_RLE: u8 = 2;

/// Largest divisor tried: 10^12
const MAX_DIVISOR_EXP: u32 = 12;

pub fn encode(timestamps: &[i64]) -> Result<Vec<u8>> {
    if timestamps.is_empty() {
        return Ok(Vec::new());
    }

    let mut deltas: Vec<u64> = Vec::with_capacity(timestamps.len());
    deltas.push(timestamps[0] as u64);
    for w in timestamps.windows(2) {
        deltas.push((w[1] as u64).wrapping_sub(w[0] as u64));
    }

    let mut max = 0u64;
    let mut exp = MAX_DIVISOR_EXP;
    let mut divisor = 10u64.pow(exp);
    for &d in &deltas[1..] {
        max = max.max(d);
        while exp > 0 && d % divisor != 0 {
            exp -= 1;
            divisor /= 10;
        }
    }
    let rle = deltas.len() > 1 && deltas[1..].iter().all(|&d| d == deltas[1]);

    if rle {
        let mut out = Vec::with_capacity(1 + 8 + 2 * super::varint::MAX_VARINT_LEN);
        out.push((ENCODING_RLE << 4) | exp as u8);
        out.put_u64(deltas[0]);
        put_uvarint(&mut out, deltas[1] / divisor);
        put_uvarint(&mut out, deltas.len() as u64);
        return Ok(out);
    }

    if max > simple8b::MAX_VALUE {
        let mut out = Vec::with_capacity(1 + deltas.len() * 8);
        out.push(ENCODING_RAW << 4);
        for d in &deltas {
            out.put_u64(*d);
        }
        return Ok(out);
    }

    let scaled: Vec<u64> = deltas[1..].iter().map(|d| d / divisor).collect();
    let packed = simple8b::encode(&scaled)?;
    let mut out = Vec::with_capacity(1 + 8 + packed.len());
    out.push((ENCODING_PACKED << 4) | exp as u8);
    out.put_u64(deltas[0]);
    out.extend_from_slice(&packed);
    Ok(out)
}

pub fn decode(buf: &[u8]) -> Result<Vec<i64>> {
    let Some((&header, body)) = buf.split_first() else {
        return Ok(Vec::new());
    };
    let exp = u32::from(header & 0x0f);
    if exp > MAX_DIVISOR_EXP {
        return Err(AtlasError::Corruption(format!("timestamp divisor 10^{} out of range", exp)));
    }
    let divisor = 10u64.pow(exp);

    match header >> 4 {
        ENCODING_RLE => {
            let first = read_u64(body, 0)?;
            let (delta, n) = get_uvarint(&body[8..])?;
            let (count, _) = get_uvarint(&body[8 + n..])?;
            let step = delta.wrapping_mul(divisor);
            let mut out = Vec::with_capacity(count as usize);
            let mut ts = first;
            for _ in 0..count {
                out.push(ts as i64);
                ts = ts.wrapping_add(step);
            }
            Ok(out)
        }
        ENCODING_PACKED => {
            let first = read_u64(body, 0)?;
            let deltas = simple8b::decode(&body[8..])?;
            Ok(accumulate(first, deltas.into_iter().map(|d| d.wrapping_mul(divisor))))
        }
        ENCODING_RAW => {
            if body.is_empty() || body.len() % 8 != 0 {
                return Err(AtlasError::Corruption(format!(
                    "raw timestamp payload of {} bytes",
                    body.len()
                )));
            }
            let mut deltas = body.chunks_exact(8).map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                u64::from_be_bytes(raw)
            });
            let first = deltas.next().unwrap_or_default();
            Ok(accumulate(first, deltas))
        }
        other => Err(AtlasError::Corruption(format!("unknown timestamp encoding {}", other))),
    }
}

fn accumulate(first: u64, deltas: impl Iterator<Item = u64>) -> Vec<i64> {
    let mut out = vec![first as i64];
    let mut ts = first;
    for d in deltas {
        ts = ts.wrapping_add(d);
        out.push(ts as i64);
    }
    out
}

fn read_u64(buf: &[u8], at: usize) -> Result<u64> {
    buf.get(at..at + 8)
        .map(|b| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            u64::from_be_bytes(raw)
        })
        .ok_or_else(|| AtlasError::Corruption("timestamp block truncated".to_string()))
}
