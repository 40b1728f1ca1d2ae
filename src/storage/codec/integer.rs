//! Integer codec
//!
//! Values are delta encoded and the deltas ZigZag mapped. The first value is
//! stored as its own ZigZag form.
//!
//! ```text
//! RLE     (all deltas equal):  [1 byte: 2 << 4][first u64][delta varint][repeat varint]
//! PACKED  (all < 2^60):        [1 byte: 1 << 4][first u64][simple8b words]
//! RAW     (fallback):          [1 byte: 0 << 4][u64]...
//! ```

use bytes::BufMut;

use crate::error::{AtlasError, Result};

use super::varint::{get_uvarint, put_uvarint};
use super::{simple8b, zigzag};

const ENCODING_RAW: u8 = 0;
const ENCODING_PACKED: u8 = 1;
const ENCODING_RLE: u8 = 2;

pub fn encode(values: &[i64]) -> Result<Vec<u8>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let mut encoded = Vec::with_capacity(values.len());
    encoded.push(zigzag::encode(values[0]));
    for w in values.windows(2) {
        encoded.push(zigzag::encode(w[1].wrapping_sub(w[0])));
    }

    if encoded.len() > 2 && encoded[1..].iter().all(|&d| d == encoded[1]) {
        let mut out = Vec::with_capacity(1 + 8 + 2 * super::varint::MAX_VARINT_LEN);
        out.push(ENCODING_RLE << 4);
        out.put_u64(encoded[0]);
        put_uvarint(&mut out, encoded[1]);
        put_uvarint(&mut out, (encoded.len() - 1) as u64);
        return Ok(out);
    }

    if encoded[1..].iter().any(|&d| d > simple8b::MAX_VALUE) {
        let mut out = Vec::with_capacity(1 + encoded.len() * 8);
        out.push(ENCODING_RAW << 4);
        for v in &encoded {
            out.put_u64(*v);
        }
        return Ok(out);
    }

    let packed = simple8b::encode(&encoded[1..])?;
    let mut out = Vec::with_capacity(1 + 8 + packed.len());
    out.push(ENCODING_PACKED << 4);
    out.put_u64(encoded[0]);
    out.extend_from_slice(&packed);
    Ok(out)
}

pub fn decode(buf: &[u8]) -> Result<Vec<i64>> {
    let Some((&header, body)) = buf.split_first() else {
        return Ok(Vec::new());
    };
    let first = body
        .get(..8)
        .map(|b| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            u64::from_be_bytes(raw)
        })
        .ok_or_else(|| AtlasError::Corruption("integer block truncated".to_string()))?;
    let rest = &body[8..];

    let deltas: Vec<u64> = match header >> 4 {
        ENCODING_RLE => {
            let (delta, n) = get_uvarint(rest)?;
            let (repeat, _) = get_uvarint(&rest[n..])?;
            vec![delta; repeat as usize]
        }
        ENCODING_PACKED => simple8b::decode(rest)?,
        ENCODING_RAW => {
            if rest.len() % 8 != 0 {
                return Err(AtlasError::Corruption(format!(
                    "raw integer payload of {} bytes",
                    body.len()
                )));
            }
            rest.chunks_exact(8)
                .map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    u64::from_be_bytes(raw)
                })
                .collect()
        }
        other => {
            return Err(AtlasError::Corruption(format!("unknown integer encoding {}", other)))
        }
    };

    let mut out = Vec::with_capacity(deltas.len() + 1);
    let mut v = zigzag::decode(first);
    out.push(v);
    for d in deltas {
        v = v.wrapping_add(zigzag::decode(d));
        out.push(v);
    }
    Ok(out)
}
