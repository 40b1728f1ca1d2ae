//! Simple8b packs runs of small unsigned integers into 64-bit words.
//!
//! Each word spends its top 4 bits on a selector naming how the remaining 60
//! bits are split:
//!
//! ```text
//! selector   0    1   2   3   4   5   6   7   8   9  10  11  12  13  14  15
//! values   240  120  60  30  20  15  12  10   8   7   6   5   4   3   2   1
//! bits       0    0   1   2   3   4   5   6   7   8  10  12  15  20  30  60
//! ```
//!
//! Selectors 0 and 1 carry no payload and encode runs of the value 1, which
//! is the common delta of regular series. A selector is only used when it can
//! be filled completely, so decoding never sees padding.

use crate::error::{AtlasError, Result};

/// Largest value that fits the widest selector
pub const MAX_VALUE: u64 = (1 << 60) - 1;

/// (values per word, bits per value), indexed by selector
const SELECTORS: [(usize, u32); 16] = [
    (240, 0),
    (120, 0),
    (60, 1),
    (30, 2),
    (20, 3),
    (15, 4),
    (12, 5),
    (10, 6),
    (8, 7),
    (7, 8),
    (6, 10),
    (5, 12),
    (4, 15),
    (3, 20),
    (2, 30),
    (1, 60),
];

/// Pack `values` into big-endian words
pub fn encode(values: &[u64]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len());
    let mut rest = values;
    while !rest.is_empty() {
        let (word, used) = pack_one(rest)?;
        out.extend_from_slice(&word.to_be_bytes());
        rest = &rest[used..];
    }
    Ok(out)
}

/// Pick the densest selector that can hold a prefix of `src`
fn pack_one(src: &[u64]) -> Result<(u64, usize)> {
    for (selector, &(n, bits)) in SELECTORS.iter().enumerate() {
        if src.len() < n {
            continue;
        }
        let chunk = &src[..n];
        if bits == 0 {
            if chunk.iter().all(|&v| v == 1) {
                return Ok(((selector as u64) << 60, n));
            }
            continue;
        }
        let limit = (1u64 << bits) - 1;
        if chunk.iter().all(|&v| v <= limit) {
            let mut word = (selector as u64) << 60;
            for (i, &v) in chunk.iter().enumerate() {
                word |= v << (i as u32 * bits);
            }
            return Ok((word, n));
        }
    }
    Err(AtlasError::Storage(format!(
        "value {} exceeds simple8b maximum",
        src[0]
    )))
}

/// Unpack every word in `buf`
pub fn decode(buf: &[u8]) -> Result<Vec<u64>> {
    if buf.len() % 8 != 0 {
        return Err(AtlasError::Corruption(format!(
            "simple8b payload length {} is not a multiple of 8",
            buf.len()
        )));
    }
    let mut out = Vec::with_capacity(buf.len() / 8 * 8);
    for chunk in buf.chunks_exact(8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        let word = u64::from_be_bytes(raw);
        let (n, bits) = SELECTORS[(word >> 60) as usize];
        if bits == 0 {
            out.extend(std::iter::repeat(1u64).take(n));
            continue;
        }
        let mask = (1u64 << bits) - 1;
        for i in 0..n as u32 {
            out.push((word >> (i * bits)) & mask);
        }
    }
    Ok(out)
}
