//! Unsigned codec: the integer codec over the two's-complement view of each
//! value. Deltas wrap, so the full u64 range survives.

use crate::error::Result;

use super::integer;

pub fn encode(values: &[u64]) -> Result<Vec<u8>> {
    let signed: Vec<i64> = values.iter().map(|&v| v as i64).collect();
    integer::encode(&signed)
}

pub fn decode(buf: &[u8]) -> Result<Vec<u64>> {
    Ok(integer::decode(buf)?.into_iter().map(|v| v as u64).collect())
}
