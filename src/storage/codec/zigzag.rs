//! ZigZag mapping of signed integers onto unsigned ones, so small negative
//! numbers stay small.

#[inline]
pub fn encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
