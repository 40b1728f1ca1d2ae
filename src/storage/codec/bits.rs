//! MSB-first bit stream used by the float and boolean codecs

use crate::error::{AtlasError, Result};

pub struct BitWriter {
    buf: Vec<u8>,
    /// Free bits left in the last byte of `buf`
    free: u8,
}

impl BitWriter {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, free: 0 }
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.free == 0 {
            self.buf.push(0);
            self.free = 8;
        }
        self.free -= 1;
        if bit {
            if let Some(last) = self.buf.last_mut() {
                *last |= 1 << self.free;
            }
        }
    }

    /// Write the low `n` bits of `v`, most significant first
    pub fn write_bits(&mut self, v: u64, n: u32) {
        for i in (0..n).rev() {
            self.write_bit((v >> i) & 1 == 1);
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .buf
            .get(self.pos / 8)
            .ok_or_else(|| AtlasError::Corruption("bit stream ended early".to_string()))?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        let mut v = 0u64;
        for _ in 0..n {
            v = (v << 1) | u64::from(self.read_bit()?);
        }
        Ok(v)
    }
}
