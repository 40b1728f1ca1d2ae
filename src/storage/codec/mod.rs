//! Per-type block codecs
//!
//! Every encoder takes a full column and returns an owned buffer; every
//! decoder allocates fresh output. Encoded columns start with a header byte
//! whose high nibble names the encoding, so formats can evolve per type.
//!
//! | Column     | Encoding                                          |
//! |------------|---------------------------------------------------|
//! | timestamps | delta + power-of-ten scaling, then RLE/simple8b/raw|
//! | float      | Gorilla XOR                                       |
//! | integer    | ZigZag delta, then RLE/simple8b/raw               |
//! | unsigned   | integer codec over the two's-complement view      |
//! | boolean    | 1 bit per value                                   |
//! | string     | varint length prefixes, Snappy                    |

mod bits;
pub mod boolean;
pub mod float;
pub mod integer;
pub mod simple8b;
pub mod string;
pub mod timestamp;
pub mod unsigned;
pub mod varint;
pub mod zigzag;

use crate::error::{AtlasError, Result};
use crate::point::{Value, ValueType};

/// Encode a type-homogeneous value column
pub fn encode_values(ty: ValueType, values: &[Value]) -> Result<Vec<u8>> {
    match ty {
        ValueType::Float => float::encode(&collect(values, ty, |v| match v {
            Value::Float(f) => Some(*f),
            _ => None,
        })?),
        ValueType::Integer => integer::encode(&collect(values, ty, |v| match v {
            Value::Integer(i) => Some(*i),
            _ => None,
        })?),
        ValueType::Unsigned => unsigned::encode(&collect(values, ty, |v| match v {
            Value::Unsigned(u) => Some(*u),
            _ => None,
        })?),
        ValueType::Boolean => boolean::encode(&collect(values, ty, |v| match v {
            Value::Boolean(b) => Some(*b),
            _ => None,
        })?),
        ValueType::String => string::encode(&collect(values, ty, |v| match v {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        })?),
    }
}

/// Decode a value column written by [`encode_values`]
pub fn decode_values(ty: ValueType, buf: &[u8]) -> Result<Vec<Value>> {
    Ok(match ty {
        ValueType::Float => float::decode(buf)?.into_iter().map(Value::Float).collect(),
        ValueType::Integer => integer::decode(buf)?.into_iter().map(Value::Integer).collect(),
        ValueType::Unsigned => unsigned::decode(buf)?.into_iter().map(Value::Unsigned).collect(),
        ValueType::Boolean => boolean::decode(buf)?.into_iter().map(Value::Boolean).collect(),
        ValueType::String => string::decode(buf)?.into_iter().map(Value::String).collect(),
    })
}

fn collect<'a, T>(
    values: &'a [Value],
    ty: ValueType,
    extract: impl Fn(&'a Value) -> Option<T>,
) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| {
            extract(v).ok_or_else(|| {
                AtlasError::Validation(format!("{} value in a {} column", v.value_type(), ty))
            })
        })
        .collect()
}
