//! Points, values and time ranges
//!
//! A point is a nanosecond timestamp plus one typed value. The value type of
//! a series is fixed by its first write.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

// =============================================================================
// Values
// =============================================================================

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    Boolean(bool),
    String(String),
}

/// Type tag of a value, also the block type byte on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Float = 1,
    Integer = 2,
    Unsigned = 3,
    Boolean = 4,
    String = 5,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Float(_) => ValueType::Float,
            Value::Integer(_) => ValueType::Integer,
            Value::Unsigned(_) => ValueType::Unsigned,
            Value::Boolean(_) => ValueType::Boolean,
            Value::String(_) => ValueType::String,
        }
    }

    /// Approximate in-memory footprint, used for cache accounting
    pub fn size(&self) -> usize {
        match self {
            Value::String(s) => std::mem::size_of::<Value>() + s.len(),
            _ => std::mem::size_of::<Value>(),
        }
    }
}

impl ValueType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ValueType {
    type Error = AtlasError;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            1 => Ok(ValueType::Float),
            2 => Ok(ValueType::Integer),
            3 => Ok(ValueType::Unsigned),
            4 => Ok(ValueType::Boolean),
            5 => Ok(ValueType::String),
            other => Err(AtlasError::Corruption(format!("unknown value type {}", other))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Float => "float",
            ValueType::Integer => "integer",
            ValueType::Unsigned => "unsigned",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Points
// =============================================================================

/// A timestamped value. Timestamps are nanoseconds once inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: i64,
    pub value: Value,
}

impl Point {
    pub fn new(timestamp: i64, value: Value) -> Self {
        Self { timestamp, value }
    }

    pub fn float(timestamp: i64, v: f64) -> Self {
        Self::new(timestamp, Value::Float(v))
    }

    pub fn integer(timestamp: i64, v: i64) -> Self {
        Self::new(timestamp, Value::Integer(v))
    }

    pub fn unsigned(timestamp: i64, v: u64) -> Self {
        Self::new(timestamp, Value::Unsigned(v))
    }

    pub fn boolean(timestamp: i64, v: bool) -> Self {
        Self::new(timestamp, Value::Boolean(v))
    }

    pub fn string(timestamp: i64, v: impl Into<String>) -> Self {
        Self::new(timestamp, Value::String(v.into()))
    }
}

/// Check that a batch is non-empty and type-homogeneous, returning its type
pub fn batch_type(points: &[Point]) -> Result<ValueType> {
    let first = points
        .first()
        .ok_or_else(|| AtlasError::Validation("empty point batch".to_string()))?
        .value
        .value_type();
    if let Some(p) = points.iter().find(|p| p.value.value_type() != first) {
        return Err(AtlasError::Validation(format!(
            "mixed value types in batch: {} and {}",
            first,
            p.value.value_type()
        )));
    }
    Ok(first)
}

// =============================================================================
// Time Ranges
// =============================================================================

/// Inclusive nanosecond range `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub min: i64,
    pub max: i64,
}

impl TimeRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// The unbounded range
    pub fn all() -> Self {
        Self {
            min: i64::MIN,
            max: i64::MAX,
        }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.min && ts <= self.max
    }

    pub fn overlaps(&self, min: i64, max: i64) -> bool {
        self.min <= max && min <= self.max
    }

    /// True if `[min, max]` lies entirely inside this range
    pub fn covers(&self, min: i64, max: i64) -> bool {
        self.min <= min && max <= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

// =============================================================================
// Write Precision
// =============================================================================

/// Unit of incoming timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
}

impl Precision {
    fn multiplier(self) -> i64 {
        match self {
            Precision::Nanosecond => 1,
            Precision::Microsecond => 1_000,
            Precision::Millisecond => 1_000_000,
            Precision::Second => 1_000_000_000,
        }
    }

    /// Convert a timestamp in this precision to nanoseconds
    pub fn to_nanos(self, ts: i64) -> Result<i64> {
        ts.checked_mul(self.multiplier()).ok_or_else(|| {
            AtlasError::Validation(format!("timestamp {} overflows at {:?} precision", ts, self))
        })
    }
}
