//! Series keys, predicates and the per-series type registry
//!
//! ## Key Format
//! ```text
//! measurement,tag1=v1,tag2=v2#field
//! ```
//! Tags are sorted by tag key on construction, so two spellings of the same
//! series produce the same key. Keys order by the bytes of this canonical form.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::point::ValueType;

const TAG_SEPARATOR: char = ',';
const TAG_ASSIGN: char = '=';
const FIELD_SEPARATOR: char = '#';

/// Longest canonical key a TSM index entry can hold
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

// =============================================================================
// SeriesKey
// =============================================================================

/// Identifies one logical time series: measurement + tag set + field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Build a key from its parts. Tags may be given in any order.
    pub fn new(measurement: &str, tags: &[(&str, &str)], field: &str) -> Result<Self> {
        check_component("measurement", measurement)?;
        check_component("field", field)?;

        let mut sorted: Vec<(&str, &str)> = tags.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for pair in sorted.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(AtlasError::Validation(format!("duplicate tag key '{}'", pair[0].0)));
            }
        }

        let mut key = String::with_capacity(measurement.len() + field.len() + 16);
        key.push_str(measurement);
        for (k, v) in sorted {
            check_component("tag key", k)?;
            check_component("tag value", v)?;
            key.push(TAG_SEPARATOR);
            key.push_str(k);
            key.push(TAG_ASSIGN);
            key.push_str(v);
        }
        key.push(FIELD_SEPARATOR);
        key.push_str(field);
        if key.len() > MAX_KEY_LEN {
            return Err(AtlasError::Validation(format!(
                "series key of {} bytes exceeds {} bytes",
                key.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(Self(key))
    }

    /// Parse `measurement,tag=v#field`, normalizing the tag order
    pub fn parse(s: &str) -> Result<Self> {
        let (series, field) = s
            .rsplit_once(FIELD_SEPARATOR)
            .ok_or_else(|| AtlasError::Validation(format!("series key '{}' has no field", s)))?;

        let mut parts = series.split(TAG_SEPARATOR);
        let measurement = parts.next().unwrap_or_default();
        let mut tags = Vec::new();
        for part in parts {
            let (k, v) = part.split_once(TAG_ASSIGN).ok_or_else(|| {
                AtlasError::Validation(format!("malformed tag '{}' in '{}'", part, s))
            })?;
            tags.push((k, v));
        }
        Self::new(measurement, &tags, field)
    }

    /// Wrap a key read back from disk, which was canonical when written
    pub(crate) fn from_canonical(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn measurement(&self) -> &str {
        let series = self.series_part();
        series.split(TAG_SEPARATOR).next().unwrap_or(series)
    }

    pub fn field(&self) -> &str {
        self.0
            .rsplit_once(FIELD_SEPARATOR)
            .map(|(_, f)| f)
            .unwrap_or_default()
    }

    /// Tag pairs in key order
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.series_part()
            .split(TAG_SEPARATOR)
            .skip(1)
            .filter_map(|t| t.split_once(TAG_ASSIGN))
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn series_part(&self) -> &str {
        self.0
            .rsplit_once(FIELD_SEPARATOR)
            .map(|(s, _)| s)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_component(what: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(AtlasError::Validation(format!("{} must not be empty", what)));
    }
    if s.contains([TAG_SEPARATOR, TAG_ASSIGN, FIELD_SEPARATOR]) {
        return Err(AtlasError::Validation(format!(
            "{} '{}' contains a reserved character",
            what, s
        )));
    }
    Ok(())
}

// =============================================================================
// Predicate
// =============================================================================

/// Selects a set of series keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// Exactly one series
    Series(SeriesKey),

    /// Every field of every series in a measurement
    Measurement(String),

    /// Series of a measurement carrying `key=value`
    Tag {
        measurement: String,
        key: String,
        value: String,
    },

    /// One field across all series of a measurement
    Field { measurement: String, field: String },

    /// Every series
    All,
}

impl Predicate {
    pub fn matches(&self, key: &SeriesKey) -> bool {
        match self {
            Predicate::Series(k) => k == key,
            Predicate::Measurement(m) => key.measurement() == m,
            Predicate::Tag {
                measurement,
                key: tag,
                value,
            } => key.measurement() == measurement && key.tag(tag) == Some(value.as_str()),
            Predicate::Field { measurement, field } => {
                key.measurement() == measurement && key.field() == field
            }
            Predicate::All => true,
        }
    }
}

// =============================================================================
// Type Registry
// =============================================================================

/// Remembers the value type of every series seen so far
///
/// Populated from TSM indexes and WAL replay on open, then by every accepted
/// write. A series keeps its type for the life of the store.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<SeriesKey, ValueType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SeriesKey) -> Option<ValueType> {
        self.types.read().get(key).copied()
    }

    /// Fail if `key` already has a different type
    pub fn check(&self, key: &SeriesKey, ty: ValueType) -> Result<()> {
        match self.get(key) {
            Some(existing) if existing != ty => Err(AtlasError::Validation(format!(
                "series '{}' is {}, cannot write {}",
                key, existing, ty
            ))),
            _ => Ok(()),
        }
    }

    /// Record the type of `key`, failing on conflict
    pub fn register(&self, key: &SeriesKey, ty: ValueType) -> Result<()> {
        let mut types = self.types.write();
        match types.get(key) {
            Some(existing) if *existing != ty => Err(AtlasError::Validation(format!(
                "series '{}' is {}, cannot write {}",
                key, existing, ty
            ))),
            Some(_) => Ok(()),
            None => {
                types.insert(key.clone(), ty);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All known keys matching `predicate`, sorted
    pub fn matching(&self, predicate: &Predicate) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self
            .types
            .read()
            .keys()
            .filter(|k| predicate.matches(k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
