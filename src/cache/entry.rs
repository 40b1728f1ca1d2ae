//! Cache entry
//!
//! BTreeMap-based run of points for one series. Each timestamp keeps the
//! version with the highest LSN; within one LSN the later insert wins.

use std::collections::BTreeMap;

use crate::error::{AtlasError, Result};
use crate::point::{Point, TimeRange, Value, ValueType};

/// Bytes charged per cached point on top of the value itself
pub const POINT_OVERHEAD: usize = 8 + 8 + 32;

/// Live points of one series
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value_type: ValueType,
    values: BTreeMap<i64, (u64, Value)>,
    size: usize,
}

impl CacheEntry {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            values: BTreeMap::new(),
            size: 0,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Merge `points` written at `lsn`
    ///
    /// Returns the change in charged bytes (negative when versions were
    /// replaced by smaller ones).
    pub fn insert(&mut self, points: &[Point], lsn: u64) -> Result<isize> {
        if let Some(p) = points.iter().find(|p| p.value.value_type() != self.value_type) {
            return Err(AtlasError::Validation(format!(
                "point at {} is {} but the series holds {}",
                p.timestamp,
                p.value.value_type(),
                self.value_type
            )));
        }

        let before = self.size;
        for p in points {
            match self.values.get_mut(&p.timestamp) {
                Some((existing_lsn, existing)) => {
                    if *existing_lsn <= lsn {
                        self.size = self.size - existing.size() + p.value.size();
                        *existing_lsn = lsn;
                        *existing = p.value.clone();
                    }
                }
                None => {
                    self.size += POINT_OVERHEAD + p.value.size();
                    self.values.insert(p.timestamp, (lsn, p.value.clone()));
                }
            }
        }
        Ok(self.size as isize - before as isize)
    }

    /// Drop points within `range`; returns the bytes freed
    pub fn delete_range(&mut self, range: TimeRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        let doomed: Vec<i64> = self.values.range(range.min..=range.max).map(|(ts, _)| *ts).collect();
        let before = self.size;
        for ts in doomed {
            if let Some((_, v)) = self.values.remove(&ts) {
                self.size -= POINT_OVERHEAD + v.size();
            }
        }
        before - self.size
    }

    /// Points within `range`, ascending
    pub fn values(&self, range: TimeRange) -> Vec<Point> {
        if range.is_empty() {
            return Vec::new();
        }
        self.values
            .range(range.min..=range.max)
            .map(|(ts, (_, v))| Point::new(*ts, v.clone()))
            .collect()
    }

    /// Consume into ascending points
    pub fn into_points(self) -> Vec<Point> {
        self.values
            .into_iter()
            .map(|(ts, (_, v))| Point::new(ts, v))
            .collect()
    }

    /// Highest LSN among the stored versions
    pub fn max_lsn(&self) -> u64 {
        self.values.values().map(|(lsn, _)| *lsn).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Charged bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Charged bytes of an already materialized run
pub fn points_size(points: &[Point]) -> usize {
    points.iter().map(|p| POINT_OVERHEAD + p.value.size()).sum()
}
