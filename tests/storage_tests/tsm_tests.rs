//! Tests for TSM files
//!
//! These tests verify:
//! - Writing and reading multi-block, multi-type files
//! - Index lookups by key and time range
//! - Temp file handling on abandoned writers
//! - Detection of damaged blocks and indexes

use std::fs;
use std::path::Path;

use atlasts::point::{Point, TimeRange, ValueType};
use atlasts::series::SeriesKey;
use atlasts::storage::{FileId, TsmFileMeta, TsmReader, TsmWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(host: &str, field: &str) -> SeriesKey {
    SeriesKey::new("cpu", &[("host", host)], field).unwrap()
}

fn float_points(start: i64, count: i64) -> Vec<Point> {
    (start..start + count).map(|t| Point::float(t * 10, t as f64 / 2.0)).collect()
}

/// Two keys, the first spread over 3 blocks of 4 points
fn write_sample(dir: &Path) -> TsmFileMeta {
    let mut writer = TsmWriter::create(dir, FileId::new(1, 1, 0), 4).unwrap();
    writer.write_series(&key("a", "usage"), &float_points(0, 10)).unwrap();
    writer
        .write_series(
            &key("b", "count"),
            &[Point::integer(5, -1), Point::integer(6, 2), Point::integer(7, 3)],
        )
        .unwrap();
    writer.finish(42).unwrap()
}

// =============================================================================
// Read/Write Tests
// =============================================================================

#[test]
fn test_write_and_read_back() {
    let temp = TempDir::new().unwrap();
    let meta = write_sample(temp.path());

    assert_eq!(meta.key_count, 2);
    assert_eq!(meta.point_count, 13);
    assert_eq!(meta.path.file_name().unwrap(), "000000001-01-000.tsm");

    let reader = TsmReader::open(&meta.path).unwrap();
    assert_eq!(reader.max_sequence(), 42);
    assert_eq!(reader.block_count(), 4);
    assert_eq!(reader.value_type(&key("b", "count")), Some(ValueType::Integer));
    assert_eq!(reader.time_range(), Some(TimeRange::new(0, 90)));

    let points: Vec<Point> = reader
        .entries(&key("a", "usage"), TimeRange::all())
        .iter()
        .flat_map(|e| reader.decode(e).unwrap())
        .collect();
    assert_eq!(points, float_points(0, 10));
}

#[test]
fn test_entries_limited_to_range() {
    let temp = TempDir::new().unwrap();
    let meta = write_sample(temp.path());
    let reader = TsmReader::open(&meta.path).unwrap();

    // Blocks cover [0,30], [40,70], [80,90]
    let entries = reader.entries(&key("a", "usage"), TimeRange::new(35, 75));
    assert_eq!(entries.len(), 1);
    assert_eq!((entries[0].min_time, entries[0].max_time), (40, 70));

    assert!(reader.entries(&key("a", "usage"), TimeRange::new(91, 100)).is_empty());
    assert!(reader.entries(&key("zzz", "usage"), TimeRange::all()).is_empty());
}

#[test]
fn test_keys_are_sorted() {
    let temp = TempDir::new().unwrap();
    let meta = write_sample(temp.path());
    let reader = TsmReader::open(&meta.path).unwrap();

    let keys: Vec<&SeriesKey> = reader.keys().collect();
    assert_eq!(keys, vec![&key("a", "usage"), &key("b", "count")]);
}

#[test]
fn test_unsorted_points_rejected() {
    let temp = TempDir::new().unwrap();
    let mut writer = TsmWriter::create(temp.path(), FileId::new(1, 1, 0), 10).unwrap();

    let result = writer.write_block(&key("a", "usage"), &[Point::float(5, 1.0), Point::float(5, 2.0)]);
    assert!(result.is_err());
}

#[test]
fn test_abandoned_writer_leaves_nothing() {
    let temp = TempDir::new().unwrap();
    {
        let mut writer = TsmWriter::create(temp.path(), FileId::new(3, 1, 0), 10).unwrap();
        writer.write_series(&key("a", "usage"), &float_points(0, 3)).unwrap();
    }
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_second_writer_for_same_id_fails() {
    let temp = TempDir::new().unwrap();
    let id = FileId::new(4, 2, 0);
    let mut first = TsmWriter::create(temp.path(), id, 10).unwrap();
    first.write_series(&key("a", "usage"), &float_points(0, 3)).unwrap();

    assert!(TsmWriter::create(temp.path(), id, 10).is_err());

    // The failed create must not disturb the first writer's temp file
    let meta = first.finish(1).unwrap();
    let reader = TsmReader::open(&meta.path).unwrap();
    assert_eq!(meta.point_count, 3);
    assert!(reader.verify().is_empty());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_damaged_block_detected_by_verify() {
    let temp = TempDir::new().unwrap();
    let meta = write_sample(temp.path());
    let entry = {
        let reader = TsmReader::open(&meta.path).unwrap();
        reader.entries(&key("a", "usage"), TimeRange::all())[1]
    };

    let mut bytes = fs::read(&meta.path).unwrap();
    bytes[entry.offset as usize + 10] ^= 0xFF;
    fs::write(&meta.path, &bytes).unwrap();

    let reader = TsmReader::open(&meta.path).unwrap();
    let bad = reader.verify();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].0, key("a", "usage"));
    assert_eq!(bad[0].1, entry);
    assert!(reader.decode(&entry).is_err());
}

#[test]
fn test_damaged_index_fails_open() {
    let temp = TempDir::new().unwrap();
    let meta = write_sample(temp.path());

    let mut bytes = fs::read(&meta.path).unwrap();
    // Footer is 33 bytes; the index sits just before it
    let at = bytes.len() - 40;
    bytes[at] ^= 0x01;
    fs::write(&meta.path, &bytes).unwrap();

    assert!(TsmReader::open(&meta.path).is_err());
}

#[test]
fn test_truncated_file_fails_open() {
    let temp = TempDir::new().unwrap();
    let meta = write_sample(temp.path());
    let bytes = fs::read(&meta.path).unwrap();
    fs::write(&meta.path, &bytes[..bytes.len() - 5]).unwrap();

    assert!(TsmReader::open(&meta.path).is_err());
}
