//! Tests for the Engine
//!
//! These tests verify:
//! - Write and query through the cache and TSM files
//! - Last-write-wins per timestamp across flushes and compactions
//! - Type validation and batch atomicity
//! - Range deletes
//! - Predicate queries and restartable cursors
//! - Concurrent writers and backpressure

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atlasts::{
    AtlasError, Backpressure, Config, Engine, Point, Precision, Predicate, SeriesKey, TimeRange,
    Value, ValueType,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(&temp_dir)).unwrap();
    (temp_dir, engine)
}

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .background_compaction(false)
        .max_points_per_block(4)
        .build()
}

fn key(measurement: &str, host: &str, field: &str) -> SeriesKey {
    SeriesKey::new(measurement, &[("host", host)], field).unwrap()
}

fn read_all(engine: &Engine, key: &SeriesKey) -> Vec<(i64, Value)> {
    engine
        .query_series(key, TimeRange::all())
        .unwrap()
        .collect_points()
        .unwrap()
        .into_iter()
        .map(|p| (p.timestamp, p.value))
        .collect()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_directories() {
    let (temp, engine) = setup_temp_engine();

    assert!(temp.path().join("wal").is_dir());
    assert!(temp.path().join("tsm").is_dir());
    assert_eq!(engine.data_dir(), temp.path());
    assert!(engine.series(&Predicate::All).is_empty());
}

#[test]
fn test_open_rejects_bad_config() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp.path()).cache_shards(3).build();

    assert!(matches!(Engine::open(config), Err(AtlasError::Config(_))));
}

// =============================================================================
// Write and Query Tests
// =============================================================================

#[test]
fn test_write_and_query_from_cache() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    engine
        .write(&k, &[Point::float(2, 2.0), Point::float(1, 1.0)], Precision::Nanosecond)
        .unwrap();

    assert_eq!(
        read_all(&engine, &k),
        vec![(1, Value::Float(1.0)), (2, Value::Float(2.0))]
    );
    assert_eq!(engine.value_type(&k), Some(ValueType::Float));
}

#[test]
fn test_write_and_query_after_flush() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");
    let points: Vec<Point> = (0..10).map(|i| Point::integer(i, i * 3)).collect();

    engine.write(&k, &points, Precision::Nanosecond).unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.stats().cache_points, 0);
    let read: Vec<Point> = engine
        .query_series(&k, TimeRange::all())
        .unwrap()
        .collect_points()
        .unwrap();
    assert_eq!(read, points);
}

#[test]
fn test_precision_scaling() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    engine.write(&k, &[Point::float(2, 1.0)], Precision::Second).unwrap();
    engine.write(&k, &[Point::float(3, 1.0)], Precision::Millisecond).unwrap();

    let timestamps: Vec<i64> = read_all(&engine, &k).into_iter().map(|(ts, _)| ts).collect();
    assert_eq!(timestamps, vec![3_000_000, 2_000_000_000]);
}

#[test]
fn test_precision_overflow_is_rejected() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    let result = engine.write(&k, &[Point::float(i64::MAX / 10, 1.0)], Precision::Second);

    assert!(matches!(result, Err(AtlasError::Validation(_))));
    assert!(engine.series(&Predicate::All).is_empty());
    assert_eq!(engine.stats().last_lsn, 0);
}

#[test]
fn test_empty_write_is_noop() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    engine.write(&k, &[], Precision::Nanosecond).unwrap();
    engine.write_batch(&[], Precision::Nanosecond).unwrap();

    assert_eq!(engine.stats().last_lsn, 0);
    assert!(engine.value_type(&k).is_none());
}

// =============================================================================
// Last-Write-Wins Tests
// =============================================================================

#[test]
fn test_overwrite_in_cache() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");

    engine.write(&k, &[Point::integer(5, 10)], Precision::Nanosecond).unwrap();
    engine.write(&k, &[Point::integer(5, 20)], Precision::Nanosecond).unwrap();

    assert_eq!(read_all(&engine, &k), vec![(5, Value::Integer(20))]);
}

#[test]
fn test_overwrite_within_one_batch() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");

    engine
        .write(&k, &[Point::integer(5, 10), Point::integer(5, 20)], Precision::Nanosecond)
        .unwrap();

    assert_eq!(read_all(&engine, &k), vec![(5, Value::Integer(20))]);
}

#[test]
fn test_overwrite_survives_flush_and_compaction() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");

    engine.write(&k, &[Point::integer(5, 10)], Precision::Nanosecond).unwrap();
    engine.flush().unwrap();
    engine.write(&k, &[Point::integer(5, 20)], Precision::Nanosecond).unwrap();

    // Cache beats the older file
    assert_eq!(read_all(&engine, &k), vec![(5, Value::Integer(20))]);

    // Newer file beats the older file
    engine.flush().unwrap();
    assert_eq!(read_all(&engine, &k), vec![(5, Value::Integer(20))]);

    engine.compact_full().unwrap();
    assert_eq!(read_all(&engine, &k), vec![(5, Value::Integer(20))]);
    assert_eq!(engine.file_store().current().len(), 1);
}

#[test]
fn test_many_flushes_keep_latest_values() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    for round in 0..5 {
        let points: Vec<Point> = (0..8).map(|i| Point::float(i, (round * 100 + i) as f64)).collect();
        engine.write(&k, &points, Precision::Nanosecond).unwrap();
        engine.flush().unwrap();
    }

    let expected: Vec<(i64, Value)> = (0..8).map(|i| (i, Value::Float((400 + i) as f64))).collect();
    assert_eq!(read_all(&engine, &k), expected);

    engine.compact().unwrap();
    assert_eq!(read_all(&engine, &k), expected);
}

// =============================================================================
// Type Validation Tests
// =============================================================================

#[test]
fn test_mixed_types_in_one_write_rejected() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    let result = engine.write(
        &k,
        &[Point::float(1, 1.0), Point::integer(2, 2)],
        Precision::Nanosecond,
    );

    assert!(matches!(result, Err(AtlasError::Validation(_))));
    assert!(read_all(&engine, &k).is_empty());
}

#[test]
fn test_type_conflict_with_existing_series() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    engine.write(&k, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();
    let result = engine.write(&k, &[Point::boolean(2, true)], Precision::Nanosecond);

    assert!(matches!(result, Err(AtlasError::Validation(_))));
    assert_eq!(read_all(&engine, &k), vec![(1, Value::Float(1.0))]);
}

#[test]
fn test_type_conflict_across_series_in_batch() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    let result = engine.write_batch(
        &[
            (k.clone(), vec![Point::float(1, 1.0)]),
            (k.clone(), vec![Point::unsigned(2, 2)]),
        ],
        Precision::Nanosecond,
    );

    assert!(matches!(result, Err(AtlasError::Validation(_))));
    assert!(engine.value_type(&k).is_none());
}

#[test]
fn test_failed_batch_writes_nothing() {
    let (_temp, engine) = setup_temp_engine();
    let good = key("cpu", "a", "usage");
    let bad = key("cpu", "b", "usage");
    engine.write(&bad, &[Point::integer(1, 1)], Precision::Nanosecond).unwrap();
    let lsn = engine.stats().last_lsn;

    let result = engine.write_batch(
        &[
            (good.clone(), vec![Point::float(1, 1.0)]),
            (bad.clone(), vec![Point::float(2, 2.0)]),
        ],
        Precision::Nanosecond,
    );

    assert!(result.is_err());
    assert!(read_all(&engine, &good).is_empty());
    assert_eq!(engine.stats().last_lsn, lsn);
}

#[test]
fn test_type_survives_flush() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");

    engine.write(&k, &[Point::string(1, "up")], Precision::Nanosecond).unwrap();
    engine.flush().unwrap();

    let result = engine.write(&k, &[Point::float(2, 1.0)], Precision::Nanosecond);
    assert!(matches!(result, Err(AtlasError::Validation(_))));
    assert_eq!(engine.value_type(&k), Some(ValueType::String));
}

#[test]
fn test_failed_wal_append_leaves_series_unregistered() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .background_compaction(false)
        .wal_segment_size(1)
        .build();
    let engine = Engine::open(config).unwrap();
    let first = key("cpu", "a", "usage");
    let k = key("cpu", "b", "usage");
    engine.write(&first, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();

    // Every append now rolls to a new segment, which cannot be created
    let wal_dir = temp.path().join("wal");
    std::fs::remove_dir_all(&wal_dir).unwrap();
    let result = engine.write(&k, &[Point::float(2, 2.0)], Precision::Nanosecond);

    assert!(result.is_err());
    assert!(engine.value_type(&k).is_none());
    assert_eq!(engine.series(&Predicate::All), vec![first]);

    // Once the log is writable again the series may take any type
    std::fs::create_dir_all(&wal_dir).unwrap();
    engine.write(&k, &[Point::integer(3, 3)], Precision::Nanosecond).unwrap();
    assert_eq!(engine.value_type(&k), Some(ValueType::Integer));
    assert_eq!(read_all(&engine, &k), vec![(3, Value::Integer(3))]);
}

#[test]
fn test_racing_first_writes_settle_one_type() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    let k = key("cpu", "a", "usage");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let k = k.clone();
            thread::spawn(move || {
                let point = if i % 2 == 0 {
                    Point::float(i, i as f64)
                } else {
                    Point::integer(i, i)
                };
                engine.write(&k, &[point], Precision::Nanosecond).is_ok()
            })
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    // The first writer fixes the type; only writes of that type get in
    assert_eq!(accepted, 4);
    let ty = engine.value_type(&k).unwrap();
    let points = read_all(&engine, &k);
    assert_eq!(points.len(), 4);
    assert!(points.iter().all(|(_, v)| v.value_type() == ty));
}

#[test]
fn test_oversized_series_key_never_reaches_the_log() {
    let (_temp, engine) = setup_temp_engine();
    let long = "m".repeat(70_000);

    assert!(matches!(
        SeriesKey::new(&long, &[("host", "a")], "v"),
        Err(AtlasError::Validation(_))
    ));
    assert!(SeriesKey::parse(&format!("{},host=a#v", long)).is_err());

    // Ordinary series still flush normally
    let k = key("cpu", "a", "v");
    engine.write(&k, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.stats().cache_points, 0);
    assert_eq!(engine.file_store().current().len(), 1);
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_single_point() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");
    engine
        .write(&k, &[Point::float(1, 1.0), Point::float(2, 2.0)], Precision::Nanosecond)
        .unwrap();

    engine.delete_range(&Predicate::Series(k.clone()), TimeRange::new(1, 1)).unwrap();

    assert_eq!(read_all(&engine, &k), vec![(2, Value::Float(2.0))]);
}

#[test]
fn test_delete_from_files() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");
    engine
        .write(&k, &[Point::float(1, 1.0), Point::float(2, 2.0)], Precision::Nanosecond)
        .unwrap();
    engine.flush().unwrap();

    engine.delete_range(&Predicate::Series(k.clone()), TimeRange::new(1, 1)).unwrap();

    assert_eq!(read_all(&engine, &k), vec![(2, Value::Float(2.0))]);
    assert_eq!(engine.stats().tombstoned_files, 1);

    // Full compaction purges the tombstoned point
    engine.compact_full().unwrap();
    assert_eq!(read_all(&engine, &k), vec![(2, Value::Float(2.0))]);
    assert_eq!(engine.stats().tombstoned_files, 0);
}

#[test]
fn test_write_after_delete_is_visible() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");
    engine.write(&k, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();
    engine.flush().unwrap();
    engine.delete_range(&Predicate::All, TimeRange::all()).unwrap();

    engine.write(&k, &[Point::float(1, 9.0)], Precision::Nanosecond).unwrap();

    assert_eq!(read_all(&engine, &k), vec![(1, Value::Float(9.0))]);
}

#[test]
fn test_delete_by_measurement() {
    let (_temp, engine) = setup_temp_engine();
    let cpu = key("cpu", "a", "usage");
    let mem = key("mem", "a", "used");
    engine.write(&cpu, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();
    engine.write(&mem, &[Point::integer(1, 1)], Precision::Nanosecond).unwrap();

    engine
        .delete_range(&Predicate::Measurement("cpu".into()), TimeRange::all())
        .unwrap();

    assert!(read_all(&engine, &cpu).is_empty());
    assert_eq!(read_all(&engine, &mem), vec![(1, Value::Integer(1))]);
}

#[test]
fn test_delete_empty_range_is_noop() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "value");
    engine.write(&k, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();
    let lsn = engine.stats().last_lsn;

    engine.delete_range(&Predicate::All, TimeRange::new(10, 1)).unwrap();

    assert_eq!(engine.stats().last_lsn, lsn);
    assert_eq!(read_all(&engine, &k).len(), 1);
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_query_by_predicate() {
    let (_temp, engine) = setup_temp_engine();
    let batch = vec![
        (key("cpu", "b", "usage"), vec![Point::float(1, 1.0)]),
        (key("cpu", "a", "usage"), vec![Point::float(1, 2.0)]),
        (key("cpu", "a", "idle"), vec![Point::float(1, 3.0)]),
        (key("mem", "a", "used"), vec![Point::integer(1, 4)]),
    ];
    engine.write_batch(&batch, Precision::Nanosecond).unwrap();
    engine.flush().unwrap();
    engine
        .write(&key("cpu", "c", "usage"), &[Point::float(2, 5.0)], Precision::Nanosecond)
        .unwrap();

    let result = engine
        .query(&Predicate::Measurement("cpu".into()), TimeRange::all())
        .unwrap();
    let keys: Vec<&str> = result.keys().map(|k| k.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "cpu,host=a#idle",
            "cpu,host=a#usage",
            "cpu,host=b#usage",
            "cpu,host=c#usage",
        ]
    );
    assert_eq!(result.point_count().unwrap(), 4);

    let by_field = engine
        .query(
            &Predicate::Field {
                measurement: "cpu".into(),
                field: "usage".into(),
            },
            TimeRange::all(),
        )
        .unwrap();
    assert_eq!(by_field.len(), 3);

    let by_tag = engine
        .query(
            &Predicate::Tag {
                measurement: "cpu".into(),
                key: "host".into(),
                value: "a".into(),
            },
            TimeRange::all(),
        )
        .unwrap();
    assert_eq!(by_tag.len(), 2);
}

#[test]
fn test_query_time_range() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");
    let points: Vec<Point> = (0..20).map(|i| Point::float(i * 10, i as f64)).collect();
    engine.write(&k, &points[..10], Precision::Nanosecond).unwrap();
    engine.flush().unwrap();
    engine.write(&k, &points[10..], Precision::Nanosecond).unwrap();

    let result = engine.query(&Predicate::All, TimeRange::new(55, 125)).unwrap();
    let cursor = result.get(&k).unwrap();
    let timestamps: Vec<i64> = cursor
        .collect_points()
        .unwrap()
        .into_iter()
        .map(|p| p.timestamp)
        .collect();

    assert_eq!(timestamps, vec![60, 70, 80, 90, 100, 110, 120]);
}

#[test]
fn test_query_empty_range() {
    let (_temp, engine) = setup_temp_engine();
    engine
        .write(&key("cpu", "a", "usage"), &[Point::float(1, 1.0)], Precision::Nanosecond)
        .unwrap();

    let result = engine.query(&Predicate::All, TimeRange::new(5, 1)).unwrap();

    assert!(result.is_empty());
}

#[test]
fn test_cursor_is_restartable_and_isolated() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");
    let points: Vec<Point> = (0..10).map(|i| Point::float(i, i as f64)).collect();
    engine.write(&k, &points[..6], Precision::Nanosecond).unwrap();
    engine.flush().unwrap();
    engine.write(&k, &points[6..], Precision::Nanosecond).unwrap();

    let cursor = engine.query_series(&k, TimeRange::all()).unwrap();
    assert_eq!(cursor.collect_points().unwrap(), points);
    assert_eq!(cursor.collect_points().unwrap(), points);

    // Later writes, flushes and compactions do not change what it returns
    engine.write(&k, &[Point::float(3, -1.0), Point::float(50, 50.0)], Precision::Nanosecond).unwrap();
    engine.compact_full().unwrap();

    assert_eq!(cursor.iter().count(), 10);
    assert_eq!(cursor.collect_points().unwrap(), points);
    assert_eq!(read_all(&engine, &k).len(), 11);
}

#[test]
fn test_series_listing() {
    let (_temp, engine) = setup_temp_engine();
    engine
        .write(&key("cpu", "a", "usage"), &[Point::float(1, 1.0)], Precision::Nanosecond)
        .unwrap();
    engine
        .write(&key("mem", "a", "used"), &[Point::integer(1, 1)], Precision::Nanosecond)
        .unwrap();

    assert_eq!(engine.series(&Predicate::All).len(), 2);
    assert_eq!(
        engine.series(&Predicate::Measurement("mem".into())),
        vec![key("mem", "a", "used")]
    );
}

// =============================================================================
// Stats Tests
// =============================================================================

#[test]
fn test_stats_follow_flushes() {
    let (_temp, engine) = setup_temp_engine();
    let k = key("cpu", "a", "usage");
    engine
        .write(&k, &[Point::float(1, 1.0), Point::float(2, 2.0)], Precision::Nanosecond)
        .unwrap();

    let before = engine.stats();
    assert_eq!(before.series, 1);
    assert_eq!(before.cache_points, 2);
    assert!(before.cache_bytes > 0);
    assert_eq!(before.last_lsn, 1);
    assert!(before.files_per_level.is_empty());

    engine.flush().unwrap();

    let after = engine.stats();
    assert_eq!(after.cache_points, 0);
    assert_eq!(after.cache_bytes, 0);
    assert_eq!(after.files_per_level.get(&1), Some(&1));
    assert!(after.total_file_bytes > 0);
    assert_eq!(after.compactions.flushes, 1);
    assert_eq!(after.compactions.points_written, 2);
}

#[test]
fn test_fresh_engine_is_not_cold() {
    let (_temp, engine) = setup_temp_engine();

    assert!(!engine.is_cold());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_to_disjoint_series() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let k = key("cpu", &format!("host{}", t), "usage");
                for batch in 0..10 {
                    let points: Vec<Point> = (0..10)
                        .map(|i| Point::float(batch * 10 + i, (t * 1000 + batch * 10 + i) as f64))
                        .collect();
                    engine.write(&k, &points, Precision::Nanosecond).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let result = engine.query(&Predicate::All, TimeRange::all()).unwrap();
    assert_eq!(result.len(), 8);
    assert_eq!(result.point_count().unwrap(), 800);
    assert_eq!(engine.stats().last_lsn, 80);
}

#[test]
fn test_concurrent_reads_during_flush() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    let k = key("cpu", "a", "usage");
    let points: Vec<Point> = (0..100).map(|i| Point::float(i, i as f64)).collect();
    engine.write(&k, &points, Precision::Nanosecond).unwrap();

    let reader = {
        let engine = Arc::clone(&engine);
        let k = k.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                let read = engine
                    .query_series(&k, TimeRange::all())
                    .unwrap()
                    .collect_points()
                    .unwrap();
                assert_eq!(read.len(), 100);
            }
        })
    };
    engine.flush().unwrap();
    engine.compact_full().unwrap();
    reader.join().unwrap();
}

// =============================================================================
// Backpressure Tests
// =============================================================================

#[test]
fn test_blocked_writes_resume_after_background_flush() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .cache_max_memory(64 * 1024)
        .cache_snapshot_size(16 * 1024)
        .backpressure(Backpressure::Block {
            timeout: Duration::from_secs(10),
        })
        .compaction_check_interval(Duration::from_millis(20))
        .build();
    let engine = Engine::open(config).unwrap();
    let k = key("cpu", "a", "usage");

    for batch in 0..40 {
        let points: Vec<Point> = (0..200)
            .map(|i| Point::float(batch * 200 + i, i as f64))
            .collect();
        engine.write(&k, &points, Precision::Nanosecond).unwrap();
        assert!(engine.stats().cache_bytes < 64 * 1024 + 32 * 1024);
    }

    assert_eq!(read_all(&engine, &k).len(), 8000);
    assert!(engine.stats().compactions.flushes > 0);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_flushes_cache() {
    let temp = TempDir::new().unwrap();
    let k = key("cpu", "a", "usage");
    {
        let engine = Engine::open(test_config(&temp)).unwrap();
        engine.write(&k, &[Point::float(1, 1.0)], Precision::Nanosecond).unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(test_config(&temp)).unwrap();
    assert_eq!(engine.file_store().current().len(), 1);
    assert_eq!(engine.stats().cache_points, 0);
    assert_eq!(read_all(&engine, &k), vec![(1, Value::Float(1.0))]);
}
