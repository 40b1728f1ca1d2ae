//! Tests for FileStore
//!
//! These tests verify:
//! - Discovery of sealed files, temp file cleanup and quarantine on open
//! - Atomic publish and deferred removal of replaced files
//! - Merged reads where newer files win
//! - Tombstones and their persistence

use std::fs;
use std::path::Path;

use atlasts::point::{Point, TimeRange};
use atlasts::series::{Predicate, SeriesKey};
use atlasts::storage::{FileId, FileStore, TsmFileMeta, TsmWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(&temp_dir.path().join("tsm")).unwrap();
    (temp_dir, store)
}

fn key(host: &str) -> SeriesKey {
    SeriesKey::new("cpu", &[("host", host)], "usage").unwrap()
}

fn write_file(dir: &Path, id: FileId, series: &[(SeriesKey, Vec<Point>)], max_sequence: u64) -> TsmFileMeta {
    let mut writer = TsmWriter::create(dir, id, 100).unwrap();
    for (key, points) in series {
        writer.write_series(key, points).unwrap();
    }
    writer.finish(max_sequence).unwrap()
}

fn read_all(store: &FileStore, key: &SeriesKey) -> Vec<Point> {
    store.read(key, TimeRange::all()).collect_points().unwrap()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_discovers_sealed_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tsm");
    fs::create_dir_all(&dir).unwrap();
    write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0)])], 5);
    write_file(&dir, FileId::new(2, 1, 0), &[(key("a"), vec![Point::float(2, 2.0)])], 9);

    let store = FileStore::open(&dir).unwrap();

    assert_eq!(store.current().len(), 2);
    assert_eq!(store.max_sequence(), 9);
    assert_eq!(store.next_generation(), 3);
    assert_eq!(read_all(&store, &key("a")).len(), 2);
}

#[test]
fn test_open_removes_temp_and_quarantines_bad_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tsm");
    fs::create_dir_all(&dir).unwrap();
    write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0)])], 1);
    fs::write(dir.join("000000002-01-000.tsm.tmp"), b"half written").unwrap();
    fs::write(dir.join("000000003-01-000.tsm"), b"not a tsm file at all, just some bytes here").unwrap();

    let store = FileStore::open(&dir).unwrap();

    assert_eq!(store.current().ids(), vec![FileId::new(1, 1, 0)]);
    assert!(!dir.join("000000002-01-000.tsm.tmp").exists());
    assert!(dir.join("000000003-01-000.tsm.bad").exists());
    assert_eq!(store.stats().quarantined_files, 1);
}

// =============================================================================
// Publish Tests
// =============================================================================

#[test]
fn test_newer_file_wins_on_equal_timestamp() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("tsm");
    let old = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(5, 10.0), Point::float(6, 1.0)])], 1);
    let new = write_file(&dir, FileId::new(2, 1, 0), &[(key("a"), vec![Point::float(5, 20.0)])], 2);
    store.publish(&[old, new], &[]).unwrap();

    assert_eq!(read_all(&store, &key("a")), vec![Point::float(5, 20.0), Point::float(6, 1.0)]);
}

#[test]
fn test_replaced_file_removed_after_last_reader() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("tsm");
    let first = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0)])], 1);
    let first_path = first.path.clone();
    store.publish(&[first], &[]).unwrap();

    let pinned = store.current();
    let merged = write_file(&dir, FileId::new(1, 2, 0), &[(key("a"), vec![Point::float(1, 1.0)])], 1);
    store.publish(&[merged], &[FileId::new(1, 1, 0)]).unwrap();

    // An older snapshot still reads the replaced file
    assert!(first_path.exists());
    assert_eq!(pinned.len(), 1);
    drop(pinned);

    assert!(!first_path.exists());
    assert_eq!(store.current().ids(), vec![FileId::new(1, 2, 0)]);
    assert_eq!(read_all(&store, &key("a")), vec![Point::float(1, 1.0)]);
}

#[test]
fn test_keys_and_value_types() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("tsm");
    let mem = SeriesKey::new("mem", &[("host", "a")], "free").unwrap();
    let meta = write_file(
        &dir,
        FileId::new(1, 1, 0),
        &[
            (key("a"), vec![Point::float(1, 1.0)]),
            (key("b"), vec![Point::float(1, 1.0)]),
            (mem.clone(), vec![Point::unsigned(1, 7)]),
        ],
        1,
    );
    store.publish(&[meta], &[]).unwrap();

    let cpu: Vec<_> = store.current().keys(&Predicate::Measurement("cpu".into())).into_iter().collect();
    assert_eq!(cpu, vec![key("a"), key("b")]);
    assert!(store.value_types().contains(&(mem, atlasts::ValueType::Unsigned)));
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_delete_range_hides_points() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("tsm");
    let points: Vec<Point> = (1..=5).map(|t| Point::float(t, t as f64)).collect();
    let meta = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), points), (key("b"), vec![Point::float(3, 0.0)])], 1);
    store.publish(&[meta], &[]).unwrap();

    let touched = store
        .delete_range(&Predicate::Series(key("a")), TimeRange::new(2, 4))
        .unwrap();

    assert_eq!(touched, 1);
    let remaining: Vec<i64> = read_all(&store, &key("a")).iter().map(|p| p.timestamp).collect();
    assert_eq!(remaining, vec![1, 5]);
    assert_eq!(read_all(&store, &key("b")).len(), 1);
    assert_eq!(store.stats().tombstoned_files, 1);
}

#[test]
fn test_delete_without_matching_data_touches_nothing() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("tsm");
    let meta = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0)])], 1);
    store.publish(&[meta], &[]).unwrap();

    assert_eq!(store.delete_range(&Predicate::All, TimeRange::new(100, 200)).unwrap(), 0);
    assert_eq!(store.stats().tombstoned_files, 0);
}

#[test]
fn test_identical_delete_recorded_once() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("tsm");
    let meta = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0), Point::float(2, 2.0)])], 1);
    store.publish(&[meta], &[]).unwrap();

    let range = TimeRange::new(1, 1);
    assert_eq!(store.delete_range(&Predicate::All, range).unwrap(), 1);
    assert_eq!(store.delete_range(&Predicate::All, range).unwrap(), 0);
    assert_eq!(store.current().iter().next().unwrap().tombstones().len(), 1);
}

#[test]
fn test_tombstones_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tsm");
    {
        let store = FileStore::open(&dir).unwrap();
        let meta = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0), Point::float(2, 2.0)])], 1);
        store.publish(&[meta], &[]).unwrap();
        store.delete_range(&Predicate::All, TimeRange::new(1, 1)).unwrap();
    }

    let store = FileStore::open(&dir).unwrap();
    assert_eq!(read_all(&store, &key("a")), vec![Point::float(2, 2.0)]);
}

#[test]
fn test_torn_tombstone_tail_is_truncated() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tsm");
    let sidecar = dir.join("000000001-01-000.tombstone");
    {
        let store = FileStore::open(&dir).unwrap();
        let meta = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0), Point::float(2, 2.0)])], 1);
        store.publish(&[meta], &[]).unwrap();
        store.delete_range(&Predicate::All, TimeRange::new(1, 1)).unwrap();
    }
    let clean = fs::metadata(&sidecar).unwrap().len();
    let mut bytes = fs::read(&sidecar).unwrap();
    bytes.extend_from_slice(&[40, 0, 0, 0, 1, 2]);
    fs::write(&sidecar, &bytes).unwrap();

    let store = FileStore::open(&dir).unwrap();

    assert_eq!(read_all(&store, &key("a")), vec![Point::float(2, 2.0)]);
    assert_eq!(fs::metadata(&sidecar).unwrap().len(), clean);
}

#[test]
fn test_damaged_tombstone_before_valid_ones_quarantines_file() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tsm");
    let sidecar = dir.join("000000001-01-000.tombstone");
    {
        let store = FileStore::open(&dir).unwrap();
        let meta = write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0), Point::float(2, 2.0)])], 1);
        store.publish(&[meta], &[]).unwrap();
        store.delete_range(&Predicate::All, TimeRange::new(1, 1)).unwrap();
        store.delete_range(&Predicate::All, TimeRange::new(2, 2)).unwrap();
    }
    // Flip a payload byte of the first record; the second stays intact
    let mut bytes = fs::read(&sidecar).unwrap();
    bytes[9] ^= 0xFF;
    fs::write(&sidecar, &bytes).unwrap();

    let store = FileStore::open(&dir).unwrap();

    // Deleted points must not come back
    assert!(store.current().is_empty());
    assert!(read_all(&store, &key("a")).is_empty());
    assert!(dir.join("000000001-01-000.tsm.bad").exists());
    assert!(dir.join("000000001-01-000.tombstone.bad").exists());
    assert_eq!(store.stats().quarantined_files, 1);
}

#[test]
fn test_foreign_tsm_name_is_ignored() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("tsm");
    fs::create_dir_all(&dir).unwrap();
    write_file(&dir, FileId::new(1, 1, 0), &[(key("a"), vec![Point::float(1, 1.0)])], 1);
    fs::write(dir.join("backup.tsm"), b"copied by hand").unwrap();

    let store = FileStore::open(&dir).unwrap();

    assert_eq!(store.current().ids(), vec![FileId::new(1, 1, 0)]);
    assert!(dir.join("backup.tsm").exists());
}
