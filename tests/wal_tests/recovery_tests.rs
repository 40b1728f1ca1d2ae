//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from an empty or missing WAL directory
//! - Recovery across several segments
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted entries (CRC mismatch)
//! - Verify mode (stats only, nothing repaired)

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use atlasts::config::WalSyncStrategy;
use atlasts::point::{Point, TimeRange};
use atlasts::series::{Predicate, SeriesKey};
use atlasts::wal::{list_segments, Operation, RecoveryResult, WalOptions, WalRecovery, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    (temp_dir, wal_dir)
}

/// Write entries using WalWriter (produces a well-formed WAL)
fn write_entries_via_writer(dir: &Path, count: i64) -> WalWriter {
    let options = WalOptions {
        sync_strategy: WalSyncStrategy::EveryWrite,
        segment_size: 1 << 20,
    };
    let writer = WalWriter::open(dir, options, &RecoveryResult::default()).unwrap();
    let key = SeriesKey::new("mem", &[("host", "a")], "used").unwrap();
    for i in 0..count {
        writer
            .append(&Operation::Write {
                series: vec![(key.clone(), vec![Point::integer(i, i * 10)])],
            })
            .unwrap();
    }
    writer
}

fn only_segment(dir: &Path) -> PathBuf {
    let segments = list_segments(dir).unwrap();
    assert_eq!(segments.len(), 1);
    segments[0].1.clone()
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_missing_directory() {
    let (_temp, dir) = setup_temp_wal();

    let (entries, result) = WalRecovery::recover(&dir).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.last_lsn, 0);
    assert_eq!(result.next_lsn(), 1);
    assert_eq!(result.next_segment_id(), 1);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 10));

    let (entries, result) = WalRecovery::recover(&dir).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.entries_corrupted, 0);
    assert!(!result.was_truncated);
    assert_eq!(result.next_lsn(), 11);
    assert_eq!(result.next_segment_id(), 2);
}

#[test]
fn test_replay_in_lsn_order_across_segments() {
    let (_temp, dir) = setup_temp_wal();
    let writer = write_entries_via_writer(&dir, 3);
    writer.rotate().unwrap();
    writer
        .append(&Operation::Delete {
            predicate: Predicate::All,
            range: TimeRange::new(0, 1),
        })
        .unwrap();
    drop(writer);

    let entries = WalRecovery::replay(&dir).unwrap();
    let lsns: Vec<u64> = entries.iter().map(|e| e.lsn).collect();

    assert_eq!(lsns, vec![1, 2, 3, 4]);
    assert!(matches!(entries[3].operation, Operation::Delete { .. }));
}

#[test]
fn test_writer_continues_after_recovery() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 3));

    let (_, result) = WalRecovery::recover(&dir).unwrap();
    let options = WalOptions {
        sync_strategy: WalSyncStrategy::EveryWrite,
        segment_size: 1 << 20,
    };
    let writer = WalWriter::open(&dir, options, &result).unwrap();
    let lsn = writer
        .append(&Operation::Write { series: Vec::new() })
        .unwrap();

    assert_eq!(lsn, 4);
    assert_eq!(list_segments(&dir).unwrap().len(), 2);
}

// =============================================================================
// Recover: Damaged WAL Tests
// =============================================================================

#[test]
fn test_recover_truncated_tail() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 5));
    let path = only_segment(&dir);
    let full = fs::metadata(&path).unwrap().len();

    // Cut the last entry in half
    OpenOptions::new().write(true).open(&path).unwrap().set_len(full - 5).unwrap();

    let (entries, result) = WalRecovery::recover(&dir).unwrap();

    assert_eq!(entries.len(), 4);
    assert_eq!(result.last_lsn, 4);
    assert!(result.was_truncated);
    assert!(fs::metadata(&path).unwrap().len() < full - 5);

    // A second pass finds a clean log
    let (_, again) = WalRecovery::recover(&dir).unwrap();
    assert!(!again.was_truncated);
    assert_eq!(again.entries_corrupted, 0);
}

#[test]
fn test_recover_garbage_appended() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 3));
    let path = only_segment(&dir);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB; 40]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&dir).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_corrupted, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_crc_mismatch_drops_rest_of_segment() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 3));
    let path = only_segment(&dir);

    // Flip one byte inside the last entry's payload
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 2;
    bytes[last] ^= 0x55;
    fs::write(&path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&dir).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.last_lsn, 2);
    assert_eq!(result.entries_corrupted, 1);
}

#[test]
fn test_recover_bad_segment_header() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 2));
    let path = only_segment(&dir);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&dir).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

// =============================================================================
// Verify Mode Tests
// =============================================================================

#[test]
fn test_verify_does_not_modify() {
    let (_temp, dir) = setup_temp_wal();
    drop(write_entries_via_writer(&dir, 4));
    let path = only_segment(&dir);
    let full = fs::metadata(&path).unwrap().len();
    OpenOptions::new().write(true).open(&path).unwrap().set_len(full - 3).unwrap();

    let result = WalRecovery::verify(&dir).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), full - 3);
}
