//! Tests for the block codecs
//!
//! These tests verify:
//! - Lossless encoding of realistic and adversarial datasets per type
//! - Compression of regular timestamps and repeated values
//! - Rejection of damaged input

use atlasts::storage::codec::{boolean, float, integer, string, timestamp, unsigned};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// Helper Functions
// =============================================================================

fn rng() -> StdRng {
    StdRng::seed_from_u64(0x5EED)
}

fn assert_timestamps(values: &[i64]) {
    let encoded = timestamp::encode(values).unwrap();
    assert_eq!(timestamp::decode(&encoded).unwrap(), values);
}

fn assert_integers(values: &[i64]) {
    let encoded = integer::encode(values).unwrap();
    assert_eq!(integer::decode(&encoded).unwrap(), values);
}

// =============================================================================
// Timestamp Tests
// =============================================================================

#[test]
fn test_timestamps_regular_interval_compress() {
    let values: Vec<i64> = (0..1000).map(|i| 1_600_000_000_000_000_000 + i * 10_000_000_000).collect();
    let encoded = timestamp::encode(&values).unwrap();

    assert_eq!(timestamp::decode(&encoded).unwrap(), values);
    assert!(encoded.len() < 32, "run-length encoding expected, got {} bytes", encoded.len());
}

#[test]
fn test_timestamps_jittered() {
    let mut rng = rng();
    let mut ts = 1_000_000_000i64;
    let values: Vec<i64> = (0..1000)
        .map(|_| {
            ts += 1_000_000 + rng.gen_range(0..1000);
            ts
        })
        .collect();
    assert_timestamps(&values);
}

#[test]
fn test_timestamps_extremes() {
    assert_timestamps(&[]);
    assert_timestamps(&[i64::MIN]);
    assert_timestamps(&[i64::MIN, -1, 0, 1, i64::MAX]);
    assert_timestamps(&[-5_000, -4_000, -3_000]);
}

// =============================================================================
// Value Tests
// =============================================================================

#[test]
fn test_floats_random_and_special() {
    let mut rng = rng();
    let mut values: Vec<f64> = (0..500).map(|_| rng.gen::<f64>() * 1e6 - 5e5).collect();
    values.extend_from_slice(&[0.0, -0.0, f64::MAX, f64::MIN, f64::MIN_POSITIVE, f64::INFINITY, f64::NEG_INFINITY]);

    let decoded = float::decode(&float::encode(&values).unwrap()).unwrap();
    let bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    let decoded_bits: Vec<u64> = decoded.iter().map(|v| v.to_bits()).collect();
    assert_eq!(decoded_bits, bits);
}

#[test]
fn test_floats_nan_bits_preserved() {
    let values = vec![f64::NAN, 1.0, f64::from_bits(0x7ff8_0000_0000_0001)];
    let decoded = float::decode(&float::encode(&values).unwrap()).unwrap();
    assert_eq!(decoded[0].to_bits(), values[0].to_bits());
    assert_eq!(decoded[2].to_bits(), values[2].to_bits());
}

#[test]
fn test_floats_constant_series_compress() {
    let values = vec![21.5f64; 1000];
    let encoded = float::encode(&values).unwrap();
    assert_eq!(float::decode(&encoded).unwrap(), values);
    assert!(encoded.len() < 200);
}

#[test]
fn test_integers_mixed_magnitudes() {
    let mut rng = rng();
    let values: Vec<i64> = (0..1000).map(|_| rng.gen_range(-1_000_000..1_000_000)).collect();
    assert_integers(&values);
    assert_integers(&[i64::MIN, i64::MAX, i64::MIN, 0, i64::MAX]);
    assert_integers(&[7; 300]);
}

#[test]
fn test_unsigned_full_range() {
    let values = vec![0, u64::MAX, 1, u64::MAX - 1, 1 << 63];
    assert_eq!(unsigned::decode(&unsigned::encode(&values).unwrap()).unwrap(), values);
}

#[test]
fn test_booleans_packed() {
    let mut rng = rng();
    let values: Vec<bool> = (0..1001).map(|_| rng.gen()).collect();
    let encoded = boolean::encode(&values).unwrap();
    assert_eq!(boolean::decode(&encoded).unwrap(), values);
    assert!(encoded.len() < 1001 / 8 + 16);
}

#[test]
fn test_strings_unicode_and_empty() {
    let values = vec!["".to_string(), "ok".to_string(), "température ✓".to_string(), "x".repeat(5000)];
    assert_eq!(string::decode(&string::encode(&values).unwrap()).unwrap(), values);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_damaged_input_is_an_error() {
    let encoded = boolean::encode(&[true; 100]).unwrap();
    assert!(boolean::decode(&encoded[..encoded.len() / 2]).is_err());

    let encoded = string::encode(&["alpha", "beta"]).unwrap();
    assert!(string::decode(&encoded[..encoded.len() - 1]).is_err());

    assert!(timestamp::decode(&[0xF0]).is_err());
}
