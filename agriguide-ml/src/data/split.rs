//! Seeded train/test splitting.
//!
//! Both strategies shuffle with a `ChaCha8Rng` seeded from the config, so the
//! same rows, ratio and seed always give the same partition. Rows keep their
//! source order inside each split.

use crate::data::schema::RawRecord;
use crate::error::AgriError;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Train and test partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<RawRecord>,
    pub test: Vec<RawRecord>,
}

/// Uniform split: `ceil(n * test_ratio)` rows go to test, at least one row
/// stays in train.
pub fn random_split(records: Vec<RawRecord>, test_ratio: f64, seed: u64) -> Split {
    let n = records.len();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_ratio).ceil() as usize).min(n.saturating_sub(1));
    let test: Vec<usize> = indices[..n_test].to_vec();
    partition(records, &test)
}

/// Stratified split: each class contributes `round(n_c * test_ratio)` rows to
/// test, never its last row. Classes are visited in sorted order.
pub fn stratified_split(
    records: Vec<RawRecord>,
    label_column: &str,
    test_ratio: f64,
    seed: u64,
) -> Result<Split, AgriError> {
    let mut by_class: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        by_class.entry(record.text(label_column)?).or_default().push(idx);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut test = Vec::new();
    for (class, mut members) in by_class {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_test = ((n as f64 * test_ratio).round() as usize).min(n - 1);
        if n_test == 0 {
            tracing::debug!(%class, rows = n, "class too small for the test split");
        }
        test.extend_from_slice(&members[..n_test]);
    }
    Ok(partition(records, &test))
}

fn partition(records: Vec<RawRecord>, test_indices: &[usize]) -> Split {
    let mut is_test = vec![false; records.len()];
    for &i in test_indices {
        is_test[i] = true;
    }
    let (mut train, mut test) = (Vec::new(), Vec::new());
    for (record, in_test) in records.into_iter().zip(is_test) {
        if in_test {
            test.push(record);
        } else {
            train.push(record);
        }
    }
    Split { train, test }
}
