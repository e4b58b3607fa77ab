// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Train / validation / test partitioning
//!
//! Rows are taken in their existing order; shuffle beforehand (see
//! [`crate::shuffle`]) to avoid order bias.

use crate::error::{PrepError, Result};
use ndarray::{Array, ArrayBase, Axis, Data, Dimension, Slice};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Combined validation + test proportion used when none is given.
pub const DEFAULT_TEST_SIZE: f64 = 0.4;

/// How the held-out pool is divided between validation and test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitPolicy {
    /// Validation receives `floor(train_count / 2)` rows of the pool, clamped
    /// to the pool size. With `N = 100` and `test_size = 0.4` this yields a
    /// 60 / 30 / 10 split. Matches splits produced by earlier tooling.
    #[default]
    Legacy,
    /// Validation receives `floor(pool_len / 2)` rows, test the rest.
    PoolHalf,
}

impl SplitPolicy {
    /// Number of pool rows assigned to validation.
    pub fn validation_len(self, train_count: usize, pool_len: usize) -> usize {
        let half = match self {
            SplitPolicy::Legacy => train_count / 2,
            SplitPolicy::PoolHalf => pool_len / 2,
        };
        half.min(pool_len)
    }
}

impl FromStr for SplitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(SplitPolicy::Legacy),
            "pool-half" | "pool_half" => Ok(SplitPolicy::PoolHalf),
            other => Err(format!("unknown split policy '{}'", other)),
        }
    }
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitPolicy::Legacy => f.write_str("legacy"),
            SplitPolicy::PoolHalf => f.write_str("pool-half"),
        }
    }
}

/// Row counts of each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl SplitSizes {
    /// Compute the split sizes for `n` rows.
    pub fn compute(n: usize, test_size: f64, policy: SplitPolicy) -> Result<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(PrepError::InvalidSplitRatio(test_size));
        }
        let train = ((1.0 - test_size) * n as f64).floor() as usize;
        let pool = n - train;
        let validation = policy.validation_len(train, pool);
        Ok(Self {
            train,
            validation,
            test: pool - validation,
        })
    }

    pub fn total(&self) -> usize {
        self.train + self.validation + self.test
    }
}

/// The six arrays produced by [`split_data`]
#[derive(Debug, Clone)]
pub struct DataSplits<A, B, D: Dimension, E: Dimension> {
    pub train_features: Array<A, D>,
    pub valid_features: Array<A, D>,
    pub test_features: Array<A, D>,
    pub train_labels: Array<B, E>,
    pub valid_labels: Array<B, E>,
    pub test_labels: Array<B, E>,
}

impl<A, B, D: Dimension, E: Dimension> DataSplits<A, B, D, E> {
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train_labels.len_of(Axis(0)),
            validation: self.valid_labels.len_of(Axis(0)),
            test: self.test_labels.len_of(Axis(0)),
        }
    }
}

fn rows<A, S, D>(array: &ArrayBase<S, D>, start: usize, end: usize) -> Array<A, D>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    array.slice_axis(Axis(0), Slice::from(start..end)).to_owned()
}

/// Partition paired features and labels into train, validation and test.
///
/// `test_size` is the combined validation + test proportion and must lie in
/// the open interval `(0, 1)`. The first `floor((1 - test_size) * N)` rows
/// form the training split; the remaining pool is divided per `policy`.
pub fn split_data<A, B, S, T, D, E>(
    features: &ArrayBase<S, D>,
    labels: &ArrayBase<T, E>,
    test_size: f64,
    policy: SplitPolicy,
) -> Result<DataSplits<A, B, D, E>>
where
    A: Clone,
    B: Clone,
    S: Data<Elem = A>,
    T: Data<Elem = B>,
    D: Dimension,
    E: Dimension,
{
    if features.ndim() == 0 || labels.ndim() == 0 {
        return Err(PrepError::InvalidShape("cannot split zero-dimensional arrays".to_string()));
    }
    let n = features.len_of(Axis(0));
    let m = labels.len_of(Axis(0));
    if n != m {
        return Err(PrepError::length_mismatch("features vs labels", n, m));
    }

    let sizes = SplitSizes::compute(n, test_size, policy)?;
    let valid_end = sizes.train + sizes.validation;

    tracing::debug!(
        "Splitting {} rows (test_size={}, policy={}): train={}, valid={}, test={}",
        n,
        test_size,
        policy,
        sizes.train,
        sizes.validation,
        sizes.test
    );

    Ok(DataSplits {
        train_features: rows(features, 0, sizes.train),
        valid_features: rows(features, sizes.train, valid_end),
        test_features: rows(features, valid_end, n),
        train_labels: rows(labels, 0, sizes.train),
        valid_labels: rows(labels, sizes.train, valid_end),
        test_labels: rows(labels, valid_end, n),
    })
}

/// K-fold cross-validation index generator
///
/// Test folds are contiguous blocks of the (optionally shuffled) index range;
/// the first `n % k` folds receive one extra sample.
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
    seed: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits, seed: None }
    }

    /// Shuffle indices with a seeded generator before folding.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Generate `(train_indices, test_indices)` for each fold.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 || self.n_splits > n_samples {
            return Err(PrepError::InvalidFolds {
                folds: self.n_splits,
                samples: n_samples,
            });
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if let Some(seed) = self.seed {
            indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        }

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut result = Vec::with_capacity(self.n_splits);
        let mut start = 0;

        for i in 0..self.n_splits {
            let current = if i < remainder { fold_size + 1 } else { fold_size };
            let end = start + current;

            let test_indices = indices[start..end].to_vec();
            let mut train_indices = Vec::with_capacity(n_samples - current);
            train_indices.extend_from_slice(&indices[..start]);
            train_indices.extend_from_slice(&indices[end..]);

            result.push((train_indices, test_indices));
            start = end;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use proptest::prelude::*;

    fn dataset(n: usize) -> (Array2<f32>, Array1<usize>) {
        let features = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32);
        let labels = (0..n).collect();
        (features, labels)
    }

    #[test]
    fn test_legacy_split_hundred_rows() {
        let (x, y) = dataset(100);
        let splits = split_data(&x, &y, 0.4, SplitPolicy::Legacy).unwrap();

        assert_eq!(
            splits.sizes(),
            SplitSizes { train: 60, validation: 30, test: 10 }
        );
        assert_eq!(splits.train_features.nrows(), 60);
        assert_eq!(splits.valid_features.nrows(), 30);
        assert_eq!(splits.test_features.nrows(), 10);

        // Order is preserved
        assert_eq!(splits.train_labels[0], 0);
        assert_eq!(splits.valid_labels[0], 60);
        assert_eq!(splits.test_labels[0], 90);
        assert_eq!(splits.test_features[[9, 1]], 199.0);
    }

    #[test]
    fn test_pool_half_split_hundred_rows() {
        let (x, y) = dataset(100);
        let splits = split_data(&x, &y, 0.4, SplitPolicy::PoolHalf).unwrap();
        assert_eq!(
            splits.sizes(),
            SplitSizes { train: 60, validation: 20, test: 20 }
        );
    }

    #[test]
    fn test_legacy_half_clamped_to_pool() {
        // train = 80, half = 40 > pool of 20: validation takes the whole pool
        let sizes = SplitSizes::compute(100, 0.2, SplitPolicy::Legacy).unwrap();
        assert_eq!(sizes, SplitSizes { train: 80, validation: 20, test: 0 });
    }

    #[test]
    fn test_policies_agree_at_half() {
        let legacy = SplitSizes::compute(100, 0.5, SplitPolicy::Legacy).unwrap();
        let pool = SplitSizes::compute(100, 0.5, SplitPolicy::PoolHalf).unwrap();
        assert_eq!(legacy, pool);
    }

    #[test]
    fn test_invalid_ratio() {
        let (x, y) = dataset(10);
        for bad in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                split_data(&x, &y, bad, SplitPolicy::Legacy),
                Err(PrepError::InvalidSplitRatio(_))
            ));
        }
    }

    #[test]
    fn test_length_mismatch() {
        let (x, _) = dataset(10);
        let y: Array1<usize> = (0..9).collect();
        assert!(matches!(
            split_data(&x, &y, DEFAULT_TEST_SIZE, SplitPolicy::Legacy),
            Err(PrepError::LengthMismatch { left: 10, right: 9, .. })
        ));
    }

    #[test]
    fn test_split_policy_parse() {
        assert_eq!("legacy".parse::<SplitPolicy>().unwrap(), SplitPolicy::Legacy);
        assert_eq!("Pool-Half".parse::<SplitPolicy>().unwrap(), SplitPolicy::PoolHalf);
        assert!("thirds".parse::<SplitPolicy>().is_err());
        assert_eq!(SplitPolicy::PoolHalf.to_string(), "pool-half");
    }

    #[test]
    fn test_kfold_covers_every_index_once() {
        let folds = KFold::new(3).split(10).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].1.len(), 4);
        assert_eq!(folds[1].1.len(), 3);
        assert_eq!(folds[2].1.len(), 3);

        let mut all_test: Vec<usize> = folds.iter().flat_map(|(_, t)| t.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..10).collect::<Vec<_>>());

        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), 10);
            assert!(test.iter().all(|i| !train.contains(i)));
        }
    }

    #[test]
    fn test_kfold_seeded_shuffle_is_reproducible() {
        let a = KFold::new(5).with_shuffle_seed(9).split(20).unwrap();
        let b = KFold::new(5).with_shuffle_seed(9).split(20).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, KFold::new(5).split(20).unwrap());
    }

    #[test]
    fn test_kfold_invalid() {
        assert!(KFold::new(1).split(10).is_err());
        assert!(KFold::new(11).split(10).is_err());
    }

    proptest! {
        #[test]
        fn prop_split_sizes_cover_all_rows(n in 0usize..500, test_size in 0.01f64..0.99) {
            let (x, y) = dataset(n);
            for policy in [SplitPolicy::Legacy, SplitPolicy::PoolHalf] {
                let splits = split_data(&x, &y, test_size, policy).unwrap();
                let sizes = splits.sizes();
                prop_assert_eq!(sizes.total(), n);
                prop_assert_eq!(sizes.train, ((1.0 - test_size) * n as f64).floor() as usize);
                prop_assert_eq!(splits.valid_features.nrows(), sizes.validation);
                prop_assert_eq!(splits.test_features.nrows(), sizes.test);
            }
        }
    }
}
