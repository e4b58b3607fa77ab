// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Aligned shuffling of logically linked arrays
//!
//! Every array is reordered along its first axis by the same permutation, so
//! row `i` of each output still describes the same original sample. The random
//! generator is always passed in explicitly; seed it once per run from
//! `Settings::random_seed` for reproducible orderings.

use crate::error::{PrepError, Result};
use ndarray::{Array, ArrayBase, Axis, Data, RemoveAxis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Draw a random permutation of `0..n`.
pub fn permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices
}

fn leading_len<S, D>(array: &ArrayBase<S, D>, what: &str) -> Result<usize>
where
    S: Data,
    D: RemoveAxis,
{
    if array.ndim() == 0 {
        return Err(PrepError::InvalidShape(format!("{} is zero-dimensional", what)));
    }
    Ok(array.len_of(Axis(0)))
}

/// Reorder every array with one shared permutation.
///
/// All arrays must have the same length along axis 0.
pub fn shuffle_data<A, S, D, R>(arrays: &[ArrayBase<S, D>], rng: &mut R) -> Result<Vec<Array<A, D>>>
where
    A: Clone,
    S: Data<Elem = A>,
    D: RemoveAxis,
    R: Rng + ?Sized,
{
    let Some(first) = arrays.first() else {
        return Ok(Vec::new());
    };
    let n = leading_len(first, "array 0")?;
    for (i, array) in arrays.iter().enumerate().skip(1) {
        let len = leading_len(array, &format!("array {}", i))?;
        if len != n {
            return Err(PrepError::length_mismatch(format!("array 0 vs array {}", i), n, len));
        }
    }

    let indices = permutation(n, rng);
    Ok(arrays.iter().map(|a| a.select(Axis(0), &indices)).collect())
}

/// Shuffle a feature array and its labels together.
pub fn shuffle_pair<A, B, S, T, D, E, R>(
    features: &ArrayBase<S, D>,
    labels: &ArrayBase<T, E>,
    rng: &mut R,
) -> Result<(Array<A, D>, Array<B, E>)>
where
    A: Clone,
    B: Clone,
    S: Data<Elem = A>,
    T: Data<Elem = B>,
    D: RemoveAxis,
    E: RemoveAxis,
    R: Rng + ?Sized,
{
    let n = leading_len(features, "features")?;
    let m = leading_len(labels, "labels")?;
    if n != m {
        return Err(PrepError::length_mismatch("features vs labels", n, m));
    }

    let indices = permutation(n, rng);
    Ok((features.select(Axis(0), &indices), labels.select(Axis(0), &indices)))
}

/// Owned random generator handle for a preprocessing run
#[derive(Debug, Clone)]
pub struct Shuffler {
    rng: ChaCha8Rng,
}

impl Shuffler {
    /// Reproducible shuffler.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Shuffler seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        permutation(n, &mut self.rng)
    }

    pub fn shuffle<A, S, D>(&mut self, arrays: &[ArrayBase<S, D>]) -> Result<Vec<Array<A, D>>>
    where
        A: Clone,
        S: Data<Elem = A>,
        D: RemoveAxis,
    {
        shuffle_data(arrays, &mut self.rng)
    }

    pub fn shuffle_pair<A, B, S, T, D, E>(
        &mut self,
        features: &ArrayBase<S, D>,
        labels: &ArrayBase<T, E>,
    ) -> Result<(Array<A, D>, Array<B, E>)>
    where
        A: Clone,
        B: Clone,
        S: Data<Elem = A>,
        T: Data<Elem = B>,
        D: RemoveAxis,
        E: RemoveAxis,
    {
        shuffle_pair(features, labels, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_order() {
        let mut a = Shuffler::from_seed(42);
        let mut b = Shuffler::from_seed(42);
        assert_eq!(a.permutation(50), b.permutation(50));

        let mut c = Shuffler::from_seed(43);
        assert_ne!(Shuffler::from_seed(42).permutation(50), c.permutation(50));
    }

    #[test]
    fn test_pair_alignment() {
        let features = Array2::from_shape_fn((20, 3), |(i, j)| (i * 10 + j) as f32);
        let labels: Array1<usize> = (0..20).collect();

        let (sf, sl) = Shuffler::from_seed(7).shuffle_pair(&features, &labels).unwrap();

        for (row, &label) in sf.outer_iter().zip(sl.iter()) {
            assert_eq!(row[0], (label * 10) as f32);
            assert_eq!(row[2], (label * 10 + 2) as f32);
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let a = array![1, 2, 3];
        let b = array![1, 2];
        let err = Shuffler::from_seed(0).shuffle(&[a, b]).unwrap_err();
        assert!(matches!(err, PrepError::LengthMismatch { left: 3, right: 2, .. }));

        let features = Array2::<f32>::zeros((4, 2));
        let labels = Array1::<usize>::zeros(5);
        assert!(Shuffler::from_seed(0).shuffle_pair(&features, &labels).is_err());
    }

    #[test]
    fn test_empty_inputs() {
        let none: Vec<Array1<u8>> = Vec::new();
        assert!(Shuffler::from_seed(0).shuffle(&none).unwrap().is_empty());

        let empty = Array1::<u8>::zeros(0);
        let out = Shuffler::from_seed(0).shuffle(&[empty]).unwrap();
        assert_eq!(out[0].len(), 0);
    }

    #[test]
    fn test_entropy_shuffler_is_permutation() {
        let mut perm = Shuffler::from_entropy().permutation(10);
        perm.sort_unstable();
        assert_eq!(perm, (0..10).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn prop_shuffle_preserves_rows_and_alignment(n in 0usize..200, k in 1usize..5, seed in any::<u64>()) {
            let arrays: Vec<Array2<u64>> = (0..k)
                .map(|a| Array2::from_shape_fn((n, 2), |(i, j)| (a * 1_000_000 + i * 10 + j) as u64))
                .collect();

            let shuffled = Shuffler::from_seed(seed).shuffle(&arrays).unwrap();
            prop_assert_eq!(shuffled.len(), k);

            for (a, (orig, out)) in arrays.iter().zip(shuffled.iter()).enumerate() {
                let mut before: Vec<Vec<u64>> = orig.outer_iter().map(|r| r.to_vec()).collect();
                let mut after: Vec<Vec<u64>> = out.outer_iter().map(|r| r.to_vec()).collect();
                before.sort();
                after.sort();
                prop_assert_eq!(before, after);

                // Every array's row i must come from the same source row as array 0's.
                for i in 0..n {
                    let source_row = (shuffled[0][[i, 0]] / 10) as usize;
                    prop_assert_eq!(out[[i, 0]], (a * 1_000_000 + source_row * 10) as u64);
                }
            }
        }
    }
}
