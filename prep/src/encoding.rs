// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! One-hot label encoding

use crate::error::{PrepError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Encode a class index as a one-hot vector of length `num_classes`.
pub fn int_to_one_hot(class: usize, num_classes: usize) -> Result<Array1<f32>> {
    if class >= num_classes {
        return Err(PrepError::ClassOutOfRange { class, num_classes });
    }
    let mut x = Array1::zeros(num_classes);
    x[class] = 1.0;
    Ok(x)
}

/// Encode a label sequence as an `n x num_classes` matrix, one row per label.
pub fn labels_to_one_hot(labels: &[usize], num_classes: usize) -> Result<Array2<f32>> {
    let mut out = Array2::zeros((labels.len(), num_classes));
    for (mut row, &class) in out.axis_iter_mut(Axis(0)).zip(labels) {
        if class >= num_classes {
            return Err(PrepError::ClassOutOfRange { class, num_classes });
        }
        row[class] = 1.0;
    }
    Ok(out)
}

/// Index of the largest entry; the first one wins on ties. `None` for an empty row.
pub fn one_hot_to_int(row: ArrayView1<'_, f32>) -> Option<usize> {
    row.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Decode every row of a one-hot (or score) matrix by argmax.
pub fn decode_one_hot(matrix: &Array2<f32>) -> Result<Vec<usize>> {
    if matrix.ncols() == 0 {
        return Err(PrepError::InvalidShape("one-hot matrix has no columns".to_string()));
    }
    Ok(matrix
        .axis_iter(Axis(0))
        .filter_map(one_hot_to_int)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn test_int_to_one_hot() {
        let v = int_to_one_hot(2, 4).unwrap();
        assert_eq!(v, array![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_class() {
        let err = int_to_one_hot(4, 4).unwrap_err();
        assert!(matches!(err, PrepError::ClassOutOfRange { class: 4, num_classes: 4 }));
        assert!(labels_to_one_hot(&[0, 1, 9], 3).is_err());
    }

    #[test]
    fn test_labels_to_one_hot_matrix() {
        let m = labels_to_one_hot(&[1, 0, 2], 3).unwrap();
        assert_eq!(m.shape(), &[3, 3]);
        assert_eq!(m.row(0), array![0.0, 1.0, 0.0]);
        assert_eq!(decode_one_hot(&m).unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn test_decode_scores_by_argmax() {
        let scores = array![[0.1, 0.7, 0.2], [0.5, 0.5, 0.0]];
        assert_eq!(decode_one_hot(&scores).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_decode_rejects_empty_columns() {
        let m = Array2::<f32>::zeros((2, 0));
        assert!(decode_one_hot(&m).is_err());
    }

    proptest! {
        #[test]
        fn prop_one_hot_round_trip((num_classes, class) in (1usize..32).prop_flat_map(|n| (Just(n), 0..n))) {
            let v = int_to_one_hot(class, num_classes).unwrap();
            prop_assert_eq!(v.len(), num_classes);
            prop_assert_eq!(v.iter().filter(|&&x| x == 1.0).count(), 1);
            prop_assert_eq!(v.iter().filter(|&&x| x == 0.0).count(), num_classes - 1);
            prop_assert_eq!(v[class], 1.0);
            prop_assert_eq!(one_hot_to_int(v.view()), Some(class));
        }
    }
}
