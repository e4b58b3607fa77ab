// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Labeled feature datasets, prediction files and their CSV representation

use crate::encoding::labels_to_one_hot;
use crate::error::{PrepError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

/// Default name of the label column in CSV files.
pub const DEFAULT_LABEL_COLUMN: &str = "label";

/// Paired feature rows and class labels of equal length
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    pub feature_names: Vec<String>,
    pub features: Array2<f32>,
    pub labels: Array1<usize>,
}

impl LabeledDataset {
    /// Pair features with labels, naming feature columns `f0..fN`.
    pub fn new(features: Array2<f32>, labels: Array1<usize>) -> Result<Self> {
        let names = (0..features.ncols()).map(|i| format!("f{}", i)).collect();
        Self::with_feature_names(names, features, labels)
    }

    pub fn with_feature_names(
        feature_names: Vec<String>,
        features: Array2<f32>,
        labels: Array1<usize>,
    ) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(PrepError::length_mismatch(
                "features vs labels",
                features.nrows(),
                labels.len(),
            ));
        }
        if feature_names.len() != features.ncols() {
            return Err(PrepError::length_mismatch(
                "feature names vs feature columns",
                feature_names.len(),
                features.ncols(),
            ));
        }
        Ok(Self {
            feature_names,
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Load a headered CSV; `label_column` holds class indices, every other
    /// column is an `f32` feature.
    pub fn from_csv(path: &Path, label_column: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| PrepError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader.headers()?.clone();
        let label_idx = headers
            .iter()
            .position(|h| h.trim() == label_column)
            .ok_or_else(|| {
                PrepError::InvalidShape(format!(
                    "{} has no '{}' column",
                    path.display(),
                    label_column
                ))
            })?;
        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        let mut values: Vec<f32> = Vec::new();
        let mut labels: Vec<usize> = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            for (col, cell) in record.iter().enumerate() {
                let cell = cell.trim();
                if col == label_idx {
                    labels.push(cell.parse().map_err(|_| invalid_cell(path, row, &headers[col], cell))?);
                } else {
                    values.push(cell.parse().map_err(|_| invalid_cell(path, row, &headers[col], cell))?);
                }
            }
        }

        let features = Array2::from_shape_vec((labels.len(), feature_names.len()), values)
            .map_err(|e| PrepError::InvalidShape(e.to_string()))?;

        tracing::info!(
            "Loaded {} samples with {} features from {}",
            labels.len(),
            feature_names.len(),
            path.display()
        );

        Self::with_feature_names(feature_names, features, Array1::from(labels))
    }

    /// Write features and labels back as a headered CSV.
    pub fn to_csv(&self, path: &Path) -> Result<()> {
        write_csv(
            path,
            &self.feature_names,
            self.features.rows().into_iter(),
            self.labels.view(),
        )
    }

    /// Count of samples per class
    pub fn label_distribution(&self) -> BTreeMap<usize, usize> {
        label_distribution(self.labels.iter().copied())
    }

    /// Labels as an `n x num_classes` one-hot matrix.
    pub fn one_hot_labels(&self, num_classes: usize) -> Result<Array2<f32>> {
        labels_to_one_hot(&self.labels.to_vec(), num_classes)
    }
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    #[serde(rename = "true")]
    truth: usize,
    #[serde(rename = "pred")]
    predicted: usize,
    #[serde(default)]
    batch: Option<String>,
}

/// Ground truth and predictions grouped by batch id, in order of first
/// appearance. A file without batch ids forms a single unnamed batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionBatches {
    pub ids: Vec<Option<String>>,
    pub trues: Vec<Vec<usize>>,
    pub preds: Vec<Vec<usize>>,
}

impl PredictionBatches {
    /// Read a CSV with `true` and `pred` columns and an optional `batch`
    /// column. Either every row carries a batch id or none does.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PrepError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut batches = Self::default();
        let mut index: HashMap<Option<String>, usize> = HashMap::new();

        for result in reader.deserialize::<PredictionRow>() {
            let row = result?;
            let slot = match index.get(&row.batch) {
                Some(&slot) => slot,
                None => {
                    batches.ids.push(row.batch.clone());
                    batches.trues.push(Vec::new());
                    batches.preds.push(Vec::new());
                    index.insert(row.batch.clone(), batches.ids.len() - 1);
                    batches.ids.len() - 1
                }
            };
            batches.trues[slot].push(row.truth);
            batches.preds[slot].push(row.predicted);
        }

        if batches.ids.len() > 1 && batches.ids.contains(&None) {
            return Err(PrepError::MixedBatchIds(path.to_path_buf()));
        }

        tracing::debug!(
            "Read {} predictions in {} batch(es) from {}",
            batches.samples(),
            batches.len(),
            path.display()
        );
        Ok(batches)
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Total number of scored rows
    pub fn samples(&self) -> usize {
        self.trues.iter().map(Vec::len).sum()
    }

    /// Whether rows carry batch ids and should be scored batch by batch.
    pub fn is_multi_batch(&self) -> bool {
        self.ids.iter().any(Option::is_some)
    }
}

fn invalid_cell(path: &Path, row: usize, column: &str, value: &str) -> PrepError {
    PrepError::InvalidShape(format!(
        "{}: row {} column '{}' has unparseable value '{}'",
        path.display(),
        row + 1,
        column,
        value
    ))
}

/// Count occurrences of each label.
pub fn label_distribution(labels: impl IntoIterator<Item = usize>) -> BTreeMap<usize, usize> {
    let mut dist = BTreeMap::new();
    for label in labels {
        *dist.entry(label).or_insert(0) += 1;
    }
    dist
}

pub(crate) fn write_csv<'a>(
    path: &Path,
    feature_names: &[String],
    rows: impl Iterator<Item = ArrayView1<'a, f32>>,
    labels: ArrayView1<'_, usize>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header: Vec<&str> = feature_names.iter().map(String::as_str).collect();
    header.push(DEFAULT_LABEL_COLUMN);
    writer.write_record(&header)?;

    for (row, label) in rows.zip(labels.iter()) {
        let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        record.push(label.to_string());
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| PrepError::io(path, e))?;
    Ok(())
}
