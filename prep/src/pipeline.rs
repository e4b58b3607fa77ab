// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible data preparation pipeline
//!
//! Orchestrates:
//! - Label validation against the configured class count
//! - Seeded shuffling of features and labels
//! - Train / validation / test splitting
//! - Optional one-hot label encoding
//! - Results serialization (CSV splits plus a JSON summary)

use crate::config::Settings;
use crate::dataset::{label_distribution, write_csv, LabeledDataset};
use crate::encoding::labels_to_one_hot;
use crate::error::{PrepError, Result};
use crate::shuffle::Shuffler;
use crate::split::{split_data, DataSplits, KFold, SplitPolicy, SplitSizes, DEFAULT_TEST_SIZE};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Ix1, Ix2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Configuration for the preparation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationConfig {
    /// Combined validation + test proportion
    pub test_size: f64,
    pub split_policy: SplitPolicy,
    /// Also produce one-hot label matrices
    pub one_hot: bool,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            split_policy: SplitPolicy::Legacy,
            one_hot: false,
        }
    }
}

/// Per-split label counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitDistributions {
    pub train: BTreeMap<usize, usize>,
    pub validation: BTreeMap<usize, usize>,
    pub test: BTreeMap<usize, usize>,
}

/// Serializable record of one preparation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSummary {
    pub domain: String,
    pub seed: u64,
    pub n_classes: usize,
    pub config: PreparationConfig,
    pub total_samples: usize,
    pub sizes: SplitSizes,
    pub label_distribution: SplitDistributions,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// One-hot label matrices for each split
#[derive(Debug, Clone)]
pub struct OneHotLabels {
    pub train: Array2<f32>,
    pub validation: Array2<f32>,
    pub test: Array2<f32>,
}

/// Output of [`PreparationPipeline::run`]
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub feature_names: Vec<String>,
    pub splits: DataSplits<f32, usize, Ix2, Ix1>,
    pub one_hot: Option<OneHotLabels>,
    pub summary: SplitSummary,
}

fn distribution(labels: &Array1<usize>) -> BTreeMap<usize, usize> {
    label_distribution(labels.iter().copied())
}

fn one_hot(labels: &Array1<usize>, n_classes: usize) -> Result<Array2<f32>> {
    labels_to_one_hot(&labels.to_vec(), n_classes)
}

impl PreparedData {
    /// Write `train.csv`, `valid.csv`, `test.csv`, optional one-hot label
    /// files and `summary.json` into `dir`. Returns the written paths.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| PrepError::io(dir, e))?;
        let mut written = Vec::new();

        let parts = [
            ("train", &self.splits.train_features, &self.splits.train_labels),
            ("valid", &self.splits.valid_features, &self.splits.valid_labels),
            ("test", &self.splits.test_features, &self.splits.test_labels),
        ];
        for (name, features, labels) in parts {
            let path = dir.join(format!("{}.csv", name));
            write_csv(&path, &self.feature_names, features.rows().into_iter(), labels.view())?;
            written.push(path);
        }

        if let Some(one_hot) = &self.one_hot {
            for (name, matrix) in [
                ("train", &one_hot.train),
                ("valid", &one_hot.validation),
                ("test", &one_hot.test),
            ] {
                let path = dir.join(format!("{}_onehot.csv", name));
                write_matrix(&path, matrix)?;
                written.push(path);
            }
        }

        let summary_path = dir.join("summary.json");
        let json = serde_json::to_string_pretty(&self.summary)?;
        std::fs::write(&summary_path, json).map_err(|e| PrepError::io(&summary_path, e))?;
        written.push(summary_path);

        tracing::info!("Saved {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

fn write_matrix(path: &Path, matrix: &Array2<f32>) -> Result<()> {
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);

    let header: Vec<String> = (0..matrix.ncols()).map(|c| format!("class_{}", c)).collect();
    writer.write_record(&header)?;
    for row in matrix.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }

    writer.flush().map_err(|e| PrepError::io(path, e))?;
    Ok(())
}

/// Main preparation pipeline
pub struct PreparationPipeline {
    settings: Settings,
    config: PreparationConfig,
}

impl PreparationPipeline {
    pub fn new(settings: Settings, config: PreparationConfig) -> Self {
        Self { settings, config }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shuffle and split a dataset.
    pub fn run(&self, dataset: LabeledDataset) -> Result<PreparedData> {
        if dataset.is_empty() {
            return Err(PrepError::EmptyInput("dataset has no samples".to_string()));
        }
        let n_classes = self.settings.n_classes;
        if let Some(&class) = dataset.labels.iter().find(|&&l| l >= n_classes) {
            return Err(PrepError::ClassOutOfRange { class, num_classes: n_classes });
        }

        tracing::info!(
            "Preparing {} samples (seed={}, test_size={}, policy={})",
            dataset.len(),
            self.settings.random_seed,
            self.config.test_size,
            self.config.split_policy
        );

        let mut shuffler = Shuffler::from_seed(self.settings.random_seed);
        let (features, labels) = shuffler.shuffle_pair(&dataset.features, &dataset.labels)?;
        let splits = split_data(&features, &labels, self.config.test_size, self.config.split_policy)?;
        let sizes = splits.sizes();

        tracing::info!(
            "Split sizes: train={}, valid={}, test={}",
            sizes.train,
            sizes.validation,
            sizes.test
        );

        let one_hot_labels = if self.config.one_hot {
            Some(OneHotLabels {
                train: one_hot(&splits.train_labels, n_classes)?,
                validation: one_hot(&splits.valid_labels, n_classes)?,
                test: one_hot(&splits.test_labels, n_classes)?,
            })
        } else {
            None
        };

        let summary = SplitSummary {
            domain: self.settings.domain.clone(),
            seed: self.settings.random_seed,
            n_classes,
            config: self.config.clone(),
            total_samples: dataset.len(),
            sizes,
            label_distribution: SplitDistributions {
                train: distribution(&splits.train_labels),
                validation: distribution(&splits.valid_labels),
                test: distribution(&splits.test_labels),
            },
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        Ok(PreparedData {
            feature_names: dataset.feature_names,
            splits,
            one_hot: one_hot_labels,
            summary,
        })
    }

    /// Seeded K-fold indices using the configured `cross validation k`.
    pub fn folds(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        KFold::new(self.settings.cross_val_k)
            .with_shuffle_seed(self.settings.random_seed)
            .split(n_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE_CONFIG;

    fn settings() -> Settings {
        Settings::from_ini_str(SAMPLE_CONFIG).expect("sample config should parse")
    }

    /// Feature column 0 encodes the row id, label is `id % 5`.
    fn dataset(n: usize) -> LabeledDataset {
        let features = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f32 } else { 0.5 });
        let labels = (0..n).map(|i| i % 5).collect();
        LabeledDataset::new(features, labels).unwrap()
    }

    #[test]
    fn test_pipeline_sizes_and_alignment() {
        let pipeline = PreparationPipeline::new(settings(), PreparationConfig::default());
        let prepared = pipeline.run(dataset(100)).expect("Pipeline should succeed");

        assert_eq!(prepared.summary.sizes, SplitSizes { train: 60, validation: 30, test: 10 });
        assert_eq!(prepared.summary.total_samples, 100);

        let s = &prepared.splits;
        for (row, &label) in s.train_features.rows().into_iter().zip(s.train_labels.iter()) {
            assert_eq!(row[0] as usize % 5, label);
        }

        let train_total: usize = prepared.summary.label_distribution.train.values().sum();
        assert_eq!(train_total, 60);
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let pipeline = PreparationPipeline::new(settings(), PreparationConfig::default());
        let a = pipeline.run(dataset(50)).unwrap();
        let b = pipeline.run(dataset(50)).unwrap();
        assert_eq!(a.splits.train_labels, b.splits.train_labels);
        assert_eq!(a.splits.test_features, b.splits.test_features);

        // And actually shuffles
        let ids: Vec<f32> = a.splits.train_features.column(0).to_vec();
        assert_ne!(ids, (0..ids.len()).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_pipeline_rejects_out_of_range_labels() {
        let features = Array2::zeros((3, 1));
        let ds = LabeledDataset::new(features, Array1::from(vec![0, 1, 7])).unwrap();
        let pipeline = PreparationPipeline::new(settings(), PreparationConfig::default());
        assert!(matches!(
            pipeline.run(ds),
            Err(PrepError::ClassOutOfRange { class: 7, num_classes: 5 })
        ));
    }

    #[test]
    fn test_pipeline_rejects_empty_dataset() {
        let pipeline = PreparationPipeline::new(settings(), PreparationConfig::default());
        let ds = LabeledDataset::new(Array2::zeros((0, 2)), Array1::zeros(0)).unwrap();
        assert!(matches!(pipeline.run(ds), Err(PrepError::EmptyInput(_))));
    }

    #[test]
    fn test_pipeline_one_hot_and_save() {
        let config = PreparationConfig {
            test_size: 0.5,
            split_policy: SplitPolicy::PoolHalf,
            one_hot: true,
        };
        let pipeline = PreparationPipeline::new(settings(), config);
        let prepared = pipeline.run(dataset(20)).unwrap();

        let one_hot = prepared.one_hot.as_ref().expect("one-hot labels requested");
        assert_eq!(one_hot.train.shape(), &[10, 5]);
        assert_eq!(one_hot.validation.nrows() + one_hot.test.nrows(), 10);

        let dir = tempfile::tempdir().unwrap();
        let written = prepared.save(dir.path()).unwrap();
        assert_eq!(written.len(), 7);

        let train = LabeledDataset::from_csv(&dir.path().join("train.csv"), "label").unwrap();
        assert_eq!(train.labels, prepared.splits.train_labels);

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["seed"], 1337);
        assert_eq!(summary["config"]["split_policy"], "pool-half");
        assert_eq!(summary["sizes"]["train"], 10);
    }

    #[test]
    fn test_folds_use_configured_k() {
        let pipeline = PreparationPipeline::new(settings(), PreparationConfig::default());
        let folds = pipeline.folds(100).unwrap();
        assert_eq!(folds.len(), 10);
        assert!(folds.iter().all(|(train, test)| train.len() == 90 && test.len() == 10));
    }
}
