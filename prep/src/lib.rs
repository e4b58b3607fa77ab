// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Preprocessing and scoring utilities for text-classification experiments
//!
//! This crate provides:
//! - Typed experiment settings loaded from INI files
//! - Classification metrics (accuracy, precision, recall, F1) with weighted,
//!   macro and micro averaging over single batches or batches of batches
//! - Seeded, alignment-preserving shuffling of paired arrays
//! - Train / validation / test splitting and K-fold indices
//! - One-hot label encoding
//! - Download and extraction of word vectors and dataset archives
//! - A reproducible preparation pipeline tying the pieces together

pub mod config;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod provision;
pub mod shuffle;
pub mod split;

pub use config::Settings;
pub use dataset::{LabeledDataset, PredictionBatches};
pub use encoding::{decode_one_hot, int_to_one_hot, labels_to_one_hot};
pub use error::{PrepError, Result};
pub use metrics::{calc_metric, calc_metric_batches, Average, ClassificationReport, MetricAggregator, Scores};
pub use pipeline::{PreparationConfig, PreparationPipeline, PreparedData};
pub use provision::{download, ensure_directories, extract_archive, Provisioner, RemoteResources, ResourceLayout};
pub use shuffle::{shuffle_data, Shuffler};
pub use split::{split_data, DataSplits, KFold, SplitPolicy};
