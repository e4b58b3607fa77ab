// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types shared by every preprocessing module.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading settings, preparing data or scoring predictions.
#[derive(Debug, Error)]
pub enum PrepError {
    /// A required configuration section is absent.
    #[error("missing configuration section [{0}]")]
    MissingSection(String),

    /// A required key is absent from its section.
    #[error("missing configuration key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    /// A configuration value could not be converted to its declared type.
    #[error("invalid value '{value}' for '{key}' in section [{section}]: expected {expected}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        expected: &'static str,
    },

    /// The configuration text itself is malformed.
    #[error("configuration syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Two paired sequences disagree in length.
    #[error("length mismatch in {context}: {left} vs {right}")]
    LengthMismatch {
        context: String,
        left: usize,
        right: usize,
    },

    /// Truth and prediction batch sequences disagree in count.
    #[error("batch count mismatch: {truth} true batches vs {predicted} predicted batches")]
    BatchCountMismatch { truth: usize, predicted: usize },

    /// Truth and prediction disagree in length within one batch.
    #[error("batch {batch}: {truth} true labels vs {predicted} predicted labels")]
    BatchLengthMismatch {
        batch: usize,
        truth: usize,
        predicted: usize,
    },

    /// A predictions file mixes rows with and without a batch id.
    #[error("{}: some rows have a batch id and some do not", .0.display())]
    MixedBatchIds(PathBuf),

    /// An operation received nothing to work on.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// An array has a shape the operation cannot handle.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// A class index is outside `[0, num_classes)`.
    #[error("class index {class} out of range for {num_classes} classes")]
    ClassOutOfRange { class: usize, num_classes: usize },

    /// Split fraction outside the open interval (0, 1).
    #[error("invalid split ratio: {0} (must be in (0, 1))")]
    InvalidSplitRatio(f64),

    /// Fold count unusable for the number of samples.
    #[error("invalid fold count {folds} for {samples} samples")]
    InvalidFolds { folds: usize, samples: usize },

    /// Filesystem failure, with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote fetch failure.
    #[error("download of {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// Archive could not be read or unpacked.
    #[error("archive error in {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// Downloaded file does not match its expected digest.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Malformed tabular data.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PrepError {
    /// Wraps an I/O error with the path it concerns.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a length mismatch error.
    #[must_use]
    pub fn length_mismatch(context: impl Into<String>, left: usize, right: usize) -> Self {
        Self::LengthMismatch {
            context: context.into(),
            left,
            right,
        }
    }

    /// Creates an archive error.
    #[must_use]
    pub fn archive(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Creates an HTTP error.
    #[must_use]
    pub fn http(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Http {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error stems from the configuration file.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSection(_)
                | Self::MissingKey { .. }
                | Self::InvalidValue { .. }
                | Self::Syntax { .. }
        )
    }
}

/// Result type for preprocessing operations.
pub type Result<T> = std::result::Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_names_key_and_section() {
        let err = PrepError::MissingKey {
            section: "MODEL".to_string(),
            key: "batch size".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch size"));
        assert!(msg.contains("[MODEL]"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_io_error_carries_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = PrepError::io("/tmp/glove.zip", source);
        assert!(err.to_string().contains("/tmp/glove.zip"));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_batch_length_mismatch_message() {
        let err = PrepError::BatchLengthMismatch {
            batch: 3,
            truth: 10,
            predicted: 9,
        };
        assert!(err.to_string().contains("batch 3"));
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: PrepError = json_err.into();
        assert!(matches!(err, PrepError::Serialization(_)));
    }
}
