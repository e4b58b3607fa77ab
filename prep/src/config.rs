// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Experiment settings loaded from an INI file
//!
//! The file carries two required sections, `MODEL` and `GENERAL`, whose keys
//! are human-readable phrases such as `learning rate` or `batch size`. Keys
//! are matched case-insensitively and a `DEFAULT` section provides fallbacks
//! for every other section.

use crate::error::{PrepError, Result};
use crate::metrics::Average;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

pub const MODEL_SECTION: &str = "MODEL";
pub const GENERAL_SECTION: &str = "GENERAL";
const DEFAULT_SECTION: &str = "DEFAULT";

/// Raw sections and values of an INI document.
#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    defaults: HashMap<String, String>,
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniDocument {
    /// Parse INI text.
    ///
    /// Supports `key = value` and `key: value` pairs, `#`/`;` comment lines
    /// and indented continuation lines. Blank lines inside a continued value
    /// are kept, trailing ones are dropped. Text after a section header's
    /// closing `]` is ignored. Duplicate sections or keys are errors.
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = Self::default();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;
        let mut pending_blank_lines = 0usize;
        let mut seen_default = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                if last_key.is_some() {
                    pending_blank_lines += 1;
                }
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(char::is_whitespace);
            if indented {
                if let (Some(section), Some(key)) = (current.as_deref(), last_key.as_deref()) {
                    if let Some(value) = doc.table_mut(section).get_mut(key) {
                        for _ in 0..=pending_blank_lines {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                    }
                    pending_blank_lines = 0;
                    continue;
                }
            }
            pending_blank_lines = 0;

            if trimmed.starts_with('[') {
                let name = trimmed
                    .strip_prefix('[')
                    .and_then(|s| s.split_once(']'))
                    .map(|(name, _)| name.trim())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| syntax(line_no, format!("malformed section header '{}'", trimmed)))?;

                if name == DEFAULT_SECTION {
                    if seen_default {
                        return Err(syntax(line_no, "duplicate section [DEFAULT]"));
                    }
                    seen_default = true;
                } else if doc.sections.insert(name.to_string(), HashMap::new()).is_some() {
                    return Err(syntax(line_no, format!("duplicate section [{}]", name)));
                }

                current = Some(name.to_string());
                last_key = None;
                continue;
            }

            let section = current
                .as_deref()
                .ok_or_else(|| syntax(line_no, "key/value pair before any section header"))?;

            let split_at = trimmed
                .find(|c: char| c == '=' || c == ':')
                .ok_or_else(|| syntax(line_no, format!("expected 'key = value', got '{}'", trimmed)))?;

            let key = trimmed[..split_at].trim().to_lowercase();
            let value = trimmed[split_at + 1..].trim().to_string();
            if key.is_empty() {
                return Err(syntax(line_no, "empty key"));
            }

            if doc.table_mut(section).insert(key.clone(), value).is_some() {
                return Err(syntax(line_no, format!("duplicate key '{}' in [{}]", key, section)));
            }
            last_key = Some(key);
        }

        Ok(doc)
    }

    fn table_mut(&mut self, section: &str) -> &mut HashMap<String, String> {
        if section == DEFAULT_SECTION {
            &mut self.defaults
        } else {
            self.sections.entry(section.to_string()).or_default()
        }
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Look up a key, falling back to `DEFAULT`. Missing sections are errors,
    /// missing keys are `None`.
    pub fn get_opt(&self, section: &str, key: &str) -> Result<Option<&str>> {
        let table = self
            .sections
            .get(section)
            .ok_or_else(|| PrepError::MissingSection(section.to_string()))?;
        let key = key.to_lowercase();
        Ok(table
            .get(&key)
            .or_else(|| self.defaults.get(&key))
            .map(String::as_str))
    }

    /// Look up a required key.
    pub fn get(&self, section: &str, key: &str) -> Result<&str> {
        self.get_opt(section, key)?.ok_or_else(|| PrepError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Look up a required key and convert it.
    pub fn parse_value<T: FromStr>(&self, section: &str, key: &str, expected: &'static str) -> Result<T> {
        let raw = self.get(section, key)?;
        raw.parse::<T>().map_err(|_| PrepError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            expected,
        })
    }
}

fn syntax(line: usize, message: impl Into<String>) -> PrepError {
    PrepError::Syntax {
        line,
        message: message.into(),
    }
}

/// Typed hyperparameters for one experiment, read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Optimizer learning rate
    pub lr: f64,
    /// Dropout keep probability
    pub dropout: f64,
    pub optimizer: String,
    /// Word-level sequence length
    pub timestep: usize,
    pub word_vector_dim: usize,
    pub char_embeddings_dim: usize,
    pub lstm_hidden: usize,
    pub batch_size: usize,
    /// Dataset domain tag (e.g. "restaurant")
    pub domain: String,
    /// Character-level sequence length
    pub char_timestep: usize,
    /// Early-stopping patience in epochs
    pub early_stopping: usize,
    pub train_epochs: usize,
    pub n_classes: usize,
    /// Seed for every random generator in the run
    pub random_seed: u64,
    /// Fold count for cross validation
    pub cross_val_k: usize,
    /// Overrides the default averaging of both metric modes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_average: Option<Average>,
}

impl Settings {
    /// Read and validate settings from an INI file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PrepError::io(path, e))?;
        let settings = Self::from_ini_str(&text)?;
        tracing::info!(
            "Loaded settings from {} (domain={}, classes={}, seed={})",
            path.display(),
            settings.domain,
            settings.n_classes,
            settings.random_seed
        );
        Ok(settings)
    }

    /// Build settings from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let doc = IniDocument::parse(text)?;
        Self::from_document(&doc)
    }

    /// Build settings from an already parsed document.
    pub fn from_document(doc: &IniDocument) -> Result<Self> {
        for section in [MODEL_SECTION, GENERAL_SECTION] {
            if !doc.has_section(section) {
                return Err(PrepError::MissingSection(section.to_string()));
            }
        }

        const INT: &str = "a non-negative integer";
        const FLOAT: &str = "a decimal number";

        let metric_average = doc
            .get_opt(GENERAL_SECTION, "metric average")?
            .map(|raw| {
                raw.parse::<Average>().map_err(|_| PrepError::InvalidValue {
                    section: GENERAL_SECTION.to_string(),
                    key: "metric average".to_string(),
                    value: raw.to_string(),
                    expected: "one of weighted, macro, micro",
                })
            })
            .transpose()?;

        let settings = Self {
            lr: doc.parse_value(MODEL_SECTION, "learning rate", FLOAT)?,
            dropout: doc.parse_value(MODEL_SECTION, "dropout keep", FLOAT)?,
            optimizer: doc.get(MODEL_SECTION, "optimizer")?.to_string(),
            timestep: doc.parse_value(MODEL_SECTION, "timestep", INT)?,
            word_vector_dim: doc.parse_value(MODEL_SECTION, "word embedding dimension", INT)?,
            char_embeddings_dim: doc.parse_value(MODEL_SECTION, "character embeddings dimension", INT)?,
            lstm_hidden: doc.parse_value(MODEL_SECTION, "lstm hidden state dim", INT)?,
            batch_size: doc.parse_value(MODEL_SECTION, "batch size", INT)?,
            domain: doc.get(GENERAL_SECTION, "domain")?.to_string(),
            char_timestep: doc.parse_value(MODEL_SECTION, "char timestep", INT)?,
            early_stopping: doc.parse_value(MODEL_SECTION, "early stopping", INT)?,
            train_epochs: doc.parse_value(GENERAL_SECTION, "training epochs", INT)?,
            n_classes: doc.parse_value(MODEL_SECTION, "classes", INT)?,
            random_seed: doc.parse_value(MODEL_SECTION, "random seed", INT)?,
            cross_val_k: doc.parse_value(GENERAL_SECTION, "cross validation k", INT)?,
            metric_average,
        };

        settings.validate(doc)?;
        Ok(settings)
    }

    fn validate(&self, doc: &IniDocument) -> Result<()> {
        let positive = [
            (MODEL_SECTION, "classes", self.n_classes),
            (MODEL_SECTION, "batch size", self.batch_size),
        ];
        for (section, key, value) in positive {
            if value == 0 {
                return Err(PrepError::InvalidValue {
                    section: section.to_string(),
                    key: key.to_string(),
                    value: doc.get(section, key)?.to_string(),
                    expected: "a positive integer",
                });
            }
        }
        Ok(())
    }
}
