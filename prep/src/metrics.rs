// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for multi-class classification
//!
//! Two scoring modes are provided:
//! - Single batch: accuracy plus support-weighted precision, recall and F1
//! - Batch of batches: accuracy plus macro precision, recall and F1 for each
//!   batch, averaged arithmetically over the batches
//!
//! Classes are detected from the union of true and predicted labels.

use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Averaging strategy for per-class scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    /// Unweighted mean over classes
    Macro,
    /// Global TP/FP/FN counts
    Micro,
    /// Mean weighted by support (number of true instances per class)
    Weighted,
}

impl FromStr for Average {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "macro" => Ok(Average::Macro),
            "micro" => Ok(Average::Micro),
            "weighted" => Ok(Average::Weighted),
            other => Err(format!("unknown averaging strategy '{}'", other)),
        }
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Average::Macro => "macro",
            Average::Micro => "micro",
            Average::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

/// Per-class counts for one class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ClassCounts {
    /// Number of true instances of the class
    pub fn support(&self) -> usize {
        self.tp + self.fn_
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

/// Multi-class confusion counts keyed by class index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Counts for every class seen in either truth or predictions
    pub classes: BTreeMap<usize, ClassCounts>,
    pub correct: usize,
    pub total: usize,
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth.
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PrepError::length_mismatch(
                "true vs predicted labels",
                y_true.len(),
                y_pred.len(),
            ));
        }
        if y_true.is_empty() {
            return Err(PrepError::EmptyInput("no labels to score".to_string()));
        }

        let mut matrix = Self::default();

        for (&truth, &pred) in y_true.iter().zip(y_pred.iter()) {
            if truth == pred {
                matrix.classes.entry(truth).or_default().tp += 1;
                matrix.correct += 1;
            } else {
                matrix.classes.entry(truth).or_default().fn_ += 1;
                matrix.classes.entry(pred).or_default().fp += 1;
            }
            matrix.total += 1;
        }

        Ok(matrix)
    }

    /// Accuracy: correct / total
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn precision(&self, average: Average) -> f64 {
        self.average_by(average, ClassCounts::precision)
    }

    pub fn recall(&self, average: Average) -> f64 {
        self.average_by(average, ClassCounts::recall)
    }

    pub fn f1_score(&self, average: Average) -> f64 {
        self.average_by(average, ClassCounts::f1_score)
    }

    fn average_by(&self, average: Average, score: fn(&ClassCounts) -> f64) -> f64 {
        if self.classes.is_empty() {
            return 0.0;
        }
        match average {
            Average::Macro => {
                self.classes.values().map(score).sum::<f64>() / self.classes.len() as f64
            }
            Average::Weighted => {
                let total_support: usize = self.classes.values().map(ClassCounts::support).sum();
                if total_support == 0 {
                    return 0.0;
                }
                self.classes
                    .values()
                    .map(|c| score(c) * c.support() as f64)
                    .sum::<f64>()
                    / total_support as f64
            }
            Average::Micro => {
                let pooled = self.classes.values().fold(ClassCounts::default(), |acc, c| ClassCounts {
                    tp: acc.tp + c.tp,
                    fp: acc.fp + c.fp,
                    fn_: acc.fn_ + c.fn_,
                });
                score(&pooled)
            }
        }
    }

    pub fn scores(&self, average: Average) -> Scores {
        Scores {
            accuracy: self.accuracy(),
            precision: self.precision(average),
            recall: self.recall(average),
            f1: self.f1_score(average),
        }
    }
}

/// The four headline scores, each in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Scores {
    fn accumulate(self, other: Scores) -> Scores {
        Scores {
            accuracy: self.accuracy + other.accuracy,
            precision: self.precision + other.precision,
            recall: self.recall + other.recall,
            f1: self.f1 + other.f1,
        }
    }

    fn scale(self, factor: f64) -> Scores {
        Scores {
            accuracy: self.accuracy * factor,
            precision: self.precision * factor,
            recall: self.recall * factor,
            f1: self.f1 * factor,
        }
    }
}

/// Score one batch with an explicit averaging strategy.
pub fn score(y_true: &[usize], y_pred: &[usize], average: Average) -> Result<Scores> {
    Ok(ConfusionMatrix::from_predictions(y_true, y_pred)?.scores(average))
}

/// Score every batch with `average` and return the arithmetic mean of each score.
pub fn score_batches<T, P>(trues: &[T], preds: &[P], average: Average) -> Result<Scores>
where
    T: AsRef<[usize]>,
    P: AsRef<[usize]>,
{
    if trues.len() != preds.len() {
        return Err(PrepError::BatchCountMismatch {
            truth: trues.len(),
            predicted: preds.len(),
        });
    }
    if trues.is_empty() {
        return Err(PrepError::EmptyInput("no batches to score".to_string()));
    }

    // Validate every batch before scoring any of them.
    for (batch, (t, p)) in trues.iter().zip(preds.iter()).enumerate() {
        let (t, p) = (t.as_ref(), p.as_ref());
        if t.len() != p.len() {
            return Err(PrepError::BatchLengthMismatch {
                batch,
                truth: t.len(),
                predicted: p.len(),
            });
        }
    }

    let mut sum = Scores::default();
    for (batch, (t, p)) in trues.iter().zip(preds.iter()).enumerate() {
        let batch_scores = score(t.as_ref(), p.as_ref(), average)?;
        tracing::debug!(
            "batch {}: acc={:.4} p={:.4} r={:.4} f1={:.4}",
            batch,
            batch_scores.accuracy,
            batch_scores.precision,
            batch_scores.recall,
            batch_scores.f1
        );
        sum = sum.accumulate(batch_scores);
    }

    Ok(sum.scale(1.0 / trues.len() as f64))
}

/// Accuracy and weighted precision, recall and F1 for a single batch.
pub fn calc_metric(y_true: &[usize], y_pred: &[usize]) -> Result<Scores> {
    score(y_true, y_pred, Average::Weighted)
}

/// Per-batch accuracy and macro precision, recall and F1, averaged over batches.
pub fn calc_metric_batches<T, P>(trues: &[T], preds: &[P]) -> Result<Scores>
where
    T: AsRef<[usize]>,
    P: AsRef<[usize]>,
{
    score_batches(trues, preds, Average::Macro)
}

/// Averaging policy for both scoring modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAggregator {
    pub single_batch: Average,
    pub multi_batch: Average,
}

impl Default for MetricAggregator {
    fn default() -> Self {
        Self {
            single_batch: Average::Weighted,
            multi_batch: Average::Macro,
        }
    }
}

impl MetricAggregator {
    /// Use `average` for both modes.
    pub fn uniform(average: Average) -> Self {
        Self {
            single_batch: average,
            multi_batch: average,
        }
    }

    /// Defaults, unless an override is configured.
    pub fn with_override(average: Option<Average>) -> Self {
        average.map_or_else(Self::default, Self::uniform)
    }

    pub fn score(&self, y_true: &[usize], y_pred: &[usize]) -> Result<Scores> {
        score(y_true, y_pred, self.single_batch)
    }

    pub fn score_batches<T, P>(&self, trues: &[T], preds: &[P]) -> Result<Scores>
    where
        T: AsRef<[usize]>,
        P: AsRef<[usize]>,
    {
        score_batches(trues, preds, self.multi_batch)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Full classification report with per-class breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub average: Average,
    pub scores: Scores,
    pub support: usize,
    pub per_class: BTreeMap<usize, ClassMetrics>,
}

impl ClassificationReport {
    /// Generate report from predictions and ground truth
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize], average: Average) -> Result<Self> {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
        let per_class = cm
            .classes
            .iter()
            .map(|(&class, counts)| {
                (
                    class,
                    ClassMetrics {
                        precision: counts.precision(),
                        recall: counts.recall(),
                        f1_score: counts.f1_score(),
                        support: counts.support(),
                    },
                )
            })
            .collect();

        Ok(Self {
            average,
            scores: cm.scores(average),
            support: cm.total,
            per_class,
        })
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut output = format!(
            r#"Classification Report ({} average)
=====================
Accuracy:  {:.4} ({:.2}%)
Precision: {:.4}
Recall:    {:.4}
F1 Score:  {:.4}
Support:   {}

Per-Class Metrics:
"#,
            self.average,
            self.scores.accuracy,
            self.scores.accuracy * 100.0,
            self.scores.precision,
            self.scores.recall,
            self.scores.f1,
            self.support,
        );

        for (class, metrics) in &self.per_class {
            output.push_str(&format!(
                "  class {}: P={:.4} R={:.4} F1={:.4} (n={})\n",
                class, metrics.precision, metrics.recall, metrics.f1_score, metrics.support
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_perfect_prediction() {
        let labels = vec![0, 1, 2, 2, 1, 0, 3];
        for average in [Average::Macro, Average::Micro, Average::Weighted] {
            let s = score(&labels, &labels, average).unwrap();
            assert!(close(s.accuracy, 1.0));
            assert!(close(s.precision, 1.0));
            assert!(close(s.recall, 1.0));
            assert!(close(s.f1, 1.0));
        }
    }

    #[test]
    fn test_weighted_scores() {
        // class 0: support 3, class 1: support 1
        let y_true = vec![0, 0, 0, 1];
        let y_pred = vec![0, 0, 1, 1];

        let s = calc_metric(&y_true, &y_pred).unwrap();

        // class 0: P=1, R=2/3; class 1: P=1/2, R=1
        assert!(close(s.accuracy, 0.75));
        assert!(close(s.precision, (3.0 * 1.0 + 0.5) / 4.0));
        assert!(close(s.recall, (3.0 * (2.0 / 3.0) + 1.0) / 4.0));
        let f1_0 = 2.0 * (2.0 / 3.0) / (1.0 + 2.0 / 3.0);
        let f1_1 = 2.0 * 0.5 / 1.5;
        assert!(close(s.f1, (3.0 * f1_0 + f1_1) / 4.0));
    }

    #[test]
    fn test_macro_scores() {
        let y_true = vec![0, 0, 0, 1];
        let y_pred = vec![0, 0, 1, 1];

        let s = score(&y_true, &y_pred, Average::Macro).unwrap();
        assert!(close(s.precision, 0.75));
        assert!(close(s.recall, (2.0 / 3.0 + 1.0) / 2.0));
    }

    #[test]
    fn test_micro_equals_accuracy_for_single_label() {
        let y_true = vec![0, 1, 2, 2, 1];
        let y_pred = vec![0, 2, 2, 1, 1];
        let s = score(&y_true, &y_pred, Average::Micro).unwrap();
        assert!(close(s.precision, s.accuracy));
        assert!(close(s.recall, s.accuracy));
    }

    #[test]
    fn test_class_only_in_predictions() {
        // class 2 is never true: zero support, zero precision
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 2, 1, 1];

        let cm = ConfusionMatrix::from_predictions(&y_true, &y_pred).unwrap();
        assert_eq!(cm.classes.len(), 3);
        assert_eq!(cm.classes[&2].support(), 0);

        // Weighted ignores class 2 entirely
        let weighted = cm.precision(Average::Weighted);
        assert!(close(weighted, 1.0));

        // Macro gives it a full third of the weight
        let macro_ = cm.precision(Average::Macro);
        assert!(close(macro_, 2.0 / 3.0));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = calc_metric(&[0, 1], &[0]).unwrap_err();
        assert!(matches!(err, PrepError::LengthMismatch { left: 2, right: 1, .. }));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(calc_metric(&[], &[]), Err(PrepError::EmptyInput(_))));
        let none: Vec<Vec<usize>> = vec![];
        assert!(matches!(calc_metric_batches(&none, &none), Err(PrepError::EmptyInput(_))));
    }

    #[test]
    fn test_batch_count_mismatch() {
        let trues = vec![vec![0, 1], vec![1, 1]];
        let preds = vec![vec![0, 1]];
        let err = calc_metric_batches(&trues, &preds).unwrap_err();
        assert!(matches!(err, PrepError::BatchCountMismatch { truth: 2, predicted: 1 }));
    }

    #[test]
    fn test_batch_length_mismatch_names_batch() {
        let trues = vec![vec![0, 1], vec![1, 1, 0]];
        let preds = vec![vec![0, 1], vec![1, 1]];
        let err = calc_metric_batches(&trues, &preds).unwrap_err();
        assert!(matches!(
            err,
            PrepError::BatchLengthMismatch { batch: 1, truth: 3, predicted: 2 }
        ));
    }

    #[test]
    fn test_batches_are_averaged() {
        let trues = vec![vec![0, 1], vec![0, 0, 1, 1]];
        let preds = vec![vec![0, 1], vec![1, 1, 1, 1]];

        let s = calc_metric_batches(&trues, &preds).unwrap();

        // batch 0 perfect; batch 1: acc 0.5, P=(0+0.5)/2, R=(0+1)/2
        assert!(close(s.accuracy, (1.0 + 0.5) / 2.0));
        assert!(close(s.precision, (1.0 + 0.25) / 2.0));
        assert!(close(s.recall, (1.0 + 0.5) / 2.0));
    }

    #[test]
    fn test_single_batch_of_batches_matches_macro_not_weighted() {
        let y_true = vec![0, 0, 0, 1];
        let y_pred = vec![0, 0, 1, 1];

        let batched = calc_metric_batches(&[y_true.clone()], &[y_pred.clone()]).unwrap();
        let macro_ = score(&y_true, &y_pred, Average::Macro).unwrap();
        let weighted = calc_metric(&y_true, &y_pred).unwrap();

        assert_eq!(batched, macro_);
        assert!(!close(batched.precision, weighted.precision));
    }

    #[test]
    fn test_aggregator_override() {
        let agg = MetricAggregator::with_override(None);
        assert_eq!(agg.single_batch, Average::Weighted);
        assert_eq!(agg.multi_batch, Average::Macro);

        let agg = MetricAggregator::with_override(Some(Average::Micro));
        assert_eq!(agg, MetricAggregator::uniform(Average::Micro));

        let s = agg.score(&[0, 1, 1], &[0, 1, 0]).unwrap();
        assert!(close(s.precision, s.accuracy));
    }

    #[test]
    fn test_average_parse() {
        assert_eq!("Weighted".parse::<Average>().unwrap(), Average::Weighted);
        assert_eq!(" macro ".parse::<Average>().unwrap(), Average::Macro);
        assert!("median".parse::<Average>().is_err());
        assert_eq!(Average::Micro.to_string(), "micro");
    }

    #[test]
    fn test_classification_report_format() {
        let report = ClassificationReport::from_predictions(&[0, 1, 1, 2], &[0, 1, 2, 2], Average::Weighted)
            .unwrap();
        let formatted = report.format();

        assert_eq!(report.support, 4);
        assert_eq!(report.per_class[&1].support, 2);
        assert!(formatted.contains("Classification Report"));
        assert!(formatted.contains("weighted"));
        assert!(formatted.contains("class 2"));
    }

    proptest! {
        #[test]
        fn prop_scores_within_unit_interval(
            pairs in prop::collection::vec((0usize..6, 0usize..6), 1..64)
        ) {
            let (y_true, y_pred): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
            for average in [Average::Macro, Average::Micro, Average::Weighted] {
                let s = score(&y_true, &y_pred, average).unwrap();
                for v in [s.accuracy, s.precision, s.recall, s.f1] {
                    prop_assert!((0.0..=1.0 + 1e-12).contains(&v));
                }
            }
        }

        #[test]
        fn prop_perfect_prediction_scores_one(y in prop::collection::vec(0usize..8, 1..64)) {
            let s = calc_metric(&y, &y).unwrap();
            prop_assert!(close(s.accuracy, 1.0));
            prop_assert!(close(s.precision, 1.0));
            prop_assert!(close(s.recall, 1.0));
            prop_assert!(close(s.f1, 1.0));
        }
    }
}
