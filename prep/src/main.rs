// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Prediction scoring CLI
//!
//! Usage:
//!   score-predictions --predictions preds.csv
//!   score-predictions --predictions preds.csv --config settings.ini --output results
//!
//! The CSV needs `true` and `pred` columns. With an additional `batch` column
//! rows are grouped by batch and scored as a batch of batches.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use textprep::dataset::PredictionBatches;
use textprep::metrics::{Average, ClassificationReport, MetricAggregator, Scores};
use textprep::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "score-predictions")]
#[command(about = "Score classifier predictions against ground truth")]
#[command(version)]
struct Args {
    /// CSV file with `true`, `pred` and optional `batch` columns
    #[arg(short, long)]
    predictions: PathBuf,

    /// Settings file whose `metric average` overrides the default policy
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Averaging strategy (weighted, macro, micro); overrides the settings file
    #[arg(short, long)]
    average: Option<String>,

    /// Directory for a JSON report
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ScoreReport {
    mode: &'static str,
    average: Average,
    batches: usize,
    samples: usize,
    scores: Scores,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ClassificationReport>,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let configured = match &args.config {
        Some(path) => Settings::load(path)?.metric_average,
        None => None,
    };
    let requested = args
        .average
        .as_deref()
        .map(str::parse::<Average>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let aggregator = MetricAggregator::with_override(requested.or(configured));

    let batches = PredictionBatches::from_csv(&args.predictions)
        .with_context(|| format!("Failed to read predictions from {}", args.predictions.display()))?;
    let samples = batches.samples();
    let multi_batch = batches.is_multi_batch();

    tracing::info!(
        "Scoring {} predictions in {} batch(es) from {}",
        samples,
        batches.len(),
        args.predictions.display()
    );

    let (mode, average, scores, report) = if multi_batch {
        let scores = aggregator.score_batches(&batches.trues, &batches.preds)?;
        ("multi-batch", aggregator.multi_batch, scores, None)
    } else {
        let (trues, preds) = match (batches.trues.first(), batches.preds.first()) {
            (Some(t), Some(p)) => (t.as_slice(), p.as_slice()),
            _ => bail!("{} contains no predictions", args.predictions.display()),
        };
        let report = ClassificationReport::from_predictions(trues, preds, aggregator.single_batch)?;
        ("single-batch", aggregator.single_batch, report.scores, Some(report))
    };

    println!("\n{}", "=".repeat(60));
    println!("SCORES ({}, {} average)", mode, average);
    println!("{}", "=".repeat(60));
    println!("{:<12} {:>10} {:>10} {:>10} {:>10}", "Batches", "Accuracy", "Precision", "Recall", "F1");
    println!("{:-<60}", "");
    println!(
        "{:<12} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
        batches.len(),
        scores.accuracy,
        scores.precision,
        scores.recall,
        scores.f1
    );
    println!("{:-<60}", "");

    if let Some(report) = &report {
        println!("\n{}", report.format());
    }

    if let Some(output) = &args.output {
        std::fs::create_dir_all(output)?;
        let timestamp = chrono::Utc::now();
        let result = ScoreReport {
            mode,
            average,
            batches: batches.len(),
            samples,
            scores,
            report,
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let json_path = output.join(format!("scores_{}.json", timestamp.format("%Y%m%d_%H%M%S")));
        std::fs::write(&json_path, serde_json::to_string_pretty(&result)?)?;
        println!("JSON results saved to: {}", json_path.display());
    }

    Ok(())
}
