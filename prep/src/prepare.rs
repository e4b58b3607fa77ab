// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset preparation runner
//!
//! Loads experiment settings and a feature CSV, shuffles with the configured
//! seed and writes train / validation / test splits.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use textprep::dataset::DEFAULT_LABEL_COLUMN;
use textprep::pipeline::{PreparationConfig, PreparationPipeline};
use textprep::split::{SplitPolicy, DEFAULT_TEST_SIZE};
use textprep::{LabeledDataset, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prepare-splits")]
#[command(about = "Shuffle and split a labeled dataset")]
#[command(version)]
struct Args {
    /// Settings file (INI with MODEL and GENERAL sections)
    #[arg(short, long)]
    config: PathBuf,

    /// Headered CSV with feature columns and a label column
    #[arg(short, long)]
    input: PathBuf,

    /// Name of the label column
    #[arg(long, default_value = DEFAULT_LABEL_COLUMN)]
    label_column: String,

    /// Combined validation + test proportion
    #[arg(short, long, default_value_t = DEFAULT_TEST_SIZE)]
    test_size: f64,

    /// How the held-out pool is divided (legacy, pool-half)
    #[arg(long, default_value = "legacy")]
    split_policy: String,

    /// Also write one-hot label matrices
    #[arg(long)]
    one_hot: bool,

    /// Also write seeded cross-validation folds (folds.json)
    #[arg(long)]
    folds: bool,

    /// Output directory for the splits
    #[arg(short, long, default_value = "data/splits")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    let split_policy: SplitPolicy = args.split_policy.parse().map_err(anyhow::Error::msg)?;

    let dataset = LabeledDataset::from_csv(&args.input, &args.label_column)?;
    let n_samples = dataset.len();

    let config = PreparationConfig {
        test_size: args.test_size,
        split_policy,
        one_hot: args.one_hot,
    };
    let pipeline = PreparationPipeline::new(settings, config);
    let prepared = pipeline.run(dataset)?;
    let written = prepared.save(&args.output)?;

    if args.folds {
        let folds = pipeline.folds(n_samples)?;
        let path = args.output.join("folds.json");
        std::fs::write(&path, serde_json::to_string_pretty(&folds)?)?;
        println!("{} folds saved to: {}", folds.len(), path.display());
    }

    let sizes = prepared.summary.sizes;
    println!("\n{}", "=".repeat(60));
    println!("SPLIT SUMMARY ({} samples, seed {})", n_samples, prepared.summary.seed);
    println!("{}", "=".repeat(60));
    println!("{:<12} {:>10}", "Split", "Samples");
    println!("{:-<24}", "");
    println!("{:<12} {:>10}", "train", sizes.train);
    println!("{:<12} {:>10}", "validation", sizes.validation);
    println!("{:<12} {:>10}", "test", sizes.test);
    println!("{:-<24}", "");
    for path in written {
        println!("Wrote {}", path.display());
    }

    Ok(())
}
