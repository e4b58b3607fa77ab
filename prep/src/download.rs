// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Resource download utility
//!
//! Creates the data/resource directory layout, then downloads and extracts:
//! - Twitter GloVe word vectors (about 1.4GB, needs ~5GB free disk)
//! - Training, validation and unlabeled evaluation sets

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use textprep::provision::{HttpFetcher, Provisioner, RemoteResources, ResourceLayout, GLOVE_TWITTER_URL};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "download-resources")]
#[command(about = "Download word vectors and datasets")]
#[command(version)]
struct Args {
    /// Directory receiving the extracted datasets
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory receiving word vectors and model weights
    #[arg(long, default_value = "resources")]
    resource_dir: PathBuf,

    /// Where archives are downloaded before extraction
    #[arg(long, default_value = "/tmp")]
    download_dir: PathBuf,

    /// Training set archive URL
    #[arg(long)]
    train_url: String,

    /// Validation set archive URL
    #[arg(long)]
    valid_url: String,

    /// Unlabeled evaluation set archive URL
    #[arg(long)]
    eval_url: String,

    /// Word vector archive URL
    #[arg(long, default_value = GLOVE_TWITTER_URL)]
    glove_url: String,

    /// Expected SHA-256 of an archive, as NAME=HEX (repeatable; names: glove.zip, train, valid, eval)
    #[arg(long = "checksum")]
    checksums: Vec<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 3600)]
    timeout: u64,

    /// Force re-download even if archives exist
    #[arg(short, long)]
    force: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Resource Download Utility");
    tracing::info!("=========================");

    let mut resources = RemoteResources::new(args.train_url, args.valid_url, args.eval_url)
        .with_word_vectors(args.glove_url);
    for entry in &args.checksums {
        let (name, digest) = entry
            .split_once('=')
            .with_context(|| format!("checksum '{}' is not NAME=HEX", entry))?;
        resources = resources.with_checksum(name.trim(), digest.trim());
    }

    let layout = ResourceLayout::new(&args.data_dir, &args.resource_dir);
    let fetcher = HttpFetcher::new(Duration::from_secs(args.timeout))?;
    let provisioner = Provisioner::new(fetcher, layout).force(args.force);

    let report = provisioner
        .provision(&resources, &args.download_dir)
        .context("Provisioning failed")?;

    println!("\n{}", "=".repeat(60));
    println!("Resource Preparation Complete");
    println!("{}", "=".repeat(60));
    println!("Downloaded: {}", list_or_dash(&report.downloaded));
    println!("Already present: {}", list_or_dash(&report.skipped));
    println!("Extracted: {}", list_or_dash(&report.extracted));
    println!("\nData directory:     {}", provisioner.layout().data_root.display());
    println!("Word vectors:       {}", provisioner.layout().glove_dir().display());
    println!("Model weights:      {}", provisioner.layout().tf_weights_dir().display());

    Ok(())
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
