// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Resource provisioning: directory layout, archive download and extraction
//!
//! Downloads are idempotent: an archive that already exists locally is never
//! fetched again. Archives are always (re-)extracted into their target
//! directory.

use crate::error::{PrepError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Twitter GloVe word vectors (about 1.4GB)
pub const GLOVE_TWITTER_URL: &str = "http://nlp.stanford.edu/data/glove.twitter.27B.zip";

/// Create every missing directory. Returns the directories that were created.
pub fn ensure_directories<I, P>(paths: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut created = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            continue;
        }
        std::fs::create_dir_all(path).map_err(|e| PrepError::io(path, e))?;
        tracing::info!("Created directory {}", path.display());
        created.push(path.to_path_buf());
    }
    Ok(created)
}

/// Something that can copy a remote URL into a local file
pub trait Fetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Blocking HTTP fetcher with a terminal progress bar
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PrepError::http("<client>", e))?;
        Ok(Self { client })
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        tracing::info!("Downloading from: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PrepError::http(url, e))?;

        if !response.status().is_success() {
            return Err(PrepError::http(url, format!("status {}", response.status())));
        }

        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(bar_style(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ));

        let mut file = File::create(destination).map_err(|e| PrepError::io(destination, e))?;
        let mut reader = pb.wrap_read(response);
        std::io::copy(&mut reader, &mut file).map_err(|e| PrepError::http(url, e))?;

        pb.finish_with_message("Downloaded");
        Ok(())
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Fetch `url` into `destination` unless it already exists.
///
/// Returns `true` when a download happened. The file only appears at
/// `destination` once the fetch has completed.
pub fn download(fetcher: &dyn Fetcher, url: &str, destination: &Path) -> Result<bool> {
    if destination.exists() {
        tracing::info!("Already downloaded: {}", destination.display());
        return Ok(false);
    }
    if let Some(parent) = destination.parent() {
        ensure_directories([parent])?;
    }

    let partial = partial_path(destination);
    if let Err(e) = fetcher.fetch(url, &partial) {
        // Best effort; the fetch error is what matters.
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, destination).map_err(|e| PrepError::io(destination, e))?;

    tracing::info!("Downloaded to {}", destination.display());
    Ok(true)
}

/// Compare a file's SHA-256 digest with `expected` (hex).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    tracing::info!("Verifying checksum of {}", path.display());

    let mut file = File::open(path).map_err(|e| PrepError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| PrepError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(PrepError::Checksum {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }

    tracing::info!("Checksum verified: {}", actual);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// `.tar.gz` / `.tgz` names are gzipped tarballs; everything else is zip.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Zip
        }
    }
}

/// Extract every entry of `archive` into `target_dir`.
pub fn extract_archive(archive: &Path, target_dir: &Path) -> Result<()> {
    tracing::info!("Extracting {} to {}", archive.display(), target_dir.display());
    ensure_directories([target_dir])?;

    match ArchiveKind::from_path(archive) {
        ArchiveKind::Zip => extract_zip(archive, target_dir)?,
        ArchiveKind::TarGz => extract_tar_gz(archive, target_dir)?,
    }

    tracing::info!("Extraction finished: {}", archive.display());
    Ok(())
}

fn extract_zip(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| PrepError::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| PrepError::archive(archive_path, e))?;

    let pb = ProgressBar::new(archive.len() as u64);
    pb.set_style(bar_style(
        "{spinner:.green} Extracting: [{wide_bar:.cyan/blue}] {pos}/{len}",
    ));

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PrepError::archive(archive_path, e))?;
        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            PrepError::archive(archive_path, format!("unsafe entry path '{}'", entry.name()))
        })?;
        let outpath = output_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| PrepError::io(&outpath, e))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
            }
            let mut outfile = File::create(&outpath).map_err(|e| PrepError::io(&outpath, e))?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| PrepError::io(&outpath, e))?;
        }

        pb.inc(1);
    }

    pb.finish_with_message("Extracted");
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| PrepError::io(archive_path, e))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    archive
        .unpack(output_dir)
        .map_err(|e| PrepError::archive(archive_path, e))
}

/// On-disk locations of data and model resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    pub data_root: PathBuf,
    pub resource_root: PathBuf,
}

impl ResourceLayout {
    pub fn new(data_root: impl Into<PathBuf>, resource_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            resource_root: resource_root.into(),
        }
    }

    pub fn glove_dir(&self) -> PathBuf {
        self.resource_root.join("glove")
    }

    pub fn tf_weights_dir(&self) -> PathBuf {
        self.resource_root.join("tf_weights")
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.data_root.clone(),
            self.resource_root.clone(),
            self.glove_dir(),
            self.tf_weights_dir(),
        ]
    }
}

/// Where an archive is extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractTarget {
    WordVectors,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    pub url: String,
    /// Local archive name inside the download directory
    pub filename: &'static str,
    pub target: ExtractTarget,
    pub sha256: Option<String>,
}

/// URLs of the word vectors and the three dataset splits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResources {
    pub word_vectors: String,
    pub train: String,
    pub validation: String,
    pub evaluation: String,
    /// Expected SHA-256 digests keyed by local archive name
    pub checksums: BTreeMap<String, String>,
}

impl RemoteResources {
    /// Dataset URLs with the default Twitter GloVe vectors.
    pub fn new(train: impl Into<String>, validation: impl Into<String>, evaluation: impl Into<String>) -> Self {
        Self {
            word_vectors: GLOVE_TWITTER_URL.to_string(),
            train: train.into(),
            validation: validation.into(),
            evaluation: evaluation.into(),
            checksums: BTreeMap::new(),
        }
    }

    pub fn with_word_vectors(mut self, url: impl Into<String>) -> Self {
        self.word_vectors = url.into();
        self
    }

    pub fn with_checksum(mut self, filename: impl Into<String>, sha256: impl Into<String>) -> Self {
        self.checksums.insert(filename.into(), sha256.into());
        self
    }

    /// Archives in download order.
    pub fn downloads(&self) -> Vec<RemoteResource> {
        [
            (&self.word_vectors, "glove.zip", ExtractTarget::WordVectors),
            (&self.train, "train", ExtractTarget::Data),
            (&self.validation, "valid", ExtractTarget::Data),
            (&self.evaluation, "eval", ExtractTarget::Data),
        ]
        .into_iter()
        .map(|(url, filename, target)| RemoteResource {
            url: url.clone(),
            filename,
            target,
            sha256: self.checksums.get(filename).cloned(),
        })
        .collect()
    }
}

/// Outcome of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created_dirs: Vec<PathBuf>,
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub extracted: Vec<String>,
}

/// Populates a [`ResourceLayout`] from [`RemoteResources`]
pub struct Provisioner<F: Fetcher> {
    fetcher: F,
    layout: ResourceLayout,
    force: bool,
}

impl<F: Fetcher> Provisioner<F> {
    pub fn new(fetcher: F, layout: ResourceLayout) -> Self {
        Self {
            fetcher,
            layout,
            force: false,
        }
    }

    /// Re-download archives even if they exist locally.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    fn target_dir(&self, target: ExtractTarget) -> PathBuf {
        match target {
            ExtractTarget::WordVectors => self.layout.glove_dir(),
            ExtractTarget::Data => self.layout.data_root.clone(),
        }
    }

    /// Create the layout, then download and extract every archive.
    pub fn provision(&self, resources: &RemoteResources, download_dir: &Path) -> Result<ProvisionReport> {
        let mut report = ProvisionReport {
            created_dirs: ensure_directories(
                self.layout
                    .directories()
                    .into_iter()
                    .chain(std::iter::once(download_dir.to_path_buf())),
            )?,
            ..ProvisionReport::default()
        };

        for resource in resources.downloads() {
            let archive = download_dir.join(resource.filename);

            if self.force && archive.exists() {
                tracing::info!("Removing {} for forced re-download", archive.display());
                std::fs::remove_file(&archive).map_err(|e| PrepError::io(&archive, e))?;
            }

            let fetched = download(&self.fetcher, &resource.url, &archive)?;
            if fetched {
                report.downloaded.push(resource.filename.to_string());
            } else {
                report.skipped.push(resource.filename.to_string());
            }

            if let Some(expected) = &resource.sha256 {
                if let Err(e) = verify_sha256(&archive, expected) {
                    // A fresh archive that fails verification must not be skipped next run
                    if fetched {
                        tracing::warn!("Removing {} after failed verification", archive.display());
                        std::fs::remove_file(&archive).map_err(|io| PrepError::io(&archive, io))?;
                    }
                    return Err(e);
                }
            }

            extract_archive(&archive, &self.target_dir(resource.target))?;
            report.extracted.push(resource.filename.to_string());
        }

        Ok(report)
    }
}
