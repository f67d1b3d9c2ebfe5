//! Raw dataset acquisition from a remote dataset registry.

use crate::config::{AcquireConfig, default_cache_dir};
use crate::error::{FetchError, Result};
use crate::persistence::move_file;
use crate::pipeline::StepOutcome;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// A registry that can materialize a dataset on local disk.
#[async_trait]
pub trait DatasetFetcher: Send + Sync {
    /// Fetch `dataset` and return a local directory holding its unpacked files.
    async fn fetch(&self, dataset: &str) -> std::result::Result<PathBuf, FetchError>;
}

/// Kaggle API credentials.
#[derive(Clone, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl KaggleCredentials {
    /// Read `KAGGLE_USERNAME` / `KAGGLE_KEY`.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("KAGGLE_USERNAME").ok()?;
        let key = std::env::var("KAGGLE_KEY").ok()?;
        Some(Self { username, key })
    }

    /// Read a `kaggle.json` credentials file.
    pub fn from_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring malformed credentials file"
                );
                None
            }
        }
    }

    /// Environment first, then `$KAGGLE_CONFIG_DIR/kaggle.json`, then `~/.kaggle/kaggle.json`.
    pub fn discover() -> Option<Self> {
        if let Some(credentials) = Self::from_env() {
            return Some(credentials);
        }
        let config_dir = std::env::var_os("KAGGLE_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| directories::BaseDirs::new().map(|d| d.home_dir().join(".kaggle")))?;
        Self::from_file(&config_dir.join("kaggle.json"))
    }
}

/// Fetches datasets through the Kaggle public API.
///
/// The archive is streamed into `<cache>/datasets/<owner>/<slug>/archive.zip`
/// and unpacked into the sibling `files/` directory.
pub struct KaggleFetcher {
    client: reqwest::Client,
    api_base: String,
    cache_dir: PathBuf,
    credentials: Option<KaggleCredentials>,
}

impl KaggleFetcher {
    pub fn new(api_base: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wrangle/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            credentials: None,
        }
    }

    /// Replace the HTTP client, e.g. to set proxies or timeouts.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<KaggleCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Build a fetcher from configuration, discovering credentials.
    pub fn from_config(config: &AcquireConfig) -> Self {
        let cache_dir = config
            .cache_dir
            .clone()
            .or_else(default_cache_dir)
            .unwrap_or_else(|| PathBuf::from(".wrangle").join("cache"));
        Self::new(&config.api_base, cache_dir).with_credentials(KaggleCredentials::discover())
    }

    pub fn download_url(&self, owner: &str, slug: &str) -> String {
        format!("{}/datasets/download/{owner}/{slug}", self.api_base)
    }
}

#[async_trait]
impl DatasetFetcher for KaggleFetcher {
    async fn fetch(&self, dataset: &str) -> std::result::Result<PathBuf, FetchError> {
        let (owner, slug) = split_dataset_id(dataset)?;
        let dataset_dir = self.cache_dir.join("datasets").join(owner).join(slug);
        tokio::fs::create_dir_all(&dataset_dir).await?;

        let url = self.download_url(owner, slug);
        tracing::info!(%url, "downloading dataset archive");
        let mut request = self.client.get(&url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.key));
        } else {
            tracing::debug!("no Kaggle credentials found, sending anonymous request");
        }

        let mut response = request.send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let archive = dataset_dir.join("archive.zip");
        let mut file = tokio::fs::File::create(&archive).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tracing::info!(bytes, path = %archive.display(), "archive downloaded");

        let files_dir = dataset_dir.join("files");
        if tokio::fs::try_exists(&files_dir).await? {
            tokio::fs::remove_dir_all(&files_dir).await?;
        }
        let (from, into) = (archive.clone(), files_dir.clone());
        let extracted = tokio::task::spawn_blocking(move || extract_archive(&from, &into))
            .await
            .map_err(|e| FetchError::Task {
                message: e.to_string(),
            })??;
        tokio::fs::remove_file(&archive).await?;
        tracing::info!(extracted, dir = %files_dir.display(), "archive unpacked");

        Ok(files_dir)
    }
}

/// Split `<owner>/<slug>`.
fn split_dataset_id(dataset: &str) -> std::result::Result<(&str, &str), FetchError> {
    match dataset.split_once('/') {
        Some((owner, slug)) if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') => {
            Ok((owner, slug))
        }
        _ => Err(FetchError::InvalidDatasetId {
            id: dataset.to_string(),
        }),
    }
}

/// Unpack a zip archive into `output_dir`, returning the number of files written.
///
/// Entries whose names would escape `output_dir` are skipped.
pub fn extract_archive(
    archive: &Path,
    output_dir: &Path,
) -> std::result::Result<usize, FetchError> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(output_dir)?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping archive entry outside output dir");
            continue;
        };
        let out_path = output_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }
    Ok(extracted)
}

/// The single regular file inside `dir`.
fn single_file(dir: &Path) -> std::result::Result<PathBuf, FetchError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    if files.len() != 1 {
        return Err(FetchError::UnexpectedLayout {
            dir: dir.to_path_buf(),
            found: files.len(),
        });
    }
    Ok(files.remove(0))
}

/// Ensure `target` exists, fetching `dataset` and moving its file into place if not.
pub async fn download_raw(
    fetcher: &dyn DatasetFetcher,
    dataset: &str,
    target: &Path,
) -> Result<StepOutcome> {
    if target.exists() {
        tracing::info!(path = %target.display(), "raw dataset exists, skipping download");
        return Ok(StepOutcome::Skipped {
            path: target.to_path_buf(),
        });
    }

    let dir = fetcher.fetch(dataset).await?;
    let downloaded = single_file(&dir)?;
    move_file(&downloaded, target)?;
    tracing::info!(
        from = %downloaded.display(),
        to = %target.display(),
        "raw dataset moved into place"
    );
    Ok(StepOutcome::Created {
        path: target.to_path_buf(),
        rows: None,
    })
}
