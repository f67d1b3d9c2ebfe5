//! Configuration system for netflow-wrangle.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/wrangle/config.toml` and/or `.wrangle/config.toml`
//! in the workspace directory.

use crate::diagnose::DiagnosisCriteria;
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dataset identifier of the NF-UQ-NIDS-v2 dataset on Kaggle.
pub const DEFAULT_DATASET: &str = "aryashah2k/nfuqnidsv2-network-intrusion-detection-dataset";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WrangleConfig {
    /// Pipeline file names, relative to the workspace.
    #[serde(default)]
    pub files: FileConfig,
    /// Remote dataset acquisition.
    #[serde(default)]
    pub acquire: AcquireConfig,
    /// Stratified sampling.
    #[serde(default)]
    pub sample: SampleConfig,
    /// Soft-null diagnosis criteria.
    #[serde(default)]
    pub diagnose: DiagnosisCriteria,
}

impl WrangleConfig {
    /// Reject values no step can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.sample.reduction_percent;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid {
                message: format!("sample.reduction_percent must be in (0, 1), got {fraction}"),
            });
        }
        if self.sample.target_variable.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "sample.target_variable must not be empty".to_string(),
            });
        }
        if !self.acquire.dataset.contains('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "acquire.dataset must be <owner>/<slug>, got '{}'",
                    self.acquire.dataset
                ),
            });
        }
        let files = &self.files;
        if files.raw_full == files.raw_short
            || files.raw_full == files.prepared
            || files.raw_short == files.prepared
        {
            return Err(ConfigError::Invalid {
                message: "files.raw_full, files.raw_short and files.prepared must differ"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Input and output file names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_raw_full")]
    pub raw_full: PathBuf,
    #[serde(default = "default_raw_short")]
    pub raw_short: PathBuf,
    #[serde(default = "default_prepared")]
    pub prepared: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            raw_full: default_raw_full(),
            raw_short: default_raw_short(),
            prepared: default_prepared(),
        }
    }
}

fn default_raw_full() -> PathBuf {
    PathBuf::from("raw_full.csv")
}

fn default_raw_short() -> PathBuf {
    PathBuf::from("raw_short.csv")
}

fn default_prepared() -> PathBuf {
    PathBuf::from("prepared_short.csv")
}

/// Where and how the raw dataset is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Registry dataset identifier (`<owner>/<slug>`).
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Base URL of the registry API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Download cache directory (platform cache dir if unset).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            api_base: default_api_base(),
            cache_dir: None,
        }
    }
}

fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}

fn default_api_base() -> String {
    "https://www.kaggle.com/api/v1".to_string()
}

/// Stratified sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Fraction of the full dataset kept in the reduced file.
    #[serde(default = "default_reduction_percent")]
    pub reduction_percent: f64,
    /// Label column the split is stratified over.
    #[serde(default = "default_target_variable")]
    pub target_variable: String,
    /// Seed for the deterministic shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            reduction_percent: default_reduction_percent(),
            target_variable: default_target_variable(),
            seed: default_seed(),
        }
    }
}

fn default_reduction_percent() -> f64 {
    0.10
}

fn default_target_variable() -> String {
    "Attack".to_string()
}

fn default_seed() -> u64 {
    3703
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "netflow", "wrangle")
}

/// Workspace-level config file location.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".wrangle").join("config.toml")
}

/// Platform cache directory for downloads, if one can be determined.
pub fn default_cache_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.cache_dir().to_path_buf())
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `WRANGLE_`)
/// 2. Workspace-local config (`.wrangle/config.toml`)
/// 3. User config (`~/.config/wrangle/config.toml`)
/// 4. Built-in defaults
///
/// Command-line flags are applied by the caller on the returned value.
pub fn load_config(workspace: Option<&Path>) -> Result<WrangleConfig, Box<figment::Error>> {
    load_config_with_file(workspace, None)
}

/// Like [`load_config`], with an explicit config file layered above the
/// workspace config and below the environment.
pub fn load_config_with_file(
    workspace: Option<&Path>,
    file: Option<&Path>,
) -> Result<WrangleConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(WrangleConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }

    // WRANGLE_SAMPLE__SEED, WRANGLE_FILES__RAW_FULL, ...
    figment = figment.merge(Env::prefixed("WRANGLE_").split("__"));

    figment.extract().map_err(Box::new)
}

/// Check whether any wrangle configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs() {
        if dirs.config_dir().join("config.toml").exists() {
            return true;
        }
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
