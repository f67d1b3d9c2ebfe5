//! The four-step preparation pipeline.
//!
//! Steps run in a fixed order: acquire the full dataset, reduce it, diagnose
//! the reduction, persist the prepared copy. Every step that writes a file is
//! skipped when that file already exists, so re-running after a completed run
//! does no work and re-running after a failure resumes at the failed step.

use crate::acquire::{self, DatasetFetcher, KaggleFetcher};
use crate::clean;
use crate::config::{SampleConfig, WrangleConfig};
use crate::diagnose::{self, Diagnosis, DiagnosisReport};
use crate::error::{Result, WrangleError};
use crate::sample;
use crate::table::Table;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Acquire,
    Sample,
    Diagnose,
    Clean,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Acquire => write!(f, "acquire"),
            Step::Sample => write!(f, "sample"),
            Step::Diagnose => write!(f, "diagnose"),
            Step::Clean => write!(f, "clean"),
        }
    }
}

/// What a file-producing step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The output was already present and left untouched.
    Skipped { path: PathBuf },
    /// The output was written. `rows` is known when the step held the table.
    Created { path: PathBuf, rows: Option<usize> },
}

impl StepOutcome {
    pub fn path(&self) -> &Path {
        match self {
            StepOutcome::Skipped { path } | StepOutcome::Created { path, .. } => path,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped { .. })
    }
}

/// Receives progress from a running pipeline.
///
/// All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// A step is about to do work.
    fn on_step_start(&self, _step: Step, _message: &str) {}

    /// A file-producing step finished.
    fn on_step_complete(&self, _step: Step, _outcome: &StepOutcome) {}

    /// A step failed; the pipeline stops after this.
    fn on_step_failed(&self, _step: Step, _error: &WrangleError) {}

    /// A diagnosis report is ready.
    fn on_diagnosis(&self, _report: &DiagnosisReport) {}
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl PipelineObserver for NoOpObserver {}

/// Outcomes of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub raw_full: StepOutcome,
    pub raw_short: StepOutcome,
    pub diagnosis: DiagnosisReport,
    pub prepared: StepOutcome,
}

impl PipelineReport {
    /// True when no step wrote anything.
    pub fn all_skipped(&self) -> bool {
        self.raw_full.is_skipped() && self.raw_short.is_skipped() && self.prepared.is_skipped()
    }
}

/// Drives the pipeline steps against a workspace directory.
///
/// Relative paths handed to any step resolve against the workspace.
pub struct Pipeline {
    config: WrangleConfig,
    workspace: PathBuf,
    fetcher: Arc<dyn DatasetFetcher>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    pub fn new(
        config: WrangleConfig,
        workspace: impl Into<PathBuf>,
        fetcher: Arc<dyn DatasetFetcher>,
    ) -> Self {
        Self {
            config,
            workspace: workspace.into(),
            fetcher,
            observer: Arc::new(NoOpObserver),
        }
    }

    /// A pipeline that fetches through the Kaggle API.
    pub fn with_kaggle(config: WrangleConfig, workspace: impl Into<PathBuf>) -> Self {
        let fetcher = Arc::new(KaggleFetcher::from_config(&config.acquire));
        Self::new(config, workspace, fetcher)
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &WrangleConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Ensure the full dataset exists at `target`, fetching it if not.
    pub async fn download_raw(&self, target: &Path) -> Result<StepOutcome> {
        let target = self.resolve(target);
        if !target.exists() {
            self.observer.on_step_start(
                Step::Acquire,
                &format!(
                    "{} not found, downloading {}...",
                    target.display(),
                    self.config.acquire.dataset
                ),
            );
        }
        let result =
            acquire::download_raw(self.fetcher.as_ref(), &self.config.acquire.dataset, &target)
                .await;
        self.finish(Step::Acquire, result)
    }

    /// Ensure the reduced dataset exists at `output`.
    ///
    /// When `full` is missing it is acquired first; if that fails, the
    /// acquisition error is returned and nothing is written.
    pub async fn create_raw_short(
        &self,
        full: &Path,
        output: &Path,
        config: &SampleConfig,
    ) -> Result<StepOutcome> {
        let full = self.resolve(full);
        let output = self.resolve(output);
        if !output.exists() {
            if !full.exists() {
                self.observer.on_step_start(
                    Step::Sample,
                    &format!("{} does not exist, acquiring it first...", full.display()),
                );
                self.download_raw(&full).await?;
            }
            self.observer.on_step_start(
                Step::Sample,
                &format!(
                    "{} exists, creating reduced version as {}...",
                    full.display(),
                    output.display()
                ),
            );
        }
        let result = sample::create_raw_short(&full, &output, config);
        self.finish(Step::Sample, result)
    }

    /// Diagnose `table`, or the table stored at `path` when none is given.
    pub fn diagnose_missing_values(&self, table: Option<Table>, path: &Path) -> Result<Diagnosis> {
        let path = self.resolve(path);
        let message = match &table {
            Some(table) => format!("diagnosing provided table ({} rows)...", table.height()),
            None => format!("loading {} for diagnosis...", path.display()),
        };
        self.observer.on_step_start(Step::Diagnose, &message);

        match diagnose::diagnose_missing_values(table, &path, &self.config.diagnose) {
            Ok(diagnosis) => {
                self.observer.on_diagnosis(&diagnosis.report);
                Ok(diagnosis)
            }
            Err(e) => Err(self.fail(Step::Diagnose, e)),
        }
    }

    /// Persist the prepared dataset at `output`.
    pub fn handle_missing_values(&self, table: &Table, output: &Path) -> Result<StepOutcome> {
        let output = self.resolve(output);
        if !output.exists() {
            self.observer.on_step_start(
                Step::Clean,
                &format!("creating prepared dataset as {}...", output.display()),
            );
        }
        let result = clean::handle_missing_values(table, &output);
        self.finish(Step::Clean, result)
    }

    /// Run all four steps in order, stopping at the first failure.
    pub async fn run(&self) -> Result<PipelineReport> {
        self.config.validate()?;
        let files = &self.config.files;
        tracing::info!(workspace = %self.workspace.display(), "starting pipeline");

        let raw_full = self.download_raw(&files.raw_full).await?;
        let raw_short = self
            .create_raw_short(&files.raw_full, &files.raw_short, &self.config.sample)
            .await?;
        let Diagnosis { table, report } = self.diagnose_missing_values(None, &files.raw_short)?;
        let prepared = self.handle_missing_values(&table, &files.prepared)?;

        tracing::info!("pipeline finished");
        Ok(PipelineReport {
            raw_full,
            raw_short,
            diagnosis: report,
            prepared,
        })
    }

    fn finish(&self, step: Step, result: Result<StepOutcome>) -> Result<StepOutcome> {
        match result {
            Ok(outcome) => {
                self.observer.on_step_complete(step, &outcome);
                Ok(outcome)
            }
            Err(e) => Err(self.fail(step, e)),
        }
    }

    fn fail(&self, step: Step, error: WrangleError) -> WrangleError {
        tracing::error!(%step, error = %error, "step failed");
        self.observer.on_step_failed(step, &error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FailingFetcher;

    #[async_trait]
    impl DatasetFetcher for FailingFetcher {
        async fn fetch(&self, _dataset: &str) -> std::result::Result<PathBuf, FetchError> {
            Err(FetchError::Status {
                status: 403,
                url: "https://example.invalid".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn on_step_complete(&self, step: Step, outcome: &StepOutcome) {
            let status = if outcome.is_skipped() { "skipped" } else { "created" };
            self.events.lock().unwrap().push(format!("{step}:{status}"));
        }

        fn on_step_failed(&self, step: Step, _error: &WrangleError) {
            self.events.lock().unwrap().push(format!("{step}:failed"));
        }
    }

    #[test]
    fn test_step_outcome_path() {
        let skipped = StepOutcome::Skipped {
            path: PathBuf::from("raw_full.csv"),
        };
        assert_eq!(skipped.path(), Path::new("raw_full.csv"));
        assert!(skipped.is_skipped());

        let created = StepOutcome::Created {
            path: PathBuf::from("raw_short.csv"),
            rows: Some(3),
        };
        assert!(!created.is_skipped());
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            serde_json::json!({"status": "created", "path": "raw_short.csv", "rows": 3})
        );
    }

    #[test]
    fn test_resolve_relative_to_workspace() {
        let pipeline = Pipeline::new(
            WrangleConfig::default(),
            "/data/ws",
            Arc::new(FailingFetcher),
        );
        assert_eq!(
            pipeline.resolve(Path::new("raw_full.csv")),
            PathBuf::from("/data/ws/raw_full.csv")
        );
        assert_eq!(
            pipeline.resolve(Path::new("/abs/raw.csv")),
            PathBuf::from("/abs/raw.csv")
        );
    }

    #[tokio::test]
    async fn test_failed_acquisition_stops_run() {
        let dir = TempDir::new().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = Pipeline::new(WrangleConfig::default(), dir.path(), Arc::new(FailingFetcher))
            .with_observer(observer.clone());

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(
            err,
            WrangleError::Fetch(FetchError::Status { status: 403, .. })
        ));
        assert_eq!(*observer.events.lock().unwrap(), vec!["acquire:failed"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sampler_acquires_missing_full_dataset() {
        let dir = TempDir::new().unwrap();
        let pipeline =
            Pipeline::new(WrangleConfig::default(), dir.path(), Arc::new(FailingFetcher));
        let config = SampleConfig::default();

        let err = pipeline
            .create_raw_short(Path::new("raw_full.csv"), Path::new("raw_short.csv"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, WrangleError::Fetch(_)));
        assert!(!dir.path().join("raw_short.csv").exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_step() {
        let dir = TempDir::new().unwrap();
        let mut config = WrangleConfig::default();
        config.sample.reduction_percent = 0.0;
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = Pipeline::new(config, dir.path(), Arc::new(FailingFetcher))
            .with_observer(observer.clone());

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, WrangleError::Config(_)));
        assert!(observer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_diagnose_missing_file() {
        let dir = TempDir::new().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = Pipeline::new(WrangleConfig::default(), dir.path(), Arc::new(FailingFetcher))
            .with_observer(observer.clone());

        let err = pipeline
            .diagnose_missing_values(None, Path::new("raw_short.csv"))
            .unwrap_err();
        assert!(matches!(err, WrangleError::NotFound { .. }));
        assert_eq!(*observer.events.lock().unwrap(), vec!["diagnose:failed"]);
    }
}
