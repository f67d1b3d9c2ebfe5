//! # Wrangle Core
//!
//! Preparation pipeline for the NF-UQ-NIDS-v2 network intrusion dataset.
//! Provides dataset acquisition, stratified reduction, missing-value
//! diagnosis, cleaning, configuration, and the step driver.

pub mod acquire;
pub mod clean;
pub mod config;
pub mod diagnose;
pub mod error;
pub mod persistence;
pub mod pipeline;
pub mod sample;
pub mod table;

// Re-export commonly used types at the crate root.
pub use acquire::{DatasetFetcher, KaggleCredentials, KaggleFetcher};
pub use config::{AcquireConfig, FileConfig, SampleConfig, WrangleConfig};
pub use diagnose::{ColumnDiagnosis, ColumnReport, Diagnosis, DiagnosisCriteria, DiagnosisReport};
pub use error::{ConfigError, FetchError, Result, SampleError, TableError, WrangleError};
pub use pipeline::{NoOpObserver, Pipeline, PipelineObserver, PipelineReport, Step, StepOutcome};
pub use table::{Column, ColumnData, ColumnKind, Table};
