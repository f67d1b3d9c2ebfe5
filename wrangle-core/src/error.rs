//! Error types for the wrangle pipeline.
//!
//! Uses `thiserror` for structured error variants covering dataset
//! acquisition, table I/O, stratified sampling and configuration.

use std::path::PathBuf;

/// Top-level error type for the wrangle core library.
#[derive(Debug, thiserror::Error)]
pub enum WrangleError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Sampling error: {0}")]
    Sample(#[from] SampleError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Column '{column}' does not exist in the table. Detected column names: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Unable to find {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while downloading and unpacking the raw dataset.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid dataset identifier '{id}', expected '<owner>/<slug>'")]
    InvalidDatasetId { id: String },

    #[error("Registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Expected exactly one file in {dir}, found {found}")]
    UnexpectedLayout { dir: PathBuf, found: usize },

    #[error("Extraction task failed: {message}")]
    Task { message: String },

    #[error("IO error during fetch: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from building, reading or writing tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Column '{column}' has {actual} cells, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column name: {column}")]
    DuplicateColumn { column: String },

    #[error("Invalid row index value '{value}' on line {line}")]
    InvalidIndex { value: String, line: u64 },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors from the stratified splitter.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Reduction fraction must be strictly between 0 and 1, got {fraction}")]
    InvalidFraction { fraction: f64 },

    #[error("Cannot sample an empty table")]
    EmptyTable,

    #[error(
        "The least populated class '{class}' has only {count} member(s); at least 2 are required"
    )]
    ClassTooSmall { class: String, count: usize },

    #[error("{side} size {size} is smaller than the number of classes ({classes})")]
    TooFewRows {
        side: &'static str,
        size: usize,
        classes: usize,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl From<Box<figment::Error>> for ConfigError {
    fn from(err: Box<figment::Error>) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `WrangleError`.
pub type Result<T> = std::result::Result<T, WrangleError>;
