//! Error types for the bolflow library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum BolflowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Malformed classification: {0}")]
    MalformedClassification(String),

    #[error("Invalid window specification: {0}")]
    InvalidWindowSpec(String),

    #[error("Unknown group type '{0}'")]
    UnknownGroupType(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Missing metrics for group '{0}'; compute group metrics first")]
    MissingMetrics(String),

    #[error("Sample '{0}' appears in more than one input table")]
    DuplicateSample(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Step {index} ({step}) failed: {source}")]
    Step {
        index: usize,
        step: String,
        #[source]
        source: Box<BolflowError>,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BolflowError {
    /// The error that caused a failed pipeline step, or `self` otherwise.
    pub fn root_cause(&self) -> &BolflowError {
        match self {
            BolflowError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, BolflowError>;
