use std::num::ParseIntError;

use thiserror::Error;

pub type DemandResult<T> = Result<T, DemandError>;

#[derive(Debug, Error)]
pub enum DemandError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Experiment(#[from] ExperimentError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    System(#[from] SystemError),
}

impl DemandError {
    /// Returns true if the error was caused by the caller's input rather than
    /// by the environment (filesystem, network, internal invariants).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Data(
                DataError::MissingColumn(_)
                    | DataError::InvalidValue { .. }
                    | DataError::TimestampConversion(_)
                    | DataError::InsufficientHistory { .. }
                    | DataError::EmptyInput
            ) | Self::Model(ModelError::FeatureMismatch(_))
        )
    }
}

/// Errors related to raw data loading, resampling and feature extraction.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Missing required column: '{0}'")]
    MissingColumn(String),

    #[error("Invalid value in column '{column}': {msg}")]
    InvalidValue { column: String, msg: String },

    #[error("Failed timestamp conversion: {0}")]
    TimestampConversion(String),

    #[error(
        "Insufficient history: no complete rows left for n_lag_days={n_lag_days} over {hours} hourly records"
    )]
    InsufficientHistory { n_lag_days: usize, hours: usize },

    #[error("Input time series is empty")]
    EmptyInput,

    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Failed to fetch data source: {0}")]
    Fetch(String),
}

/// Errors raised by the forecast model capability.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Artifact has wrong model type: expected '{expected}', found '{found}'")]
    KindMismatch { expected: String, found: String },

    #[error("Model has not been trained")]
    NotFitted,

    #[error("Invalid hyperparameters: {0}")]
    InvalidParams(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Feature columns do not match the trained model: {0}")]
    FeatureMismatch(String),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("Estimator failed: {0}")]
    Estimator(String),
}

/// Errors related to run versioning and evaluation.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Malformed run directory name '{name}': expected a numeric suffix")]
    MalformedRunDir {
        name: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Run directory '{0}' already carries the largest possible run id")]
    RunIdExhausted(String),

    #[error("Run directory already exists: {0}")]
    RunDirExists(String),

    #[error("Invalid cross-validation setup: {0}")]
    InvalidSplits(String),
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Errors related to internal invariants.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub(crate) fn polars_to_demand_error(context: &str, e: polars::error::PolarsError) -> DemandError {
    DataError::DataFrame(format!("{context}: {e}")).into()
}
