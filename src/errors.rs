//! Centralized error handling for earthgrid
//!
//! Every failure a conversion job can hit is a [`ConvertError`]. The batch
//! driver never propagates these past a job boundary; it records them in the
//! job outcome and carries on with the next file.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for earthgrid operations
#[derive(Error, Debug)]
pub enum ConvertError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input (config files, grib2json intermediates)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Variable not found in the source file
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// Dimension not found in variable
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// The source file exists but cannot be turned into a field
    #[error("Failed to read source: {0}")]
    SourceRead(String),

    /// Degenerate geometry handed to the regridder
    #[error("Interpolation failed: {0}")]
    Interpolation(String),

    /// Output or catalog could not be written
    #[error("Failed to write {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },

    /// Invalid configuration, detected before any job runs
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Coarse classification used when reporting batch results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    SourceRead,
    Interpolation,
    Encode,
    Config,
}

impl ConvertError {
    /// Build an [`ConvertError::Encode`] from any displayable cause.
    pub fn encode(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        ConvertError::Encode {
            path: path.into(),
            message: cause.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ConvertError::NetCDF(_)
            | ConvertError::Json(_)
            | ConvertError::Array(_)
            | ConvertError::VariableNotFound { .. }
            | ConvertError::DimensionNotFound { .. }
            | ConvertError::SourceRead(_) => ErrorCategory::SourceRead,
            ConvertError::Interpolation(_) => ErrorCategory::Interpolation,
            ConvertError::Io(_) | ConvertError::Encode { .. } => ErrorCategory::Encode,
            ConvertError::Config(_) | ConvertError::ThreadPool(_) => ErrorCategory::Config,
        }
    }
}

/// Result type alias for earthgrid operations
pub type Result<T> = std::result::Result<T, ConvertError>;
