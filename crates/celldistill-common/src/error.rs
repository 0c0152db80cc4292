//! Error types with actionable diagnostics.
//!
//! Every variant carries enough context to fix the problem without reading
//! the source, and belongs to exactly one [`ErrorCategory`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for celldistill operations.
pub type Result<T> = std::result::Result<T, CellDistillError>;

/// Coarse classification of failures, used for exit codes and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or malformed configuration, model files or encoder mapping
    Configuration,
    /// Input data unusable: too small, unparsable or poorly covered
    DataQuality,
    /// Second-round training cannot proceed
    Training,
    /// A reference feature is absent and the imputation policy forbids filling
    Alignment,
    /// Filesystem or serialization failure
    Io,
    /// Invariant violated inside the crate
    Internal,
}

/// Errors that can occur while training or applying a cell-type classifier.
#[derive(Error, Debug)]
pub enum CellDistillError {
    /// Configuration file not found at expected path.
    #[error("Configuration file not found: {path}\n  → Create a config file or pass --config with a different path")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file has invalid syntax.
    #[error("Invalid configuration syntax in {path}:\n  {message}\n  → Check YAML syntax at the indicated line")]
    ConfigParsing { path: PathBuf, message: String },

    /// Configuration value is invalid.
    #[error("Invalid configuration value for '{field}': {message}\n  → {suggestion}")]
    ConfigValue { field: String, message: String, suggestion: String },

    /// A required file of the trained model directory is missing.
    #[error("Model file missing: {path} ({what})\n  → Check that the reference model was trained successfully into this directory")]
    ModelFileMissing { path: PathBuf, what: String },

    /// Encoder mapping file is malformed or not a bijection.
    #[error("Malformed encoder mapping at line {line}: {message}\n  → Each line must be 'index:label' with unique indices 0..n and unique labels")]
    MalformedEncoder { line: usize, message: String },

    /// Feature coverage fell below the configured hard minimum.
    #[error("Feature coverage {coverage:.3} ({matched}/{total} reference features) is below the hard minimum {minimum:.3}\n  → Use a target dataset measured on a compatible gene panel, or lower coverage.fail_below")]
    LowCoverage { coverage: f64, minimum: f64, matched: usize, total: usize },

    /// Too few observations remain after filtering.
    #[error("Too few cells or features left: {cells} cells x {features} features (minimum {minimum} of each)\n  → Check the input matrix orientation and filtering thresholds")]
    TooFewObservations { cells: usize, features: usize, minimum: usize },

    /// Input data could not be parsed.
    #[error("Malformed input data in {path}: {message}\n  → Expected a dense CSV with feature names in the first column and cell identifiers in the header")]
    MalformedData { path: PathBuf, message: String },

    /// Reference features absent from the target under the `fail` policy.
    #[error("{missing} reference features are absent from the target (first: '{first}')\n  → Set coverage.impute to 'zero' to fill missing features with zeros")]
    MissingFeatures { missing: usize, first: String },

    /// Confident-cell set cannot support teacher training.
    #[error("Cannot train second round: {confident_cells} confident cells across {classes} classes (need at least 1 cell and {required} classes)\n  → Lower prediction.min_confident_classes, raise confidence_fraction, or use direct_predict")]
    InsufficientConfidentCells { confident_cells: usize, classes: usize, required: usize },

    /// Invalid tensor shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}\n  → Check that the model was trained on the same feature space")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic error for unexpected conditions.
    #[error("Internal error: {message}\n  → Please report this bug with the command and config used")]
    Internal { message: String },
}

impl CellDistillError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigParsing { .. }
            | Self::ConfigValue { .. }
            | Self::ModelFileMissing { .. }
            | Self::MalformedEncoder { .. } => ErrorCategory::Configuration,
            Self::LowCoverage { .. } | Self::TooFewObservations { .. } | Self::MalformedData { .. } => {
                ErrorCategory::DataQuality
            }
            Self::InsufficientConfidentCells { .. } => ErrorCategory::Training,
            Self::MissingFeatures { .. } => ErrorCategory::Alignment,
            Self::Io { .. } | Self::Serialization { .. } => ErrorCategory::Io,
            Self::ShapeMismatch { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Check if this error is user-recoverable.
    pub fn is_user_error(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Internal | ErrorCategory::Io)
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "E001",
            Self::ConfigParsing { .. } => "E002",
            Self::ConfigValue { .. } => "E003",
            Self::ModelFileMissing { .. } => "E010",
            Self::MalformedEncoder { .. } => "E011",
            Self::LowCoverage { .. } => "E020",
            Self::TooFewObservations { .. } => "E021",
            Self::MalformedData { .. } => "E022",
            Self::MissingFeatures { .. } => "E030",
            Self::InsufficientConfidentCells { .. } => "E040",
            Self::ShapeMismatch { .. } => "E050",
            Self::Io { .. } => "E060",
            Self::Serialization { .. } => "E061",
            Self::Internal { .. } => "E999",
        }
    }
}
