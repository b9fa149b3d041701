//! Error types for the roundlog engine.

use thiserror::Error;

/// Validation failures in the coverage registry file.
///
/// Raised eagerly at load time, before any observation is processed. Each
/// variant names the offending unit id (and field, where one exists) so the
/// operator can fix the registry without a stack trace.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Top level of the registry file is not a JSON object
    #[error("registry must be a JSON object of {{unit_id: {{x, y, radius}}}}")]
    NotAnObject,

    /// Registry object contains no units
    #[error("registry must contain at least one coverage unit")]
    Empty,

    /// A unit entry is not an object
    #[error("unit '{unit}' must map to an object with x/y/radius")]
    UnitNotAnObject { unit: String },

    /// A required field is absent
    #[error("unit '{unit}' is missing field '{field}'")]
    MissingField { unit: String, field: &'static str },

    /// A field is present but not numeric
    #[error("unit '{unit}' field '{field}' must be numeric")]
    NonNumericField { unit: String, field: &'static str },

    /// Radius must be strictly positive
    #[error("unit '{unit}' has non-positive radius {radius}")]
    NonPositiveRadius { unit: String, radius: f64 },
}

/// Failure of the external mobility source.
///
/// The pipeline never recovers from these; they propagate after the open
/// round has been flushed.
#[derive(Debug, Error)]
#[error("mobility source failure: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    /// Creates a source error from any displayable cause.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Crate-level error for the roundlog engine.
#[derive(Debug, Error)]
pub enum RoundlogError {
    /// Invalid coverage registry
    #[error("registry config error: {0}")]
    Config(#[from] ConfigError),

    /// External mobility source failed mid-run
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Log or report file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a log or registry file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV report emission failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A log record arrived with a round index at or below the last one written
    #[error("round {round} is not above the last written round {last}")]
    NonMonotonicRound { round: u64, last: u64 },

    /// Bundle preparation cannot satisfy the disjointness constraint
    #[error(
        "not enough indices for disjoint bundles: need {needed}, have {available}; \
         reduce bundle size or increase the dataset"
    )]
    BundleCapacity { needed: usize, available: usize },
}
