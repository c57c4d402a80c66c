//! Error types for the calibration engine.
//!
//! Errors are classified by how far they may propagate:
//! - Isolated: one analysis failing (`AnalysisError`) becomes a `status=error` result
//! - Rejected: a malformed narrative request (`ValidationError`)
//! - Degraded: anything else in the narrative path turns into "narrative absent"

use thiserror::Error;

/// Failure inside a single analysis function.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation failed: {0}")]
    Computation(String),

    #[error("Analysis panicked: {0}")]
    Panicked(String),
}

/// Failure while building the external (anonymized) payload.
///
/// Raised instead of emitting a partially anonymized payload.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Employee record at index {0} has an empty identifier")]
    MissingIdentifier(usize),

    #[error("Duplicate employee identifier in roster")]
    DuplicateIdentifier,

    #[error("External payload field `{field}` still contains a real identifier")]
    IdentifierLeak { field: String },

    #[error("Could not build identifier redaction: {0}")]
    Redaction(String),

    #[error("Failed to serialize payload: {0}")]
    Serialization(String),
}

/// A rejected narrative request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No insights selected")]
    Empty,

    #[error("Too many insights selected: {count} (maximum {max})")]
    TooMany { count: usize, max: usize },

    #[error("Malformed insight id: {0:?}")]
    MalformedId(String),

    #[error("Duplicate insight id: {0}")]
    Duplicate(String),

    #[error("None of the selected ids match a known insight")]
    NoMatchingInsights,
}

/// Failure in the narrative step.
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("Invalid selection: {0}")]
    Validation(#[from] ValidationError),

    #[error("Narrative generation unavailable: {0}")]
    Unavailable(String),

    #[error("Narrative request failed: {0}")]
    CallFailure(String),

    #[error("Narrative request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Could not parse narrative response: {message}")]
    ResponseParse { message: String, raw: String },

    #[error("Could not package data for narrative: {0}")]
    Packaging(#[from] PackagingError),
}

impl NarrativeError {
    /// Returns true if the request itself was rejected (caller error).
    pub fn is_validation(&self) -> bool {
        matches!(self, NarrativeError::Validation(_))
    }
}
