//! Error types for forging and evaluation.
//!
//! Grouped by how a failure is handled:
//! - [`ConfigError`]: a malformed input document or setting. Fatal to the run.
//! - [`ForgeError`]: a failure while synthesising one aggregate row (or one
//!   batch job). Fatal to that unit of work only.
//! - [`DataError`]: a column, key or cell expected by a reader or join is
//!   missing or unreadable. Surfaced to the caller, never defaulted.
//! - [`ImportanceError`]: the evaluator cannot propagate a marginal.

use std::path::PathBuf;

/// Errors in distribution, rule, profile and settings documents.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A probability spec is neither a mapping nor an ordered sequence.
    #[error("Variable '{variable}': probability spec must be a mapping or a sequence, found {found}")]
    InvalidSpecType { variable: String, found: String },

    /// A document does not have the expected shape.
    #[error("Invalid {document} document: {reason}")]
    InvalidDocument { document: String, reason: String },

    /// A probability or weight is negative or not finite.
    #[error("Variable '{variable}': invalid probability {value} for '{outcome}'")]
    InvalidProbability {
        variable: String,
        outcome: String,
        value: f64,
    },

    /// Hourly profile does not have exactly 24 entries.
    #[error("Hourly profile '{profile}' has {found} entries, expected 24")]
    ProfileLength { profile: String, found: usize },

    /// Hourly profile weights sum to zero.
    #[error("Hourly profile '{0}' has no weight in any hour")]
    ZeroProfile(String),

    /// No hourly profile was supplied.
    #[error("Hourly profile set is empty")]
    NoProfiles,

    /// Room occupancy outcome is not a positive integer.
    #[error("Room occupancy outcome '{0}' is not a positive integer")]
    InvalidOccupancy(String),

    /// Variables condition on each other in a loop.
    #[error("Condition cycle detected through variable '{0}'")]
    ConditionCycle(String),

    /// Sweep template arrays disagree on candidate count.
    #[error("Sweep variable '{variable}': expected {expected} candidates, found {found}")]
    SweepLengthMismatch {
        variable: String,
        expected: usize,
        found: usize,
    },

    /// A setting could not be parsed or is out of range.
    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// JSON parse failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while forging a row or running a batch job.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Condition value not found in the guest, room or aggregate row.
    #[error("Variable '{variable}' is conditioned on '{condition}', which has no value in this context")]
    UnresolvedCondition { variable: String, condition: String },

    /// Condition value resolved but the distribution has no branch for it.
    #[error("Variable '{variable}' has no probabilities for {condition} = '{value}'")]
    MissingBranch {
        variable: String,
        condition: String,
        value: String,
    },

    /// A categorical branch cannot be sampled (all zero weights).
    #[error("Variable '{variable}' cannot be sampled: {reason}")]
    DegenerateDistribution { variable: String, reason: String },

    /// Hourly disaggregation referenced a profile that does not exist.
    #[error("Guest {guest_id} is tagged with unknown hourly profile '{profile}'")]
    UnknownProfile { guest_id: String, profile: String },

    /// Aggregate row is not usable (bad month, negative consumption, ...).
    #[error("Invalid aggregate row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    /// A batch worker panicked or was cancelled.
    #[error("Batch job {index} failed: {reason}")]
    WorkerFailed { index: usize, reason: String },

    /// Configuration problem discovered mid-run.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors reading, writing or joining tabular data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Expected column absent.
    #[error("Column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    /// Cell could not be parsed into the expected type.
    #[error("Row {row}, column '{column}': cannot parse '{value}'")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    /// Two tables being joined share a value column name.
    #[error("Join conflict: column '{0}' exists on both sides")]
    DuplicateColumn(String),

    /// A feature appears twice in one importance table.
    #[error("Feature '{0}' appears more than once")]
    DuplicateFeature(String),

    /// A table row does not match the column count.
    #[error("Row for feature '{feature}' has {found} values, expected {expected}")]
    RowWidth {
        feature: String,
        expected: usize,
        found: usize,
    },

    /// File could not be opened or created.
    #[error("Cannot access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the theoretical importance evaluator.
#[derive(Debug, thiserror::Error)]
pub enum ImportanceError {
    /// A condition value reachable through the marginal has no branch.
    #[error("Variable '{variable}' has no probabilities for {condition} = '{value}'")]
    MissingBranch {
        variable: String,
        condition: String,
        value: String,
    },

    /// Empirical fallback needs a column the aggregate rows do not have.
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Any error the library can return.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Importance(#[from] ImportanceError),
}

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, Error>;
