//! Error types for the training feature pipeline
//!
//! Clear error messages that name the offending source, column or key.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Feature pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    /// A raw source or intermediate table lacks a required column
    #[error("Missing column '{column}' in {table}")]
    MissingColumn {
        /// Table the column was expected in (e.g. "strength events")
        table: String,
        /// Name of the missing column
        column: String,
    },

    /// A column exists but its Arrow type cannot be used for its role
    #[error("Column '{column}' has type {found}, expected {expected}")]
    TypeMismatch {
        /// Column name
        column: String,
        /// Expected type description
        expected: String,
        /// Actual Arrow data type
        found: String,
    },

    /// The same key appears twice in a table that must be keyed uniquely
    #[error("Duplicate key {key} in {table}")]
    DuplicateKey {
        /// Table the duplicate was detected in
        table: String,
        /// Rendered key (date, or date/category)
        key: String,
    },

    /// Two inputs disagree on the value of a shared column for the same date
    #[error("Conflicting values for column '{column}' on {date}")]
    ConflictingValues {
        /// Shared column name
        column: String,
        /// Date of the conflicting row
        date: String,
    },

    /// Internal invariant broken (one row per date, sorted dates, ...)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Pipeline configuration rejected before any computation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Storage error (CSV/Parquet export)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::MissingColumn`]
    pub(crate) fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}
