//! Error types for the ORM.

use std::time::Duration;

use burrow_core::{BuildError, ScanError, SchemaError};
use thiserror::Error;

/// Errors raised while binding result rows to a destination.
#[derive(Debug, Error)]
pub enum BindError {
    /// The query has no destination to scan into.
    #[error("query has no model; use model() or scan_into()")]
    NoDestination,

    /// The destination cannot be used for this operation.
    #[error("unsupported destination: {0}")]
    Unsupported(String),

    /// A result column has no matching field.
    #[error("{table} does not have column {column:?}")]
    UnknownColumn { table: String, column: String },

    /// Scalar destinations received a different number of columns.
    #[error("expected {expected} columns, got {got}")]
    ColumnCount { expected: usize, got: usize },

    /// A column value could not be converted into its field.
    #[error("cannot scan column {column:?}: {source}")]
    Scan {
        column: String,
        #[source]
        source: ScanError,
    },

    /// A before/after-scan hook failed.
    #[error("{model} scan hook failed: {message}")]
    Hook { model: &'static str, message: String },
}

/// Errors raised by the connection while running a statement.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// The call's cancel token fired.
    #[error("query cancelled")]
    Cancelled,

    /// The call's deadline passed.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Any other connection failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// ORM errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Bind(#[from] BindError),

    /// A round trip failed; carries the statement text.
    #[error("query failed: {source} (query: {query})")]
    Execution {
        query: String,
        #[source]
        source: DriverError,
    },

    /// A single-record destination matched no rows.
    #[error("no rows in result set")]
    NoRows,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for [`Error::NoRows`].
    #[must_use]
    pub const fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    /// Returns true when the round trip was cancelled or timed out.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Execution {
                source: DriverError::Cancelled | DriverError::Timeout(_),
                ..
            }
        )
    }
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, Error>;
