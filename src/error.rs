//! Error types for the persistence layer.
//!
//! Errors are organized into four categories matching how callers must react:
//! configuration problems are fatal at startup, invalid arguments are caller
//! bugs surfaced immediately, persistence failures are logged server-side and
//! surfaced generically, and migration failures halt the run and require
//! operator intervention.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Missing or invalid connection parameters, unresolvable identifiers.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Caller-supplied arguments that can never succeed.
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),

    /// Failures while talking to the database.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Failures while applying or reverting schema migrations.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Errors raised while resolving dialect/schema identifiers or building
/// connection configuration. Fatal at startup; never retried.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// A required connection parameter was absent at connect time.
    #[error("missing required connection parameter: {field}")]
    MissingField { field: &'static str },

    /// The dialect identifier is not one of the supported dialects.
    #[error("unsupported dialect: {value}")]
    UnsupportedDialect { value: String },

    /// The schema identifier is not one of the supported schemas.
    #[error("unsupported schema: {value}")]
    UnsupportedSchema { value: String },

    /// A parameter was present but could not be parsed or is inconsistent.
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors raised for malformed caller input. Surfaced immediately,
/// never retried.
#[derive(Error, Debug)]
pub enum InvalidArgumentError {
    /// `find_by_criteria` was called with no criteria object at all.
    #[error("{entity} criteria is required")]
    MissingCriteria { entity: &'static str },

    /// A required argument field was absent.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// The date range ends before it starts.
    #[error("malformed date range: start {start} is after end {end}")]
    MalformedDateRange { start: String, end: String },
}

/// Errors raised by the database while executing statements.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Could not establish or check out a connection.
    #[error("connection failed for {dialect}: {message}")]
    ConnectionFailed {
        dialect: &'static str,
        message: String,
    },

    /// The pool had no connection available.
    #[error("connection pool exhausted for {dialect}")]
    PoolExhausted { dialect: &'static str },

    /// A uniqueness, foreign-key, or not-null constraint was violated.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// A statement failed to execute or its results could not be read.
    #[error("query execution failed: {message}")]
    QueryFailed { message: String },

    /// A multi-statement write could not be committed; it was rolled back.
    #[error("transaction failed: {message}")]
    TransactionFailed { message: String },
}

/// Errors raised by the migration runner. The failing step is named so an
/// operator can intervene; previously applied steps stay committed.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// A migration step's up or down action failed.
    #[error("migration step '{step}' failed: {message} (apply remaining steps manually and re-run)")]
    StepFailed { step: &'static str, message: String },

    /// The migration log table could not be created or read.
    #[error("migration log unavailable: {message}")]
    LogUnavailable { message: String },

    /// A rollback target was named that is not a known step.
    #[error("unknown migration target step: {step}")]
    UnknownTarget { step: String },
}

/// Result type alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<tokio_postgres::Error> for PersistenceError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Class 23 SQLSTATEs are integrity constraint violations.
        if let Some(state) = err.code() {
            if state.code().starts_with("23") {
                return PersistenceError::ConstraintViolation {
                    message: err.to_string(),
                };
            }
        }
        PersistenceError::QueryFailed {
            message: err.to_string(),
        }
    }
}

impl From<tiberius::error::Error> for PersistenceError {
    fn from(err: tiberius::error::Error) -> Self {
        if let tiberius::error::Error::Server(token) = &err {
            // 2601/2627 duplicate key, 547 FK violation, 515 NOT NULL.
            if matches!(token.code(), 515 | 547 | 2601 | 2627) {
                return PersistenceError::ConstraintViolation {
                    message: err.to_string(),
                };
            }
        }
        PersistenceError::QueryFailed {
            message: err.to_string(),
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        StoreError::Persistence(err.into())
    }
}

impl From<tiberius::error::Error> for StoreError {
    fn from(err: tiberius::error::Error) -> Self {
        StoreError::Persistence(err.into())
    }
}
