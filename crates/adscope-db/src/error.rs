//! Database error types.
//!
//! Provides error handling for persistence operations using `thiserror`.

use thiserror::Error;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create database connection.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Requested task key does not exist.
    #[error("task #{0} not found")]
    TaskNotFound(i64),

    /// A task spec was missing a required identity field.
    #[error("invalid task spec: {0}")]
    InvalidSpec(String),

    /// A finish log was missing a required field.
    #[error("missing field in finish log: {0}")]
    MissingField(String),

    /// Failed to decode a database value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
