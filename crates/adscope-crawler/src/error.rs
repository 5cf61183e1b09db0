//! Crawl engine error types.

use thiserror::Error;

/// Errors surfaced by the crawl engine.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Persistence layer failure.
    #[error("database error: {0}")]
    Database(#[from] adscope_db::DatabaseError),

    /// Configuration failure.
    #[error("configuration error: {0}")]
    Config(#[from] adscope_core::ConfigError),

    /// No access token is configured for the archive.
    #[error("no access token configured (set ADSCOPE_ACCESS_TOKEN or run.access_token)")]
    MissingToken,

    /// HTTP client construction or request failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O failure while archiving a response body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for crawl operations.
pub type Result<T> = std::result::Result<T, CrawlError>;
