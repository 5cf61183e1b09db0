//! Database connection management.
//!
//! Provides a `DbPool` wrapper around `SQLx` that handles connection
//! options for the single-writer queue store.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// SQLite connection pool for the adscope databases.
///
/// The store has a single writer, so the pool holds exactly one
/// connection; every mutation runs serialized on it.
#[derive(Debug)]
pub struct DbPool {
    pool: Pool<Sqlite>,
}

impl DbPool {
    /// Open (or create) the database at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the `SQLite` database file (or `:memory:` for in-memory)
    ///
    /// # Errors
    /// Returns `DatabaseError::Open` if the database file cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| DatabaseError::Open("invalid database path: not valid UTF-8".to_string()))?;

        let connect_options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::Open(format!("failed to initialize pool: {e}")))?;

        tracing::info!("Database pool created at {}", path_str);

        Ok(Self { pool })
    }

    /// Get a reference to the underlying `SQLx` pool.
    ///
    /// This allows consumers to execute queries directly using `SQLx`.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = DbPool::new(":memory:").await.expect("create pool");

        sqlx::query("SELECT 1")
            .execute(pool.pool())
            .await
            .expect("probe query");
    }

    #[tokio::test]
    async fn test_pool_creates_file() {
        let tmp = tempfile::TempDir::new().expect("create temp dir");
        let db_path = tmp.path().join("adscope.sqlite");

        let pool = DbPool::new(&db_path).await.expect("create pool");
        assert!(db_path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_pool_close() {
        let pool = DbPool::new(":memory:").await.expect("create pool");
        pool.close().await; // Should not panic
    }
}
