//! Adscope Database Layer
//!
//! Provides `SQLite` persistence for the crawl engine: the durable task
//! queue, the rate-limit request log, and the downloads archive. Uses `SQLx`
//! with embedded migrations.
//!
//! # Architecture
//!
//! - **Single writer**: one driver process mutates the store; the pool holds
//!   a single connection so every statement is serialized
//! - **One statement, one transaction**: each queue mutation commits on its
//!   own; there is no multi-operation atomic batch
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Derived views**: active/queued/started/finished/failed/cancelled are
//!   filters over the one queue table, created by the migrations
//!
//! # Example
//!
//! ```ignore
//! use adscope_db::Database;
//!
//! let db = Database::open_in("/var/lib/adscope/db").await?;
//! let next = adscope_db::task_queue::get_next_active_task(db.pool()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod connection;
pub mod downloads;
pub mod error;
pub mod migrations;
pub mod rate_limit_log;
pub mod task_queue;

// Re-export commonly used types
pub use connection::DbPool;
pub use error::{DatabaseError, Result};
pub use task_queue::{Mutation, Task};

use std::path::Path;

/// Filename of the combined adscope database.
pub const DB_FILENAME: &str = "adscope.sqlite";

/// High-level database interface with migrations.
///
/// This provides a convenient wrapper around `DbPool` that handles
/// initialization and migration automatically.
#[derive(Debug)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at the specified path.
    ///
    /// # Arguments
    /// * `path` - Path to the database file (or `:memory:` for in-memory)
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = DbPool::new(path).await?;
        Ok(Self { pool })
    }

    /// Open (or create) the database inside a directory, creating the
    /// directory first when needed.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the directory or database cannot be created.
    pub async fn open_in(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Self::new(dir.as_ref().join(DB_FILENAME)).await
    }

    /// Run all pending database migrations.
    ///
    /// This should be called after creating a new database instance to ensure
    /// the schema is up to date.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version.
    ///
    /// Returns the number of applied migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the version cannot be queried.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// This allows direct access to the `SQLx` pool for custom queries.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
