//! The durable task queue.
//!
//! This module is the single source of truth for task existence and
//! lifecycle state. A task row is never deleted; it is the audit trail of
//! the crawl. Lifecycle transitions are guarded UPDATEs whose WHERE clause
//! encodes the preconditions, so a call that arrives in the wrong state
//! changes nothing and reports [`Mutation::Ignored`] instead of failing;
//! the driver is allowed to repeat itself.

use adscope_core::spec::{FinishLog, TaskSpecs};
use adscope_core::types::{FinishCode, TaskKey};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::error::{DatabaseError, Result};

/// Outcome of a lifecycle mutation.
///
/// `Ignored` means the row existed in a state that did not satisfy the
/// transition's preconditions (or the key was unknown) and nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The row was updated.
    Applied,
    /// Preconditions were not met; the store is unchanged.
    Ignored,
}

impl Mutation {
    /// True when the mutation changed the row.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    fn from_rows_affected(rows: u64) -> Self {
        if rows > 0 {
            Self::Applied
        } else {
            Self::Ignored
        }
    }
}

/// One row of the task queue.
#[derive(Debug, Clone)]
pub struct Task {
    /// Monotonically assigned queue key.
    pub key: TaskKey,
    /// Queue priority; higher dequeues first.
    pub priority: i64,
    /// Lifecycle flag: execution has begun.
    pub started: bool,
    /// Lifecycle flag: execution has completed.
    pub finished: bool,
    /// Overlay flag: blocked from starting or finishing.
    pub cancelled: bool,
    /// Overlay flag: terminal failure marker, kept for audit.
    pub failed: bool,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the task was started, once it has been.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task was finished, once it has been.
    pub finished_at: Option<DateTime<Utc>>,
    /// The full task description.
    pub specs: TaskSpecs,
    /// Outcome classifier, once amended.
    pub finish_code: Option<FinishCode>,
    /// Full structured outcome, once amended.
    pub finish_log: Option<FinishLog>,
    /// Access token the attempt ran with, once amended.
    pub access_token: Option<String>,
    /// Ads retrieved by the attempt, once amended.
    pub ad_count: Option<i64>,
    /// Next-page cursor reported by the provider, once amended.
    pub paging_cursor: Option<String>,
    /// Provider error code, once amended.
    pub error_code: Option<i64>,
}

impl Task {
    /// True when the task is eligible to run next.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancelled && !self.started && !self.finished
    }
}

/// Insert a new task row.
///
/// A task whose continuation already carries the failed flag is inserted
/// marked failed (the forcibly-terminated end of a lineage). Failed rows are
/// born cancelled as well, so they are never picked up as runnable work;
/// only an explicit restart lifts the cancellation, and the failed marker
/// stays behind for audit.
///
/// # Errors
/// Returns `DatabaseError::InvalidSpec` if the spec lacks an experiment key
/// or folder.
pub async fn create_task(pool: &Pool<Sqlite>, specs: &TaskSpecs) -> Result<TaskKey> {
    if specs.experiment.experiment_key.is_empty() {
        return Err(DatabaseError::InvalidSpec(
            "experiment_key must not be empty".to_string(),
        ));
    }
    if specs.experiment.experiment_folder.is_empty() {
        return Err(DatabaseError::InvalidSpec(
            "experiment_folder must not be empty".to_string(),
        ));
    }

    let is_failed = i64::from(specs.continuation.failed);
    let result = sqlx::query(
        "INSERT INTO task_queue (
            created_at, task_priority, is_failed, is_cancelled,
            experiment_key, split_index, page_index, page_attempt, attempt_index,
            experiment_spec, split_spec, page_spec, attempt_spec, continuation,
            experiment_folder
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(specs.priority())
    .bind(is_failed)
    .bind(is_failed)
    .bind(&specs.experiment.experiment_key)
    .bind(i64::from(specs.split.split_index))
    .bind(i64::from(specs.page.page_index))
    .bind(i64::from(specs.attempt.page_attempt))
    .bind(i64::from(specs.attempt.attempt_index))
    .bind(serialize_json(&specs.experiment)?)
    .bind(serialize_json(&specs.split)?)
    .bind(serialize_json(&specs.page)?)
    .bind(serialize_json(&specs.attempt)?)
    .bind(serialize_json(&specs.continuation)?)
    .bind(&specs.experiment.experiment_folder)
    .execute(pool)
    .await?;

    let key = TaskKey::new(result.last_insert_rowid());
    tracing::debug!("Created task {} (failed = {})", key, is_failed != 0);
    Ok(key)
}

/// Transition a task from active to started and stamp the start time.
///
/// Ignored unless the task is currently active (uncancelled, unstarted,
/// unfinished).
pub async fn start_task(pool: &Pool<Sqlite>, key: TaskKey) -> Result<Mutation> {
    let result = sqlx::query(
        "UPDATE task_queue SET is_started = 1, started_at = ?
         WHERE task_key = ? AND is_cancelled = 0 AND is_started = 0 AND is_finished = 0",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(key.as_i64())
    .execute(pool)
    .await?;

    Ok(Mutation::from_rows_affected(result.rows_affected()))
}

/// Transition a task from started to finished and stamp the finish time.
///
/// Ignored unless the task has been started, is not cancelled, and is not
/// already finished.
pub async fn finish_task(pool: &Pool<Sqlite>, key: TaskKey) -> Result<Mutation> {
    let result = sqlx::query(
        "UPDATE task_queue SET is_finished = 1, finished_at = ?
         WHERE task_key = ? AND is_cancelled = 0 AND is_started = 1 AND is_finished = 0",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(key.as_i64())
    .execute(pool)
    .await?;

    Ok(Mutation::from_rows_affected(result.rows_affected()))
}

/// Set the cancelled overlay regardless of the task's current state.
pub async fn cancel_task(pool: &Pool<Sqlite>, key: TaskKey) -> Result<Mutation> {
    let result = sqlx::query("UPDATE task_queue SET is_cancelled = 1 WHERE task_key = ?")
        .bind(key.as_i64())
        .execute(pool)
        .await?;

    Ok(Mutation::from_rows_affected(result.rows_affected()))
}

/// Make a task eligible to run again.
///
/// Clears started, finished, and cancelled; the failed flag is left in
/// place as the audit record of the earlier failure.
pub async fn restart_task(pool: &Pool<Sqlite>, key: TaskKey) -> Result<Mutation> {
    let result = sqlx::query(
        "UPDATE task_queue SET is_started = 0, is_finished = 0, is_cancelled = 0
         WHERE task_key = ?",
    )
    .bind(key.as_i64())
    .execute(pool)
    .await?;

    Ok(Mutation::from_rows_affected(result.rows_affected()))
}

/// Write the outcome fields onto an existing row.
///
/// Does not alter any lifecycle flag; a crash between `finish_task` and
/// `amend_task` leaves a finished-but-unamended row, which readers must
/// tolerate.
///
/// # Errors
/// Returns `DatabaseError::MissingField` if the finish log carries no
/// access token.
pub async fn amend_task(
    pool: &Pool<Sqlite>,
    key: TaskKey,
    finish_code: FinishCode,
    finish_log: &FinishLog,
) -> Result<Mutation> {
    let access_token = finish_log
        .access_token
        .as_deref()
        .ok_or_else(|| DatabaseError::MissingField("access_token".to_string()))?;

    let result = sqlx::query(
        "UPDATE task_queue SET
            finish_code = ?, finish_log = ?, access_token = ?,
            ad_count = ?, paging_cursor = ?, error_code = ?
         WHERE task_key = ?",
    )
    .bind(finish_code.as_i64())
    .bind(serialize_json(finish_log)?)
    .bind(access_token)
    .bind(finish_log.ad_count.unwrap_or(0))
    .bind(finish_log.paging_cursor.as_deref())
    .bind(finish_log.error_code)
    .bind(key.as_i64())
    .execute(pool)
    .await?;

    Ok(Mutation::from_rows_affected(result.rows_affected()))
}

/// Count tasks that satisfy the active predicate.
pub async fn get_active_task_count(pool: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT task_count FROM active_task_count")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Pick the task to run next, or `None` when the queue is drained.
///
/// Highest priority wins; within a priority band the oldest creation wins
/// (FIFO). Note the asymmetry with the `active_tasks` listing, which shows
/// newest first.
pub async fn get_next_active_task(pool: &Pool<Sqlite>) -> Result<Option<Task>> {
    let row = sqlx::query("SELECT * FROM next_active_task")
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(parse_task_from_row(&row)?)),
        None => Ok(None),
    }
}

/// Fetch a task row by key.
///
/// # Errors
/// Returns `DatabaseError::TaskNotFound` for an unknown key.
pub async fn get_task(pool: &Pool<Sqlite>, key: TaskKey) -> Result<Task> {
    let row = sqlx::query("SELECT * FROM task_queue WHERE task_key = ?")
        .bind(key.as_i64())
        .fetch_optional(pool)
        .await?
        .ok_or(DatabaseError::TaskNotFound(key.as_i64()))?;

    parse_task_from_row(&row)
}

/// List queued tasks, newest first.
pub async fn get_queued_tasks(pool: &Pool<Sqlite>) -> Result<Vec<Task>> {
    list_view(pool, "queued_tasks").await
}

/// List started tasks, most recently started first.
pub async fn get_started_tasks(pool: &Pool<Sqlite>) -> Result<Vec<Task>> {
    list_view(pool, "started_tasks").await
}

/// List finished tasks, most recently finished first.
pub async fn get_finished_tasks(pool: &Pool<Sqlite>) -> Result<Vec<Task>> {
    list_view(pool, "finished_tasks").await
}

/// List failed tasks, newest first.
pub async fn get_failed_tasks(pool: &Pool<Sqlite>) -> Result<Vec<Task>> {
    list_view(pool, "failed_tasks").await
}

/// List cancelled tasks, newest first.
pub async fn get_cancelled_tasks(pool: &Pool<Sqlite>) -> Result<Vec<Task>> {
    list_view(pool, "cancelled_tasks").await
}

async fn list_view(pool: &Pool<Sqlite>, view: &str) -> Result<Vec<Task>> {
    // View names are compile-time constants, never user input.
    let rows = sqlx::query(&format!("SELECT * FROM {view}"))
        .fetch_all(pool)
        .await?;

    rows.iter().map(parse_task_from_row).collect()
}

/// Per-split progress summary derived from the queue rows.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// When the split's first task was created.
    pub created_at: String,
    /// Download folder of the experiment.
    pub experiment_folder: String,
    /// Preset name of the experiment.
    pub experiment_key: String,
    /// Split index within the experiment.
    pub split_index: i64,
    /// Attempts executed so far.
    pub attempt_count: i64,
    /// Highest page index reached.
    pub page_count: i64,
    /// Ads retrieved across all attempts.
    pub total_ad_count: i64,
    /// Non-zero when the split has a failed task.
    pub failed: bool,
}

/// Summarize crawl progress per split, newest experiment first.
pub async fn get_experiment_reports(pool: &Pool<Sqlite>) -> Result<Vec<ExperimentReport>> {
    let rows = sqlx::query("SELECT * FROM experiment_reports")
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| -> Result<ExperimentReport> {
            Ok(ExperimentReport {
                created_at: row.get("created_at"),
                experiment_folder: row.get("experiment_folder"),
                experiment_key: row.get("experiment_key"),
                split_index: row.get("split_index"),
                attempt_count: row.get("attempt_count"),
                page_count: row.get("page_count"),
                total_ad_count: row.get("total_ad_count"),
                failed: row.get::<i64, _>("is_experiment_failed") != 0,
            })
        })
        .collect()
}

fn serialize_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Decode(e.to_string()))
}

fn deserialize_json<T: serde::de::DeserializeOwned>(column: &str, blob: &str) -> Result<T> {
    serde_json::from_str(blob)
        .map_err(|e| DatabaseError::Decode(format!("invalid JSON in column '{column}': {e}")))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp in column '{column}': {e}")))
}

fn parse_task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    let specs = TaskSpecs {
        experiment: deserialize_json("experiment_spec", row.get("experiment_spec"))?,
        split: deserialize_json("split_spec", row.get("split_spec"))?,
        page: deserialize_json("page_spec", row.get("page_spec"))?,
        attempt: deserialize_json("attempt_spec", row.get("attempt_spec"))?,
        continuation: deserialize_json("continuation", row.get("continuation"))?,
    };

    let created_at = parse_timestamp("created_at", row.get("created_at"))?;
    let started_at = row
        .get::<Option<String>, _>("started_at")
        .map(|s| parse_timestamp("started_at", &s))
        .transpose()?;
    let finished_at = row
        .get::<Option<String>, _>("finished_at")
        .map(|s| parse_timestamp("finished_at", &s))
        .transpose()?;

    // A row that crashed between finish and amend has no finish log; that
    // is a valid, informationally incomplete terminal state.
    let finish_log = row
        .get::<Option<String>, _>("finish_log")
        .map(|s| deserialize_json("finish_log", &s))
        .transpose()?;

    Ok(Task {
        key: TaskKey::new(row.get("task_key")),
        priority: row.get("task_priority"),
        started: row.get::<i64, _>("is_started") != 0,
        finished: row.get::<i64, _>("is_finished") != 0,
        cancelled: row.get::<i64, _>("is_cancelled") != 0,
        failed: row.get::<i64, _>("is_failed") != 0,
        created_at,
        started_at,
        finished_at,
        specs,
        finish_code: row
            .get::<Option<i64>, _>("finish_code")
            .map(FinishCode::new),
        finish_log,
        access_token: row.get("access_token"),
        ad_count: row.get("ad_count"),
        paging_cursor: row.get("paging_cursor"),
        error_code: row.get("error_code"),
    })
}
