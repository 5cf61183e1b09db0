//! The downloads archive.
//!
//! One record per executed attempt: a snapshot of the task coordinates,
//! the request that was sent, and where the raw response body was written.
//! This table is what makes a multi-day crawl auditable after the fact.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::error::Result;
use adscope_core::types::{FinishCode, TaskKey};

/// Archive record of one executed attempt.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    /// Queue key of the task that ran.
    pub task_key: TaskKey,
    /// Preset name of the experiment.
    pub experiment_key: String,
    /// Split index within the experiment.
    pub split_index: u32,
    /// Page index the attempt fetched.
    pub page_index: u32,
    /// Attempt index within the lineage.
    pub attempt_index: u32,
    /// Outcome classifier of the attempt.
    pub finish_code: FinishCode,
    /// Ads in the response page, when the response parsed.
    pub ad_count: Option<i64>,
    /// Full request URL (query string included).
    pub request_url: String,
    /// When the request was sent.
    pub requested_at: DateTime<Utc>,
    /// When the response arrived, if one did.
    pub responded_at: Option<DateTime<Utc>>,
    /// Round-trip time in seconds, if a response arrived.
    pub duration_secs: Option<f64>,
    /// Where the raw response body was written on disk.
    pub response_body_path: Option<String>,
    /// Size of the raw response body in bytes.
    pub response_body_length: Option<i64>,
    /// Transport error text when no response arrived.
    pub response_error: Option<String>,
}

/// Insert one archive record; returns its key.
pub async fn insert_download(pool: &Pool<Sqlite>, record: &DownloadRecord) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO downloads (
            task_key, experiment_key, split_index, page_index, attempt_index,
            finish_code, ad_count, request_url,
            requested_at, responded_at, duration_secs,
            response_body_path, response_body_length, response_error
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.task_key.as_i64())
    .bind(&record.experiment_key)
    .bind(i64::from(record.split_index))
    .bind(i64::from(record.page_index))
    .bind(i64::from(record.attempt_index))
    .bind(record.finish_code.as_i64())
    .bind(record.ad_count)
    .bind(&record.request_url)
    .bind(record.requested_at.to_rfc3339())
    .bind(record.responded_at.map(|dt| dt.to_rfc3339()))
    .bind(record.duration_secs)
    .bind(record.response_body_path.as_deref())
    .bind(record.response_body_length)
    .bind(record.response_error.as_deref())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Count archive records for one task.
pub async fn count_by_task_key(pool: &Pool<Sqlite>, task_key: TaskKey) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM downloads WHERE task_key = ?")
        .bind(task_key.as_i64())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// List the request URLs archived for one experiment, oldest first.
pub async fn get_request_urls(pool: &Pool<Sqlite>, experiment_key: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT request_url FROM downloads WHERE experiment_key = ? ORDER BY requested_at ASC",
    )
    .bind(experiment_key)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| row.get("request_url")).collect())
}
