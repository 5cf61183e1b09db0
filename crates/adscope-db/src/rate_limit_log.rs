//! The rate-limit request log.
//!
//! An append-only list of outbound request instants, queried by trailing
//! window. The log is never pruned; the window query only ever looks at
//! recent rows through the timestamp index.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Sqlite};

use crate::error::{DatabaseError, Result};

/// Usage over a trailing window.
///
/// `window_secs` is the age of the oldest in-window request at query time,
/// 0.0 when the window holds no requests. It is what the rate limiter
/// divides remaining quota into, so it is measured, not assumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    /// Requests recorded inside the window.
    pub count: u32,
    /// Seconds since the oldest in-window request.
    pub window_secs: f64,
}

/// Record an outbound request at the current instant.
pub async fn record_request(pool: &Pool<Sqlite>) -> Result<()> {
    record_request_at(pool, Utc::now()).await
}

/// Record an outbound request at an explicit instant.
///
/// Used when importing a log from another crawler and by tests that need
/// to backdate history.
pub async fn record_request_at(pool: &Pool<Sqlite>, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT INTO request_timestamps (timestamp) VALUES (?)")
        .bind(at.to_rfc3339())
        .execute(pool)
        .await?;

    tracing::debug!("Recorded request at {}", at.to_rfc3339());
    Ok(())
}

/// Measure usage over the trailing `window` ending now.
pub async fn check_usage(pool: &Pool<Sqlite>, window: Duration) -> Result<Usage> {
    let end = Utc::now();
    let start = end - window;

    let timestamps: Vec<String> = sqlx::query_scalar(
        "SELECT timestamp FROM request_timestamps WHERE timestamp > ? ORDER BY timestamp ASC",
    )
    .bind(start.to_rfc3339())
    .fetch_all(pool)
    .await?;

    let count = u32::try_from(timestamps.len())
        .map_err(|_| DatabaseError::Decode("timestamp count overflow".to_string()))?;

    let window_secs = match timestamps.first() {
        Some(oldest) => {
            let oldest = DateTime::parse_from_rfc3339(oldest)
                .map_err(|e| DatabaseError::Decode(format!("invalid timestamp: {e}")))?
                .with_timezone(&Utc);
            (end - oldest).num_milliseconds() as f64 / 1000.0
        }
        None => 0.0,
    };

    Ok(Usage { count, window_secs })
}
