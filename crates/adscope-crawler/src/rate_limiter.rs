//! Sliding-window rate limiting for outbound archive requests.
//!
//! The provider allows a fixed number of requests per trailing window
//! (50 per 15 minutes by default). The limiter spreads the remaining quota
//! over the remaining window, capped by a stepped ceiling so bandwidth is
//! spent faster while headroom is abundant and throttled down smoothly as
//! it depletes.

use adscope_core::config::RateLimitConfig;
use adscope_db::rate_limit_log::{self, Usage};
use adscope_db::Database;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Throttles outbound requests against the provider quota.
///
/// Call [`RateLimiter::before_request`] immediately before each outbound
/// call and [`RateLimiter::after_request`] immediately after; the limiter
/// keeps its request history in the shared database so a restarted crawler
/// still honors the window.
pub struct RateLimiter {
    db: Arc<Database>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a limiter over the shared database.
    #[must_use]
    pub fn new(db: Arc<Database>, config: RateLimitConfig) -> Self {
        Self { db, config }
    }

    /// Block until sending the next request is allowed.
    ///
    /// Computes the current delay from the persisted request log and sleeps
    /// it out. Long waits sleep in one-minute chunks so progress stays
    /// visible in the logs; the chunking has no functional effect. Dropping
    /// the returned future cancels the wait.
    pub async fn before_request(&self) -> Result<()> {
        let window = ChronoDuration::seconds(i64::try_from(self.config.window_secs).unwrap_or(i64::MAX));
        let usage = rate_limit_log::check_usage(self.db.pool(), window).await?;
        let delay = compute_delay(&self.config, usage);

        let quota = f64::from(self.config.requests_per_window);
        tracing::info!(
            "Rate limit: {} of {} requests used in the past {:.1}s, waiting {:.1}s",
            usage.count,
            self.config.requests_per_window,
            usage.window_secs,
            delay
        );
        tracing::debug!(
            "Remaining bandwidth {:.1}%",
            100.0 * (quota - f64::from(usage.count)) / quota
        );

        sleep_chunked(delay).await;
        Ok(())
    }

    /// Record that a request was just sent.
    pub async fn after_request(&self) -> Result<()> {
        rate_limit_log::record_request(self.db.pool()).await?;
        Ok(())
    }
}

/// Compute the delay before the next request is allowed, in seconds.
///
/// The base delay spreads the remaining window evenly over the remaining
/// quota; with the quota exhausted it is the whole remaining window. The
/// tier caps are then applied from the loosest threshold to the tightest,
/// each only ever shrinking the bound, and the result is floored at the
/// configured minimum so even a cold start never fires a burst.
#[must_use]
pub fn compute_delay(config: &RateLimitConfig, usage: Usage) -> f64 {
    let quota = f64::from(config.requests_per_window);
    let remaining_count = quota - f64::from(usage.count);
    let remaining_secs = config.window_secs as f64 - usage.window_secs;

    let mut delay = if remaining_count >= 1.0 {
        remaining_secs / remaining_count
    } else {
        remaining_secs
    };

    if remaining_count >= 0.75 * quota {
        delay = delay.min(config.delay_cap_75_secs);
    }
    if remaining_count >= 0.50 * quota {
        delay = delay.min(config.delay_cap_50_secs);
    }
    if remaining_count >= 0.25 * quota {
        delay = delay.min(config.delay_cap_25_secs);
    }
    if remaining_count >= 0.10 * quota {
        delay = delay.min(config.delay_cap_10_secs);
    }

    delay.max(config.min_delay_secs)
}

async fn sleep_chunked(delay_secs: f64) {
    let mut remaining = delay_secs;
    while remaining >= 60.0 {
        tracing::info!("Sleeping {:.0} more seconds...", remaining);
        tokio::time::sleep(Duration::from_secs(60)).await;
        remaining -= 60.0;
    }
    if remaining > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
    }
}
