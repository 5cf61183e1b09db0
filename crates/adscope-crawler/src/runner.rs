//! The driver loop.
//!
//! Strictly sequential orchestration: one task at a time, one request per
//! task, no concurrency across tasks or provider calls. Each queue mutation
//! is its own statement, so a crash between two of them leaves a state the
//! store already tolerates (most notably a finished-but-unamended row).

use adscope_core::config::{CrawlConfig, PagingConfig};
use adscope_db::downloads::{self, DownloadRecord};
use adscope_db::task_queue::{self, Task};
use adscope_db::Database;
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{AdArchiveClient, FetchOutcome, TokenProvider};
use crate::continuation::continue_task;
use crate::error::Result;
use crate::rate_limiter::RateLimiter;

/// What a single `run` invocation accomplished.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Tasks executed before the loop stopped.
    pub executed_tasks: u64,
    /// True when the loop stopped because no active task remained.
    pub queue_drained: bool,
}

/// Sequential crawl driver.
///
/// Repeatedly picks the highest-priority active task, waits out the rate
/// limit, performs the fetch through the client seam, records the outcome,
/// archives the raw response, and asks the continuation policy for the next
/// unit of work.
pub struct Runner<C, T> {
    db: Arc<Database>,
    client: C,
    tokens: T,
    rate_limiter: RateLimiter,
    paging: PagingConfig,
    max_iterations: u64,
}

impl<C: AdArchiveClient, T: TokenProvider> Runner<C, T> {
    /// Assemble a driver over the shared database and collaborator seams.
    #[must_use]
    pub fn new(db: Arc<Database>, client: C, tokens: T, config: &CrawlConfig) -> Self {
        let rate_limiter = RateLimiter::new(db.clone(), config.rate_limit.clone());
        Self {
            db,
            client,
            tokens,
            rate_limiter,
            paging: config.paging.clone(),
            max_iterations: config.run.max_iterations,
        }
    }

    /// Execute tasks until the queue drains or the iteration bound is hit.
    ///
    /// Graceful shutdown happens between tasks: dropping the future during
    /// the rate-limit wait abandons the current iteration before the task is
    /// started.
    pub async fn run(&self) -> Result<RunSummary> {
        let pool = self.db.pool();
        let mut executed = 0u64;

        for _ in 0..self.max_iterations {
            let Some(task) = task_queue::get_next_active_task(pool).await? else {
                tracing::info!("Queue drained after {} tasks", executed);
                return Ok(RunSummary {
                    executed_tasks: executed,
                    queue_drained: true,
                });
            };

            self.execute_one(&task).await?;
            executed += 1;
        }

        tracing::info!("Iteration bound reached after {} tasks", self.max_iterations);
        Ok(RunSummary {
            executed_tasks: executed,
            queue_drained: false,
        })
    }

    async fn execute_one(&self, task: &Task) -> Result<()> {
        let pool = self.db.pool();
        let key = task.key;
        tracing::info!(
            "Running task {} (experiment {}, split {}, page {}, attempt {})",
            key,
            task.specs.experiment.experiment_key,
            task.specs.split.split_index,
            task.specs.page.page_index,
            task.specs.attempt.attempt_index,
        );

        let access_token = self.tokens.access_token()?;

        self.rate_limiter.before_request().await?;
        task_queue::start_task(pool, key).await?;

        let outcome = self.client.fetch_page(&task.specs, &access_token).await;

        task_queue::finish_task(pool, key).await?;
        task_queue::amend_task(pool, key, outcome.finish_code, &outcome.finish_log).await?;
        self.rate_limiter.after_request().await?;

        self.archive_outcome(task, &outcome).await?;

        match continue_task(
            &task.specs,
            outcome.finish_code,
            &outcome.finish_log,
            &self.paging,
            &mut rand::thread_rng(),
        ) {
            Some(next) => {
                let next_key = task_queue::create_task(pool, &next).await?;
                if next.continuation.failed {
                    tracing::warn!(
                        "Task {} ended its lineage in failure; recorded as {}",
                        key,
                        next_key
                    );
                } else {
                    tracing::info!("Task {} continued as {}", key, next_key);
                }
            }
            None => {
                tracing::info!("Task {} completed its lineage", key);
            }
        }

        Ok(())
    }

    /// Write the raw response body under the experiment folder and insert
    /// the archive record.
    async fn archive_outcome(&self, task: &Task, outcome: &FetchOutcome) -> Result<()> {
        let specs = &task.specs;
        let mut body_path = None;
        let mut body_length = None;

        if let Some(body) = &outcome.response_body {
            let folder = PathBuf::from(&specs.experiment.experiment_folder);
            tokio::fs::create_dir_all(&folder).await?;

            let filename = format!(
                "split-{:04}-page-{:04}-attempt-{:04}.json",
                specs.split.split_index, specs.page.page_index, specs.attempt.attempt_index,
            );
            let path = folder.join(filename);
            tokio::fs::write(&path, body).await?;

            body_length = Some(i64::try_from(body.len()).unwrap_or(i64::MAX));
            body_path = Some(path.to_string_lossy().into_owned());
        }

        let record = DownloadRecord {
            task_key: task.key,
            experiment_key: specs.experiment.experiment_key.clone(),
            split_index: specs.split.split_index,
            page_index: specs.page.page_index,
            attempt_index: specs.attempt.attempt_index,
            finish_code: outcome.finish_code,
            ad_count: outcome.finish_log.ad_count,
            request_url: outcome.request_url.clone(),
            requested_at: outcome.requested_at,
            responded_at: outcome.responded_at,
            duration_secs: outcome.duration_secs,
            response_body_path: body_path,
            response_body_length: body_length,
            response_error: outcome.response_error.clone(),
        };
        downloads::insert_download(self.db.pool(), &record).await?;

        Ok(())
    }
}
