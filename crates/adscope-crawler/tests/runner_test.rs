//! End-to-end driver tests over an in-memory queue and a scripted client.

use adscope_core::config::CrawlConfig;
use adscope_core::spec::{
    AttemptSpec, Continuation, ExperimentSpec, FinishLog, PageSpec, SplitSpec, TaskSpecs,
};
use adscope_core::types::FinishCode;
use adscope_crawler::{AdArchiveClient, FetchOutcome, Runner, StaticTokenProvider};
use adscope_db::{task_queue, Database};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Client that replays a fixed sequence of finish codes and synthesizes
/// the finish log the way the production client would.
struct ScriptedClient {
    codes: Mutex<VecDeque<i64>>,
}

impl ScriptedClient {
    fn new(codes: &[i64]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl AdArchiveClient for ScriptedClient {
    async fn fetch_page(&self, specs: &TaskSpecs, access_token: &str) -> FetchOutcome {
        let code = self
            .codes
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("script exhausted");

        let mut continuation = specs.continuation.clone();
        let mut log = FinishLog {
            access_token: Some(access_token.to_string()),
            ..FinishLog::default()
        };

        let finish_code = match code {
            0 => {
                let cursor = format!("cursor-{}", specs.page.page_index);
                continuation.after_token = Some(cursor.clone());
                continuation.total_ad_count += 10;
                log.ad_count = Some(10);
                log.paging_cursor = Some(cursor);
                FinishCode::SUCCESS
            }
            -1 => {
                continuation.total_ad_count += 3;
                log.ad_count = Some(3);
                FinishCode::END_OF_PAGES
            }
            c if c > 0 => {
                log.ad_count = Some(0);
                log.error_code = Some(c);
                FinishCode::new(c)
            }
            c => {
                log.ad_count = Some(0);
                FinishCode::new(c)
            }
        };
        log.continuation = continuation;

        FetchOutcome {
            finish_code,
            finish_log: log,
            request_url: "https://archive.invalid/ads?limit=250".to_string(),
            requested_at: Utc::now(),
            responded_at: Some(Utc::now()),
            duration_secs: Some(0.01),
            response_body: Some(r#"{"data": []}"#.to_string()),
            response_error: None,
        }
    }
}

/// Configuration whose rate limiter never actually sleeps.
fn fast_config() -> CrawlConfig {
    let mut config = CrawlConfig::default();
    config.rate_limit.min_delay_secs = 0.0;
    config.rate_limit.delay_cap_75_secs = 0.0;
    config.rate_limit.delay_cap_50_secs = 0.0;
    config.rate_limit.delay_cap_25_secs = 0.0;
    config.rate_limit.delay_cap_10_secs = 0.0;
    config
}

fn seed_specs(experiment_folder: &str) -> TaskSpecs {
    TaskSpecs {
        experiment: ExperimentSpec {
            experiment_key: "us".to_string(),
            experiment_folder: experiment_folder.to_string(),
            task_priority: 5,
            ad_type: "POLITICAL_AND_ISSUE_ADS".to_string(),
            ad_active_status: "ALL".to_string(),
            ad_fields: vec!["id".to_string()],
            countries: vec!["US".to_string()],
            search_terms: vec![String::new()],
            advertisers: vec![],
            platforms: vec![],
            last_n_days: -1,
            ads_per_page: 250,
            countries_per_split: 1,
            advertisers_per_split: 10,
            search_by_advertisers: false,
        },
        split: SplitSpec {
            split_index: 0,
            split_count: 1,
            countries: vec!["US".to_string()],
            advertisers: vec![],
        },
        page: PageSpec::default(),
        attempt: AttemptSpec::default(),
        continuation: Continuation::default(),
    }
}

async fn setup_db() -> Arc<Database> {
    let db = Database::new(":memory:").await.expect("create database");
    db.run_migrations().await.expect("run migrations");
    Arc::new(db)
}

#[tokio::test]
async fn test_lineage_runs_to_clean_end() {
    let db = setup_db().await;
    let tmp = tempfile::TempDir::new().expect("create temp dir");
    let folder = tmp.path().join("us--test").to_string_lossy().into_owned();

    task_queue::create_task(db.pool(), &seed_specs(&folder))
        .await
        .expect("seed task");

    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[0, 0, -1]),
        StaticTokenProvider::new("token"),
        &fast_config(),
    );
    let summary = runner.run().await.expect("run driver");

    assert_eq!(summary.executed_tasks, 3);
    assert!(summary.queue_drained);

    // Three attempts, pages 0..=2, all finished, none failed
    let finished = task_queue::get_finished_tasks(db.pool())
        .await
        .expect("finished view");
    assert_eq!(finished.len(), 3);
    let mut pages: Vec<u32> = finished.iter().map(|t| t.specs.page.page_index).collect();
    pages.sort_unstable();
    assert_eq!(pages, vec![0, 1, 2]);

    assert_eq!(
        task_queue::get_active_task_count(db.pool())
            .await
            .expect("active count"),
        0
    );
    assert!(task_queue::get_failed_tasks(db.pool())
        .await
        .expect("failed view")
        .is_empty());

    // The terminal attempt carries the terminal code and the running total
    let last = finished
        .iter()
        .find(|t| t.specs.page.page_index == 2)
        .expect("terminal attempt");
    assert_eq!(last.finish_code, Some(FinishCode::END_OF_PAGES));
    assert_eq!(last.ad_count, Some(3));
    assert_eq!(last.specs.continuation.total_ad_count, 20);

    // Every attempt left an archive record and a body file
    for task in &finished {
        let count = adscope_db::downloads::count_by_task_key(db.pool(), task.key)
            .await
            .expect("download count");
        assert_eq!(count, 1);
    }
    assert_eq!(std::fs::read_dir(tmp.path().join("us--test")).expect("dir").count(), 3);
}

#[tokio::test]
async fn test_page_size_grows_across_successes() {
    let db = setup_db().await;
    let tmp = tempfile::TempDir::new().expect("create temp dir");
    let folder = tmp.path().join("us--grow").to_string_lossy().into_owned();

    task_queue::create_task(db.pool(), &seed_specs(&folder))
        .await
        .expect("seed task");

    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[0, -1]),
        StaticTokenProvider::new("token"),
        &fast_config(),
    );
    runner.run().await.expect("run driver");

    let finished = task_queue::get_finished_tasks(db.pool())
        .await
        .expect("finished view");
    let second = finished
        .iter()
        .find(|t| t.specs.page.page_index == 1)
        .expect("second attempt");

    // 250 * 2^(1/4) ≈ 297, within jitter of ±25 ads and ±2.5%
    let grown = second.specs.attempt.ads_per_page.expect("grown page size");
    assert!(grown > 260, "grew to {grown}");
    assert!(grown < 340, "grew to {grown}");
    // The resumption cursor from page 0 flowed into page 1's request state
    assert_eq!(
        second.specs.continuation.after_token.as_deref(),
        Some("cursor-0")
    );
}

#[tokio::test]
async fn test_repeated_provider_errors_fail_the_lineage() {
    let db = setup_db().await;
    let tmp = tempfile::TempDir::new().expect("create temp dir");
    let folder = tmp.path().join("us--fail").to_string_lossy().into_owned();

    task_queue::create_task(db.pool(), &seed_specs(&folder))
        .await
        .expect("seed task");

    let mut config = fast_config();
    config.paging.max_page_attempts = 3;

    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[4, 4, 4]),
        StaticTokenProvider::new("token"),
        &config,
    );
    let summary = runner.run().await.expect("run driver");

    // Three executed attempts; the third's successor is the failed terminal row
    assert_eq!(summary.executed_tasks, 3);
    assert!(summary.queue_drained);

    let failed = task_queue::get_failed_tasks(db.pool())
        .await
        .expect("failed view");
    assert_eq!(failed.len(), 1);
    let terminal = &failed[0];
    assert!(terminal.failed);
    assert!(terminal.cancelled);
    assert!(!terminal.started);
    assert_eq!(terminal.specs.attempt.page_attempt, 3);
    assert_eq!(terminal.specs.continuation.error_codes, vec![4, 4, 4]);
    // Still parked on the page that kept failing
    assert_eq!(terminal.specs.page.page_index, 0);

    // No runnable work remains until someone restarts the failed row
    assert_eq!(
        task_queue::get_active_task_count(db.pool())
            .await
            .expect("active count"),
        0
    );
}

#[tokio::test]
async fn test_expired_token_parks_the_lineage() {
    let db = setup_db().await;
    let tmp = tempfile::TempDir::new().expect("create temp dir");
    let folder = tmp.path().join("us--token").to_string_lossy().into_owned();

    task_queue::create_task(db.pool(), &seed_specs(&folder))
        .await
        .expect("seed task");

    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[190]),
        StaticTokenProvider::new("expired-token"),
        &fast_config(),
    );
    let summary = runner.run().await.expect("run driver");

    // One attempt, then the lineage parks as failed awaiting a fresh token
    assert_eq!(summary.executed_tasks, 1);
    assert!(summary.queue_drained);

    let failed = task_queue::get_failed_tasks(db.pool())
        .await
        .expect("failed view");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].specs.continuation.error_codes, vec![190]);
    // Token expiry is not a capacity signal: the page size is untouched
    assert_eq!(failed[0].specs.attempt.ads_per_page, None);
}

#[tokio::test]
async fn test_restart_resumes_a_failed_lineage() {
    let db = setup_db().await;
    let tmp = tempfile::TempDir::new().expect("create temp dir");
    let folder = tmp.path().join("us--resume").to_string_lossy().into_owned();

    task_queue::create_task(db.pool(), &seed_specs(&folder))
        .await
        .expect("seed task");

    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[190]),
        StaticTokenProvider::new("expired-token"),
        &fast_config(),
    );
    runner.run().await.expect("run driver");

    let parked = task_queue::get_failed_tasks(db.pool())
        .await
        .expect("failed view")[0]
        .key;
    task_queue::restart_task(db.pool(), parked)
        .await
        .expect("restart task");

    // With a fresh token the restarted row runs and completes the lineage
    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[-1]),
        StaticTokenProvider::new("fresh-token"),
        &fast_config(),
    );
    let summary = runner.run().await.expect("run driver");

    assert_eq!(summary.executed_tasks, 1);
    let resumed = task_queue::get_task(db.pool(), parked)
        .await
        .expect("get task");
    assert!(resumed.finished);
    // The failed marker stays on the row for audit even after it ran clean
    assert!(resumed.failed);
    assert_eq!(resumed.finish_code, Some(FinishCode::END_OF_PAGES));
}

#[tokio::test]
async fn test_iteration_bound_stops_early() {
    let db = setup_db().await;
    let tmp = tempfile::TempDir::new().expect("create temp dir");
    let folder = tmp.path().join("us--bound").to_string_lossy().into_owned();

    task_queue::create_task(db.pool(), &seed_specs(&folder))
        .await
        .expect("seed task");

    let mut config = fast_config();
    config.run.max_iterations = 2;

    let runner = Runner::new(
        db.clone(),
        ScriptedClient::new(&[0, 0, 0]),
        StaticTokenProvider::new("token"),
        &config,
    );
    let summary = runner.run().await.expect("run driver");

    assert_eq!(summary.executed_tasks, 2);
    assert!(!summary.queue_drained);

    // The unfinished lineage's next task is still queued for the next run
    assert_eq!(
        task_queue::get_active_task_count(db.pool())
            .await
            .expect("active count"),
        1
    );
}
