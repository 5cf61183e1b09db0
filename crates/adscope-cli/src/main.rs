//! The `adscope` binary.
//!
//! Thin wiring around the library crates: load configuration, open the
//! database, dispatch one subcommand. All engine logic lives in
//! `adscope-crawler`; all persistence in `adscope-db`.

use adscope_core::CrawlConfig;
use adscope_crawler::{planner, CrawlError, GraphClient, Runner, StaticTokenProvider};
use adscope_db::{task_queue, Database};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adscope", version, about = "Durable, rate-limited ad archive crawler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add an experiment's split tasks to the download queue
    Add {
        /// Experiment preset name from the configuration
        experiment: String,
        /// Override the preset's task priority
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Execute queued tasks until the queue drains
    Run,
    /// Make a task eligible to run again
    Restart {
        /// Key of the task to restart
        task_key: i64,
    },
    /// Cancel a task
    Cancel {
        /// Key of the task to cancel
        task_key: i64,
    },
    /// Show queue counts and per-split progress
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = CrawlConfig::load_with_env()?;
    let db = Arc::new(Database::open_in(config.db_dir()?).await?);
    db.run_migrations().await?;

    match cli.command {
        Command::Add {
            experiment,
            priority,
        } => add(&db, &config, &experiment, priority).await?,
        Command::Run => run(db.clone(), &config).await?,
        Command::Restart { task_key } => {
            let result = task_queue::restart_task(db.pool(), task_key.into()).await?;
            println!("restart task #{task_key}: {result:?}");
        }
        Command::Cancel { task_key } => {
            let result = task_queue::cancel_task(db.pool(), task_key.into()).await?;
            println!("cancel task #{task_key}: {result:?}");
        }
        Command::Status => status(&db).await?,
    }

    Ok(())
}

async fn add(
    db: &Database,
    config: &CrawlConfig,
    experiment_type: &str,
    priority: Option<i64>,
) -> Result<()> {
    let experiment = planner::create_experiment(config, experiment_type, priority)?;
    let tasks = planner::initial_tasks(&experiment);

    info!(
        "Queueing {} split task(s) for experiment '{}'",
        tasks.len(),
        experiment.experiment_key
    );
    for task in &tasks {
        let key = task_queue::create_task(db.pool(), task).await?;
        println!(
            "queued task {key} (split {} of {})",
            task.split.split_index + 1,
            task.split.split_count
        );
    }
    Ok(())
}

async fn run(db: Arc<Database>, config: &CrawlConfig) -> Result<()> {
    let token = config
        .run
        .access_token
        .clone()
        .ok_or(CrawlError::MissingToken)?;
    let client = GraphClient::new(&config.client)?;

    let runner = Runner::new(db, client, StaticTokenProvider::new(token), config);
    let summary = runner.run().await?;

    if summary.queue_drained {
        println!("queue drained after {} task(s)", summary.executed_tasks);
    } else {
        println!(
            "stopped at the iteration bound after {} task(s)",
            summary.executed_tasks
        );
    }
    Ok(())
}

async fn status(db: &Database) -> Result<()> {
    let pool = db.pool();
    println!(
        "active: {}  queued: {}  started: {}  finished: {}  failed: {}  cancelled: {}",
        task_queue::get_active_task_count(pool).await?,
        task_queue::get_queued_tasks(pool).await?.len(),
        task_queue::get_started_tasks(pool).await?.len(),
        task_queue::get_finished_tasks(pool).await?.len(),
        task_queue::get_failed_tasks(pool).await?.len(),
        task_queue::get_cancelled_tasks(pool).await?.len(),
    );

    let reports = task_queue::get_experiment_reports(pool).await?;
    if reports.is_empty() {
        println!("no experiments yet");
        return Ok(());
    }

    println!();
    println!("experiment           split  attempts  pages  ads       state");
    for report in reports {
        println!(
            "{:<20} {:>5}  {:>8}  {:>5}  {:>8}  {}",
            report.experiment_key,
            report.split_index,
            report.attempt_count,
            report.page_count,
            report.total_ad_count,
            if report.failed { "FAILED" } else { "ok" },
        );
    }
    Ok(())
}
