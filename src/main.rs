//! ielove-mirror main entry point
//!
//! This is the command-line interface for the self-refreshing ielove mirror.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ielove_mirror::config::{load_config_with_hash, Config};
use ielove_mirror::crawler::Orchestrator;
use ielove_mirror::queue::{KindLimiters, SqliteTaskQueue, TaskKind, WorkerOptions, WorkerPool};
use ielove_mirror::storage::{open_store, DocumentStore};
use ielove_mirror::url::item_key;
use ielove_mirror::{Clock, StalenessPolicy, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// ielove-mirror: a self-refreshing mirror of the ielove catalog
///
/// Region sweeps discover listings, and every mirrored listing schedules its
/// own refresh for when it goes stale. Run `sweep` to seed work and `work`
/// to process it.
#[derive(Parser, Debug)]
#[command(name = "ielove-mirror")]
#[command(version)]
#[command(about = "A self-refreshing mirror of the ielove catalog", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker pool until interrupted
    Work {
        /// Stop once no task is due and none is running
        #[arg(long)]
        until_idle: bool,
    },

    /// Enqueue region sweeps
    Sweep {
        /// Region slug (default: every catalog region)
        #[arg(long)]
        region: Option<String>,

        /// Category slug (default: every catalog category)
        #[arg(long)]
        category: Option<String>,

        /// Maximum listing pages per sweep (default: queue.default-limit)
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Print the stored record of an item as JSON
    Show {
        /// Item key or item URL
        #[arg(value_name = "KEY_OR_URL")]
        target: String,
    },

    /// Show queue depth per task kind and the stored item count
    Status,

    /// Validate the configuration and print what it sets up
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    match cli.command {
        Command::Work { until_idle } => handle_work(&config, until_idle).await,
        Command::Sweep {
            region,
            category,
            limit,
        } => handle_sweep(&config, region.as_deref(), category.as_deref(), limit).await,
        Command::Show { target } => handle_show(&config, &target).await,
        Command::Status => handle_status(&config).await,
        Command::Check => handle_check(&config, &hash),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ielove_mirror=info,warn"),
            1 => EnvFilter::new("ielove_mirror=debug,info"),
            2 => EnvFilter::new("ielove_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

struct Runtime {
    store: Arc<dyn DocumentStore>,
    queue: Arc<SqliteTaskQueue>,
    orchestrator: Arc<Orchestrator>,
}

fn open_runtime(config: &Config) -> anyhow::Result<Runtime> {
    let store: Arc<dyn DocumentStore> = Arc::new(
        open_store(Path::new(&config.storage.database_path))
            .with_context(|| format!("Failed to open store {}", config.storage.database_path))?,
    );
    let queue = Arc::new(
        SqliteTaskQueue::from_config(&config.queue)
            .with_context(|| format!("Failed to open queue {}", config.queue.database_path))?,
    );
    let orchestrator = Arc::new(Orchestrator::from_config(config, store.clone(), queue.clone())?);

    Ok(Runtime {
        store,
        queue,
        orchestrator,
    })
}

/// Runs the worker pool
async fn handle_work(config: &Config, until_idle: bool) -> anyhow::Result<()> {
    let runtime = open_runtime(config)?;
    let limiters = KindLimiters::from_config(&config.queue.rate_limits)?;
    let pool = WorkerPool::new(
        runtime.queue.clone(),
        runtime.orchestrator.clone(),
        limiters,
        WorkerOptions::from_config(&config.queue),
    );

    if until_idle {
        pool.run_until_idle().await;
        return Ok(());
    }

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
        tracing::info!("Shutting down, waiting for running tasks");
        signal_token.cancel();
    });

    pool.run(token).await;
    Ok(())
}

/// Enqueues region sweeps
async fn handle_sweep(
    config: &Config,
    region: Option<&str>,
    category: Option<&str>,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let runtime = open_runtime(config)?;
    let limit = limit.unwrap_or(config.queue.default_limit);
    if limit == 0 {
        bail!("--limit must be at least 1");
    }

    let count = runtime.orchestrator.sweep(region, category, limit).await?;
    println!("Enqueued {} region sweep(s), up to {} page(s) each", count, limit);
    Ok(())
}

/// Prints a stored record
async fn handle_show(config: &Config, target: &str) -> anyhow::Result<()> {
    let runtime = open_runtime(config)?;
    let key = item_key(target)?;

    let Some(record) = runtime.store.find_item(&key).await? else {
        bail!("No record stored for key {}", key);
    };

    let policy = StalenessPolicy::from_config(&config.staleness);
    let state = policy.item_state(Some(&record), SystemClock.now());
    tracing::info!(key = %key, state = %state, "Found record");

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Prints queue depth and store size
async fn handle_status(config: &Config) -> anyhow::Result<()> {
    let runtime = open_runtime(config)?;

    println!("=== Queue ===\n");
    for (kind, count) in runtime.queue.pending_counts()? {
        let next = runtime
            .queue
            .next_visible_at(kind)?
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<14} {:>8} pending, next due {}", kind.to_string(), count, next);
    }

    println!("\n=== Store ===\n");
    println!("  Items: {}", runtime.store.count_items().await?);
    Ok(())
}

/// Validates config and shows what it sets up
fn handle_check(config: &Config, hash: &str) -> anyhow::Result<()> {
    println!("=== ielove-mirror configuration ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Page count endpoint: {}", config.site.page_count_endpoint());

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nStorage:");
    println!("  Documents: {}", config.storage.database_path);
    println!("  Queue: {}", config.queue.database_path);

    println!("\nWorkers: {}", config.queue.workers);
    let rates = &config.queue.rate_limits;
    for (kind, rate) in [
        (TaskKind::ScrapeRegion, &rates.scrape_region),
        (TaskKind::ScrapePage, &rates.scrape_page),
        (TaskKind::ScrapeItem, &rates.scrape_item),
    ] {
        println!("  {:<14} {}", kind.to_string(), rate);
    }

    println!(
        "\nStaleness: refresh after {} day(s), hint grace {} day(s)",
        config.staleness.refresh_after_days, config.staleness.hint_grace_days
    );
    println!(
        "Catalog: {} region(s) x {} categor(ies)",
        config.catalog.regions.len(),
        config.catalog.categories.len()
    );

    println!("\n✓ Configuration is valid (hash: {})", hash);
    Ok(())
}
