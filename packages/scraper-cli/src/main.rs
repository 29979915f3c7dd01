use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scraper_core::{
    inputs, CheckpointStore, Orchestrator, OutputWriter, ProductClient, ReqwestFetcher,
    RetryPolicy, ScraperConfig, SqliteCheckpoints,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scraper", about = "Storefront product metadata scraper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Process the full domain × product cross-product
    Run,
    /// Process a bounded initial batch to validate the setup
    Batch {
        /// Approximate number of (domain, product) pairs to attempt
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    /// Inspect or manage the checkpoint ledger
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Show status breakdown and recent entries
    Stats,
    /// Delete all ledger rows
    Clear,
    /// Copy the ledger database to a timestamped backup file
    Backup,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scraper_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_scrape(&config, None).await,
        Command::Batch { size } => run_scrape(&config, Some(size)).await,
        Command::Checkpoint { action } => manage_checkpoints(&config, action).await,
    }
}

async fn run_scrape(config: &ScraperConfig, batch: Option<usize>) -> Result<()> {
    let mut domains = inputs::load_domains(&config.domains_file)?;
    let mut product_ids = inputs::load_product_ids(&config.products_file)?;
    tracing::info!(
        domains = domains.len(),
        products = product_ids.len(),
        "loaded input lists"
    );

    if let Some(size) = batch {
        // Small initial batch: a handful of domains, products spread across them.
        let domain_count = domains.len().min(5).max(1);
        domains.truncate(domain_count);
        let product_count = (size / domain_count).max(1);
        product_ids.truncate(product_count);
        tracing::info!(
            domains = domains.len(),
            products = product_ids.len(),
            "running bounded initial batch"
        );
    }

    let checkpoints = SqliteCheckpoints::open(&config.checkpoint_db).await?;
    let writer = OutputWriter::new(&config.output_dir)?;
    let policy = RetryPolicy::default();
    let fetcher = ReqwestFetcher::new(policy.request_timeout);
    let client = ProductClient::with_policy(fetcher, policy);
    let orchestrator = Orchestrator::new(
        checkpoints,
        client,
        writer,
        config.proxies.clone(),
        config.max_workers,
    );

    let report = orchestrator.run(&domains, &product_ids).await?;

    println!();
    println!("Scraping Summary:");
    println!("  Completed: {}", report.completed);
    println!("  Failed:    {}", report.failed);
    println!("  Total:     {}", report.total());
    Ok(())
}

async fn manage_checkpoints(config: &ScraperConfig, action: CheckpointAction) -> Result<()> {
    match action {
        CheckpointAction::Stats => {
            let store = SqliteCheckpoints::open(&config.checkpoint_db).await?;
            let stats = store.statistics().await?;

            println!("Checkpoint ledger: {}", config.checkpoint_db.display());
            println!("Total entries: {}", stats.total);
            if !stats.by_status.is_empty() {
                println!("Status breakdown:");
                let mut statuses: Vec<_> = stats.by_status.iter().collect();
                statuses.sort();
                for (status, count) in statuses {
                    println!("  {status}: {count}");
                }
            }

            let recent = store.recent(5).await?;
            if !recent.is_empty() {
                println!("Recent entries:");
                for row in recent {
                    println!(
                        "  {}/{}: {} at {}",
                        row.domain, row.product_id, row.status, row.timestamp
                    );
                }
            }
        }
        CheckpointAction::Clear => {
            let store = SqliteCheckpoints::open(&config.checkpoint_db).await?;
            let before = store.statistics().await?.total;
            if before == 0 {
                println!("Checkpoint ledger is already empty.");
            } else {
                store.clear().await?;
                println!("Cleared {before} entries from the checkpoint ledger.");
            }
        }
        CheckpointAction::Backup => {
            if !config.checkpoint_db.exists() {
                println!("No checkpoint database found.");
                return Ok(());
            }
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let backup_name = format!("checkpoint_backup_{timestamp}.db");
            let backup_path = config
                .checkpoint_db
                .parent()
                .map(|dir| dir.join(&backup_name))
                .unwrap_or_else(|| backup_name.clone().into());
            std::fs::copy(&config.checkpoint_db, &backup_path).with_context(|| {
                format!("Failed to back up ledger to {}", backup_path.display())
            })?;
            println!("Checkpoint ledger backed up to {}", backup_path.display());
        }
    }
    Ok(())
}
