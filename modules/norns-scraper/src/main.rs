use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use norns_common::normalize::url_path;
use norns_common::Config;
use norns_scraper::catalog::{Catalog, CatalogClient};
use norns_scraper::discovery::{RenderedFetcher, SourcePair};
use norns_scraper::github::GithubClient;
use norns_scraper::reconcile::{sync_check, ReconcileOptions, Reconciler};
use norns_scraper::retry::RetryPolicy;
use norns_scraper::run_log::{load_statuses, replay_statuses, RunLog};
use norns_scraper::store;

/// Scrape norns.community scripts, discover demo videos from lines
/// discussion threads, and reconcile against the stored dataset.
#[derive(Parser, Debug)]
#[command(name = "norns-scraper")]
struct Args {
    /// Parallel workers for scraping and discovery.
    #[arg(long, default_value_t = 10)]
    workers: usize,

    /// Seconds between demo discovery requests.
    #[arg(long, default_value_t = 0.5)]
    demo_delay: f64,

    /// Spacing multiplier for the rate-limit retry pass.
    #[arg(long, default_value_t = 3.0)]
    retry_backoff: f64,

    /// Process only the given community URL.
    #[arg(long)]
    script: Option<String>,

    /// Apply demo statuses from a prior run log to the dataset and exit.
    #[arg(long, value_name = "PATH")]
    status_log: Option<PathBuf>,

    /// Deduplicate the dataset by community-URL path and exit.
    #[arg(long)]
    dedupe: bool,

    /// Recompute out-of-sync flags for every stored record and exit.
    #[arg(long)]
    sync_check: bool,

    /// Dataset file, relative to DATA_DIR unless absolute.
    #[arg(long, default_value = "norns-scripts.json")]
    data_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("norns_scraper=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let dataset_path = if args.data_file.is_absolute() {
        args.data_file.clone()
    } else {
        config.data_dir.join(&args.data_file)
    };

    // Fast path: replay demo statuses from a structured run log.
    if let Some(log_path) = &args.status_log {
        let mut records = store::load(&dataset_path)?;
        let statuses = load_statuses(log_path)?;
        if statuses.is_empty() {
            warn!("No demo_resolved events in log; nothing to apply");
            return Ok(());
        }
        let changed = replay_statuses(&mut records, &statuses);
        if changed > 0 {
            store::save(&dataset_path, &records)?;
        }
        info!(changed, "Status replay complete");
        return Ok(());
    }

    // Fast path: deduplicate the stored dataset.
    if args.dedupe {
        let records = store::load(&dataset_path)?;
        let before = records.len();
        let (deduped, removed) = store::dedupe(records);
        if removed > 0 {
            store::save(&dataset_path, &deduped)?;
        }
        info!(before, removed, "Dedupe complete");
        return Ok(());
    }

    let catalog = CatalogClient::new(&config.base_url);

    // Fast path: recompute out-of-sync flags only.
    if args.sync_check {
        let mut records = store::load(&dataset_path)?;
        let changed = sync_check(&catalog, &mut records, args.workers).await?;
        if changed > 0 {
            store::save(&dataset_path, &records)?;
        }
        info!(changed, "Sync-check complete");
        return Ok(());
    }

    info!("norns.community scraper starting...");

    let mut links = catalog.index().await?;
    if let Some(single) = &args.script {
        let name = url_path(single);
        let total = links.len();
        links.retain(|l| l.name == name);
        if links.is_empty() {
            bail!("Script '{name}' not found among {total} catalog entries");
        }
        info!(script = name.as_str(), "Test mode: processing a single script");
    }

    let existing = store::load(&dataset_path)?;

    let rendered = if config.render_enabled() {
        Some(RenderedFetcher::new(
            &config.browserless_url,
            config.browserless_token.as_deref(),
        ))
    } else {
        warn!("BROWSERLESS_URL not set; rendered discovery disabled for this run");
        None
    };
    let discoverer = SourcePair::new(rendered);
    let history = GithubClient::new(config.github_token.as_deref());

    let options = ReconcileOptions {
        workers: args.workers,
        demo_delay: Duration::from_secs_f64(args.demo_delay),
        retry: RetryPolicy {
            base_delay: Duration::from_secs_f64(args.demo_delay),
            multiplier: args.retry_backoff,
            ..RetryPolicy::default()
        },
    };

    let mut run_log = RunLog::new();
    let reconciler = Reconciler::new(&catalog, &discoverer, &history, options);
    let (records, stats) = reconciler.run(links, existing, &mut run_log).await?;

    store::save(&dataset_path, &records)?;
    if let Err(e) = run_log.save(&config.data_dir) {
        warn!(error = %e, "Failed to write run log");
    }

    info!("Run complete. {stats}");
    Ok(())
}
