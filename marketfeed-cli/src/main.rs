//! marketfeed CLI: fetch, feed listing, and cache management commands.
//!
//! Commands:
//! - `fetch` fetches one series for a feed, cache first, and prints a JSON report
//! - `feeds` lists configured feeds and their source chains
//! - `cache status` reports every cached record per feed
//! - `cache clear` drops one cached record
//! - `cache clean` removes records fetched longer ago than a cutoff

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use marketfeed_core::cache::CacheStatus;
use marketfeed_core::outcome::format_age;
use marketfeed_core::{
    CacheStore, Catalog, FetchConfig, FetchOutcome, Orchestrator, SeriesKey,
};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "marketfeed",
    about = "marketfeed: cached market data with retries and fallback sources"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). MARKETFEED_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one series for a feed and print the outcome as JSON.
    Fetch {
        /// Feed name from the catalog (e.g., fred, yahoo, wasde).
        feed: String,

        /// Series key (e.g., DGS10, ^TNX, 2024-06).
        key: String,

        /// Ignore a fresh cache entry and go to the network.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Only try these sources, in chain order. Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Write the JSON report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Catalog TOML file. Defaults to the built-in catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Override the feed's freshness window.
        #[arg(long)]
        max_age_hours: Option<f64>,
    },
    /// List configured feeds and their source chains.
    Feeds {
        /// Catalog TOML file. Defaults to the built-in catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report every cached record with its source and age.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Remove the cached record for one key.
    Clear {
        feed: String,
        key: String,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Remove records fetched more than the given number of days ago.
    Clean {
        #[arg(long)]
        older_than_days: u64,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Fetch {
            feed,
            key,
            force,
            sources,
            output,
            cache_dir,
            catalog,
            max_age_hours,
        } => {
            let code = run_fetch(
                &feed,
                &key,
                force,
                &sources,
                output.as_deref(),
                &cache_dir,
                catalog.as_deref(),
                max_age_hours,
            )?;
            std::process::exit(code);
        }
        Commands::Feeds { catalog } => run_feeds(catalog.as_deref()),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clear {
                feed,
                key,
                cache_dir,
            } => run_cache_clear(&cache_dir, &feed, &key),
            CacheAction::Clean {
                older_than_days,
                cache_dir,
                confirm,
            } => run_cache_clean(&cache_dir, older_than_days, confirm),
        },
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("MARKETFEED_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let catalog = match path {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::builtin()?,
    };
    Ok(catalog)
}

/// `<cache-dir>/<feed>`, refusing feed names that would leave the cache root.
fn feed_cache_dir(cache_dir: &Path, feed: &str) -> Result<PathBuf> {
    let mut components = Path::new(feed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(cache_dir.join(feed)),
        _ => bail!("invalid feed name '{feed}': must be a single path component"),
    }
}

/// Per-call fetch settings from the command line.
struct FetchArgs<'a> {
    feed: &'a str,
    key: &'a str,
    force: bool,
    sources: &'a [String],
    max_age_hours: Option<f64>,
}

#[allow(clippy::too_many_arguments)]
fn run_fetch(
    feed_name: &str,
    key: &str,
    force: bool,
    sources: &[String],
    output: Option<&Path>,
    cache_dir: &Path,
    catalog: Option<&Path>,
    max_age_hours: Option<f64>,
) -> Result<i32> {
    let catalog = load_catalog(catalog)?;
    catalog.feed(feed_name)?;

    let orchestrator = Orchestrator::http(FetchConfig::new(feed_cache_dir(cache_dir, feed_name)?))
        .context("failed to build HTTP client")?;
    let args = FetchArgs {
        feed: feed_name,
        key,
        force,
        sources,
        max_age_hours,
    };
    fetch_and_report(&orchestrator, &catalog, &args, output)
}

/// Run one fetch, print the summary and write the JSON report. Returns the
/// process exit code.
fn fetch_and_report(
    orchestrator: &Orchestrator,
    catalog: &Catalog,
    args: &FetchArgs<'_>,
    output: Option<&Path>,
) -> Result<i32> {
    let feed = catalog.feed(args.feed)?;

    let mut chain = feed.chain();
    if !args.sources.is_empty() {
        chain = chain.restrict(args.sources)?;
    }

    let mut options = feed.options().forced(args.force);
    if let Some(hours) = args.max_age_hours {
        options.max_age = match Duration::try_from_secs_f64(hours * 3600.0) {
            Ok(max_age) => max_age,
            Err(_) => bail!("--max-age-hours must be a non-negative number, got {hours}"),
        };
    }

    let key = SeriesKey::new(args.key);
    info!(feed = args.feed, key = %key, sources = ?chain.names(), force = args.force, "fetching");
    let outcome = orchestrator.fetch(&key, &chain, &options);

    let now = Utc::now();
    eprintln!("{}", outcome.summary_line(now));
    if let FetchOutcome::Stale { .. } = outcome {
        eprintln!("WARNING: data is STALE, review its age before relying on it");
    }

    let report = serde_json::to_string_pretty(&outcome.report(now))?;
    match output {
        Some(path) => {
            std::fs::write(path, report + "\n")
                .with_context(|| format!("failed to write report to {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{report}")?;
        }
    }

    Ok(outcome.exit_code())
}

fn run_feeds(catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;

    for (name, feed) in &catalog.feeds {
        println!(
            "{name}: {} (max age {}, {} attempt(s) per source)",
            feed.description,
            format_age(feed.max_age()),
            feed.retry.max_attempts()
        );
        let chain = feed.chain();
        for (i, source) in chain.sources().iter().enumerate() {
            let proxy = source
                .proxy_for
                .as_deref()
                .map(|p| format!(" [PROXY for {p}]"))
                .unwrap_or_default();
            println!("  {}. {}{proxy}", i + 1, source.name);
        }
        for skipped in chain.skipped() {
            println!(
                "  -  {} (skipped: missing {})",
                skipped.name,
                skipped.missing_env.join(", ")
            );
        }
    }
    Ok(())
}

/// Every per-feed cache store under `cache_dir`, sorted by feed name.
fn feed_stores(cache_dir: &Path) -> Result<Vec<(String, CacheStore)>> {
    let mut stores = Vec::new();
    for entry in std::fs::read_dir(cache_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let feed = entry.file_name().to_string_lossy().to_string();
            stores.push((feed, CacheStore::new(entry.path())));
        }
    }
    stores.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(stores)
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let now = Utc::now();
    let mut rows: Vec<(String, CacheStatus)> = Vec::new();
    for (feed, store) in feed_stores(cache_dir)? {
        rows.extend(store.status()?.into_iter().map(|row| (feed.clone(), row)));
    }

    if rows.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = rows.iter().map(|(_, row)| row.bytes).sum();
    println!("Cache: {}", cache_dir.display());
    println!("Records: {}", rows.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<8} {:<20} {:<16} {:>10} {:>10}",
        "Feed", "Key", "Source", "Age", "Size"
    );
    println!("{}", "-".repeat(68));
    for (feed, row) in &rows {
        let (key, source, age) = if row.corrupt {
            ("(corrupt)".to_string(), "-".to_string(), "-".to_string())
        } else {
            (
                row.key.as_ref().map(|k| k.to_string()).unwrap_or_default(),
                row.source.clone().unwrap_or_default(),
                row.fetched_at
                    .map(|at| format_age((now - at).to_std().unwrap_or_default()))
                    .unwrap_or_default(),
            )
        };
        println!(
            "{:<8} {:<20} {:<16} {:>10} {:>10}",
            feed,
            key,
            source,
            age,
            format_size(row.bytes)
        );
    }

    Ok(())
}

fn run_cache_clear(cache_dir: &Path, feed: &str, key: &str) -> Result<()> {
    let store = CacheStore::new(feed_cache_dir(cache_dir, feed)?);
    if store.clear(&SeriesKey::new(key))? {
        println!("Removed: {feed}/{key}");
    } else {
        println!("Nothing cached for {feed}/{key}");
    }
    Ok(())
}

fn run_cache_clean(cache_dir: &Path, older_than_days: u64, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let age = Duration::from_secs(older_than_days.saturating_mul(86_400));
    let mut removed: Vec<(String, CacheStatus)> = Vec::new();
    for (feed, store) in feed_stores(cache_dir)? {
        let rows = store.clean_older_than(age, !confirm)?;
        removed.extend(rows.into_iter().map(|row| (feed.clone(), row)));
    }

    if removed.is_empty() {
        println!("No records older than {older_than_days} days to remove.");
        return Ok(());
    }

    println!(
        "Found {} record(s) older than {older_than_days} days:",
        removed.len()
    );
    for (feed, row) in &removed {
        let key = row.key.as_ref().map(|k| k.to_string()).unwrap_or_default();
        println!("  {feed}/{key} ({})", format_size(row.bytes));
    }

    if !confirm {
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    println!("Done. Removed {} record(s).", removed.len());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
