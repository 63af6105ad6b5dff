//! Casa-Ripple main entry point
//!
//! This is the command-line interface for the Casa-Ripple listing crawler.

use anyhow::Context;
use casa_ripple::config::{load_config_with_hash, Config, SearchSettings, SearcherKind};
use casa_ripple::crawler::{run, select_publishers, PhaseSelection, RunOptions};
use casa_ripple::output::{load_listings, load_statistics, print_listings, print_statistics};
use casa_ripple::storage::{open_storage, ListingQuery};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Casa-Ripple: an incremental property-listing crawler
///
/// Casa-Ripple runs each publisher's searches, stores every listing it finds
/// and revisits listing pages on a staleness schedule to keep the dataset
/// fresh.
#[derive(Parser, Debug)]
#[command(name = "casa-ripple")]
#[command(version)]
#[command(about = "An incremental property-listing crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Only crawl publishers whose name or website contains this text
    #[arg(long, value_name = "NAME")]
    like: Option<String>,

    /// Which crawl phases to run
    #[arg(long, value_enum, default_value_t = PhaseArg::All)]
    phase: PhaseArg,

    /// Only visit listings flagged for inspection, ignoring staleness
    #[arg(long)]
    only_inspect: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "list"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "list"])]
    stats: bool,

    /// List stored listings, optionally matching TERM, and exit
    #[arg(long, value_name = "TERM", num_args = 0..=1, default_missing_value = "",
          conflicts_with_all = ["dry_run", "stats"])]
    list: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    All,
    Search,
    Detail,
}

impl From<PhaseArg> for PhaseSelection {
    fn from(phase: PhaseArg) -> Self {
        match phase {
            PhaseArg::All => PhaseSelection::All,
            PhaseArg::Search => PhaseSelection::Search,
            PhaseArg::Detail => PhaseSelection::Detail,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, cli.like.as_deref());
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(term) = &cli.list {
        handle_list(&config, term)?;
    } else {
        let options = RunOptions {
            like: cli.like.clone(),
            phase: cli.phase.into(),
            only_inspect: cli.only_inspect,
        };
        handle_crawl(&config, &options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("casa_ripple=info,warn"),
            1 => EnvFilter::new("casa_ripple=debug,info"),
            2 => EnvFilter::new("casa_ripple=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config, like: Option<&str>) {
    println!("=== Casa-Ripple Dry Run ===\n");

    println!("Browser:");
    println!("  Backend: {:?}", config.browser.backend);
    println!("  Headless: {}", config.browser.headless);
    println!(
        "  Navigation timeout: {}s",
        config.browser.navigation_timeout_secs
    );

    println!("\nCrawl:");
    println!("  Look-back: {} minutes", config.crawl.look_back_minutes);
    println!("  Only inspect: {}", config.crawl.only_inspect);
    println!("  Revisit unfinished: {}", config.crawl.revisit_unfinished);
    println!("  Batch size: {}", config.crawl.batch_size);
    println!("  Wait: {}ms", config.crawl.wait_ms);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    let selected = select_publishers(config, like);
    println!("\nPublishers ({} of {}):", selected.len(), config.publishers.len());
    for publisher in &selected {
        let driver = if publisher.form.is_some() { "form" } else { "query" };
        println!("  - {} ({}, {} search)", publisher.name, publisher.website, driver);
        for kind in &publisher.searchers {
            print_search(*kind, &publisher.search.resolved(*kind));
        }
        println!(
            "    fields: {} summary, {} detail",
            publisher.summary.fields.len(),
            publisher.detail.fields.len()
        );
    }

    println!("\n✓ Configuration is valid");
}

fn print_search(kind: SearcherKind, settings: &SearchSettings) {
    println!("    * {}:", kind.as_str());
    if !settings.locations().is_empty() {
        println!("        locations: {}", settings.locations().join(", "));
    }
    if !settings.property_types().is_empty() {
        println!("        property types: {}", settings.property_types().join(", "));
    }
    if let Some(price) = settings.maximum_price {
        println!("        maximum price: {price}");
    }
    if let Some(fee) = settings.maximum_condominium_fee {
        println!("        maximum condominium fee: {fee}");
    }
    if settings.include_condominium_fee == Some(true) {
        println!("        condominium fee included in price");
    }
    if let Some(area) = settings.minimum_area {
        println!("        minimum area: {area} m²");
    }
    if let Some(area) = settings.maximum_area {
        println!("        maximum area: {area} m²");
    }
    if !settings.bedrooms().is_empty() {
        println!("        bedrooms: {:?}", settings.bedrooms());
    }
    if !settings.bathrooms().is_empty() {
        println!("        bathrooms: {:?}", settings.bathrooms());
    }
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --list mode: shows stored listings
fn handle_list(config: &Config, term: &str) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let query = ListingQuery {
        like: (!term.is_empty()).then(|| term.to_string()),
        ..ListingQuery::default()
    };
    let page = load_listings(&storage, &query)?;
    print_listings(&page);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, options: &RunOptions) -> anyhow::Result<()> {
    tracing::info!(
        "Publishers: {}, phase: {:?}, only inspect: {}",
        config.publishers.len(),
        options.phase,
        options.only_inspect || config.crawl.only_inspect
    );

    let outcomes = run(config, options).await?;
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|outcome| outcome.result.is_err())
        .map(|outcome| outcome.name.as_str())
        .collect();

    if failed.is_empty() {
        tracing::info!("Crawl completed successfully");
        Ok(())
    } else {
        anyhow::bail!("{} publisher(s) failed: {}", failed.len(), failed.join(", "))
    }
}
