//! Crawler module: search, pagination and detail revisits
//!
//! This module contains the core crawling logic, including:
//! - Searcher variants that configure and submit a site's search
//! - The Publisher state machine walking result pages and listing pages
//! - The staleness-aware queue deciding which listings are due
//! - Picture capture and preview compositing
//! - Building site profiles from configuration

mod pictures;
mod publisher;
mod queue;
mod searcher;
mod site;

pub use pictures::{composite_vertically, download_pictures, PictureCollector};
pub use publisher::{
    CrawlContext, CrawlPhase, CrawlReport, DetailPlan, PhaseReport, Publisher, ResultsPlan,
    SiteProfile,
};
pub use queue::{CrawlCandidate, CrawlQueue, QueueBatch, QueueCursor};
pub use searcher::{
    build_searcher, query_url, BuyingSearcher, RentingSearcher, SearchCore, SearchDriver,
    SearchFilter, Searcher,
};
pub use site::build_site;

use crate::browser::{self, build_http_client, BrowserSession};
use crate::config::{Config, PublisherConfig};
use crate::storage::{open_storage, share};
use crate::CasaError;
use std::path::Path;
use std::time::Instant;

/// Which phases a run executes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhaseSelection {
    #[default]
    All,
    Search,
    Detail,
}

/// Run-time overrides chosen on the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Case-insensitive substring of a publisher's name or website
    pub like: Option<String>,
    pub phase: PhaseSelection,
    /// Forces inspect-only detail visits regardless of configuration
    pub only_inspect: bool,
}

/// Result of one publisher's crawl
#[derive(Debug)]
pub struct PublisherOutcome {
    pub name: String,
    pub result: Result<CrawlReport, CasaError>,
}

/// Publishers matching the `--like` filter, in configuration order
pub fn select_publishers<'a>(config: &'a Config, like: Option<&str>) -> Vec<&'a PublisherConfig> {
    let Some(term) = like.map(str::to_lowercase) else {
        return config.publishers.iter().collect();
    };
    config
        .publishers
        .iter()
        .filter(|p| {
            p.name.to_lowercase().contains(&term) || p.website.to_lowercase().contains(&term)
        })
        .collect()
}

/// Runs a complete crawl
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the listing store
/// 2. Launch the configured browser backend
/// 3. Crawl every selected publisher in turn
/// 4. Close the browser session
///
/// A publisher that fails does not stop the others; its error is part of
/// the returned outcomes.
///
/// # Returns
///
/// * `Ok(Vec<PublisherOutcome>)` - One outcome per selected publisher
/// * `Err(CasaError)` - The store or the browser could not be set up
pub async fn run(config: &Config, options: &RunOptions) -> Result<Vec<PublisherOutcome>, CasaError> {
    let selected = select_publishers(config, options.like.as_deref());
    if selected.is_empty() {
        tracing::warn!("No publisher matches '{}'", options.like.as_deref().unwrap_or(""));
        return Ok(Vec::new());
    }

    let store = share(open_storage(Path::new(&config.storage.database_path))?);
    let session = browser::launch(&config.browser).await?;
    let http = build_http_client(&config.browser)?;

    let mut settings = config.crawl.clone();
    settings.only_inspect |= options.only_inspect;

    let ctx = CrawlContext {
        session: session.clone(),
        store,
        settings,
        http,
    };

    let start_time = Instant::now();
    let mut outcomes = Vec::with_capacity(selected.len());
    for publisher in selected {
        let result = crawl_publisher(publisher, config, &ctx, options.phase).await;
        match &result {
            Ok(report) => tracing::info!(
                publisher = %publisher.name,
                found = report.search.listings,
                refreshed = report.detail.listings,
                deleted = report.detail.deleted,
                failed = report.detail.failed,
                "Publisher done"
            ),
            Err(e) => tracing::error!("Publisher '{}' aborted: {}", publisher.name, e),
        }
        outcomes.push(PublisherOutcome {
            name: publisher.name.clone(),
            result,
        });
    }

    if let Err(e) = session.close().await {
        tracing::warn!("Closing browser session failed: {}", e);
    }

    tracing::info!(
        "Crawl complete: {} publishers in {:.1}s",
        outcomes.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(outcomes)
}

async fn crawl_publisher(
    config: &PublisherConfig,
    root: &Config,
    ctx: &CrawlContext,
    phase: PhaseSelection,
) -> Result<CrawlReport, CasaError> {
    let site = build_site(config, &ctx.settings, &root.browser)?;
    let mut publisher = Publisher::new(site, ctx.clone());

    match phase {
        PhaseSelection::All => publisher.process().await,
        PhaseSelection::Search => Ok(CrawlReport {
            search: publisher.run_search_phase().await?,
            ..CrawlReport::default()
        }),
        PhaseSelection::Detail => Ok(CrawlReport {
            detail: publisher.run_detail_phase().await?,
            ..CrawlReport::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
[storage]
database-path = ":memory:"

[[publisher]]
name = "Imobiliaria Sul"
website = "https://sul.example.com/"
results = { item = ".card" }
summary = { fields = { url = { selector = "a", attribute = "href" } } }
query = { buying-url = "https://sul.example.com/venda" }

[[publisher]]
name = "Casa Norte"
website = "https://norte-imoveis.example.com/"
results = { item = ".card" }
summary = { fields = { url = { selector = "a", attribute = "href" } } }
query = { buying-url = "https://norte-imoveis.example.com/venda" }
"#,
        )
        .unwrap()
    }

    fn names(selected: Vec<&PublisherConfig>) -> Vec<&str> {
        selected.into_iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_select_all_without_filter() {
        let config = config();
        assert_eq!(
            names(select_publishers(&config, None)),
            vec!["Imobiliaria Sul", "Casa Norte"]
        );
    }

    #[test]
    fn test_select_by_name_or_website() {
        let config = config();
        assert_eq!(names(select_publishers(&config, Some("SUL"))), vec!["Imobiliaria Sul"]);
        assert_eq!(
            names(select_publishers(&config, Some("norte-imoveis"))),
            vec!["Casa Norte"]
        );
        assert!(select_publishers(&config, Some("leste")).is_empty());
    }

    #[tokio::test]
    async fn test_run_without_matches_touches_nothing() {
        let config = config();
        let options = RunOptions {
            like: Some("leste".into()),
            ..RunOptions::default()
        };
        assert!(run(&config, &options).await.unwrap().is_empty());
    }
}
