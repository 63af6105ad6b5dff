//! Publisher state machine
//!
//! A publisher crawls one site in two phases:
//! - search: every searcher variant runs on a fresh page, then the result
//!   pages are walked and each result card is stored as a summary record
//!   flagged for inspection
//! - detail: listings due for a visit are pulled from the queue in batches
//!   and each listing page is mapped into a detail record
//!
//! A failure inside the search phase aborts the phase. A failure while
//! visiting one listing only skips that listing.

use crate::browser::{
    pause, BrowserSession, Element, Locator, Page, ResponseFilter, ResultFeed, Scope,
};
use crate::config::CrawlSettings;
use crate::crawler::pictures::{composite_vertically, download_pictures, PictureCollector};
use crate::crawler::queue::{CrawlQueue, QueueCursor};
use crate::crawler::searcher::Searcher;
use crate::extract::{
    visible_count, visible_first, FieldError, FieldValue, FieldWarning, RecordMapper,
};
use crate::listing::{ListingPatch, DETAIL_SCHEMA, SUMMARY_SCHEMA};
use crate::storage::{SharedStore, StorageResult, Store};
use crate::CasaError;
use reqwest::Client;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use url::Url;

/// Everything a publisher needs from the outside world
#[derive(Clone)]
pub struct CrawlContext {
    pub session: Arc<dyn BrowserSession>,
    pub store: SharedStore,
    pub settings: CrawlSettings,
    /// Client for picture downloads
    pub http: Client,
}

impl CrawlContext {
    /// Runs one store operation under the store lock
    ///
    /// The lock is never held across a browser interaction.
    pub fn with_store<T>(
        &self,
        op: impl FnOnce(&mut dyn Store) -> StorageResult<T>,
    ) -> Result<T, CasaError> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| CasaError::Storage("store lock poisoned".to_string()))?;
        Ok(op(&mut *store)?)
    }
}

/// Where a publisher is in its crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Search { searcher: &'static str },
    Pagination { searcher: &'static str, page: u32 },
    Detail,
    Done,
    Error,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Search { searcher } => write!(f, "search ({searcher})"),
            Self::Pagination { searcher, page } => write!(f, "pagination ({searcher}, page {page})"),
            Self::Detail => write!(f, "detail"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Layout of a site's result pages
#[derive(Debug, Clone)]
pub struct ResultsPlan {
    /// CSS selector of one result card
    pub item: String,
    pub next_page: Option<Locator>,
    pub end: Option<Locator>,
}

/// How listing pages are read
pub struct DetailPlan {
    pub mapper: RecordMapper,
    pub not_found: Vec<Locator>,
    pub carousel_next: Option<Locator>,
    pub carousel_clicks: u32,
    pub pictures: ResponseFilter,
    pub picture_selector: Option<String>,
}

/// Everything the engine knows about one site
pub struct SiteProfile {
    pub name: String,
    pub website: Url,
    pub searchers: Vec<Box<dyn Searcher>>,
    pub results: ResultsPlan,
    pub summary: RecordMapper,
    pub detail: DetailPlan,
}

/// Counts of one phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Result pages walked
    pub pages: u32,
    /// Listings stored (search) or refreshed (detail)
    pub listings: u64,
    /// Listings found gone
    pub deleted: u64,
    /// Listings whose visit failed
    pub failed: u64,
    pub elapsed: Duration,
}

/// Outcome of `Publisher::process`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub search: PhaseReport,
    pub detail: PhaseReport,
}

enum Visit {
    Refreshed,
    Gone,
}

/// One site's crawl
pub struct Publisher {
    site: SiteProfile,
    ctx: CrawlContext,
    phase: CrawlPhase,
}

impl Publisher {
    pub fn new(site: SiteProfile, ctx: CrawlContext) -> Self {
        Self {
            site,
            ctx,
            phase: CrawlPhase::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.site.name
    }

    pub fn phase(&self) -> &CrawlPhase {
        &self.phase
    }

    /// Runs the search phase, then the detail phase
    pub async fn process(&mut self) -> Result<CrawlReport, CasaError> {
        let search = self.run_search_phase().await?;
        let detail = self.run_detail_phase().await?;
        Ok(CrawlReport { search, detail })
    }

    /// Runs every searcher and stores the results it finds
    ///
    /// # Returns
    ///
    /// * `Ok(PhaseReport)` - Every searcher ran to the last result page
    /// * `Err(CasaError::Phase)` - A searcher failed; later searchers did not run
    pub async fn run_search_phase(&mut self) -> Result<PhaseReport, CasaError> {
        let started = Instant::now();
        let mut report = PhaseReport::default();
        tracing::info!(
            publisher = %self.site.name,
            searchers = self.site.searchers.len(),
            "Search phase started"
        );

        for searcher in &self.site.searchers {
            self.phase = CrawlPhase::Search {
                searcher: searcher.label(),
            };

            let page = match self.ctx.session.new_page(self.site.website.as_str()).await {
                Ok(page) => page,
                Err(e) => {
                    let e = CasaError::from(e);
                    log_failure(&self.ctx, &self.site.name, &self.phase, &e).await;
                    self.phase = CrawlPhase::Error;
                    return Err(phase_error(&self.site.name, "search", e));
                }
            };

            let outcome = run_searcher(
                &self.site,
                &self.ctx,
                searcher.as_ref(),
                page.as_ref(),
                &mut self.phase,
                &mut report,
            )
            .instrument(tracing::info_span!(
                "search",
                publisher = %self.site.name,
                searcher = searcher.label()
            ))
            .await;

            if let Err(e) = outcome {
                log_failure(&self.ctx, &self.site.name, &self.phase, &e).await;
                close_page(page.as_ref()).await;
                self.phase = CrawlPhase::Error;
                return Err(phase_error(&self.site.name, "search", e));
            }
            close_page(page.as_ref()).await;
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            publisher = %self.site.name,
            pages = report.pages,
            listings = report.listings,
            "Search phase finished in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        self.phase = CrawlPhase::Done;
        Ok(report)
    }

    /// Visits every listing the queue reports as due
    ///
    /// Failures of single listings are logged and counted; only store
    /// failures end the phase early.
    pub async fn run_detail_phase(&mut self) -> Result<PhaseReport, CasaError> {
        self.phase = CrawlPhase::Detail;
        let started = Instant::now();
        let mut report = PhaseReport::default();

        let settings = &self.ctx.settings;
        let queue = CrawlQueue::new(self.site.name.clone(), settings);
        let mut cursor = QueueCursor::new(settings.batch_size, queue.only_inspect());
        let mut attempted: HashSet<String> = HashSet::new();

        tracing::info!(
            publisher = %self.site.name,
            only_inspect = queue.only_inspect(),
            "Detail phase started"
        );

        loop {
            let window = cursor.window();
            let batch = match self.ctx.with_store(|store| queue.next(store, window)) {
                Ok(batch) => batch,
                Err(e) => {
                    self.phase = CrawlPhase::Error;
                    return Err(phase_error(&self.site.name, "detail", e));
                }
            };
            if batch.candidates.is_empty() {
                break;
            }

            let mut all_seen = true;
            for candidate in &batch.candidates {
                if !attempted.insert(candidate.url.clone()) {
                    continue;
                }
                all_seen = false;

                match visit_listing(&self.site, &self.ctx, &candidate.url).await {
                    Ok(Visit::Refreshed) => report.listings += 1,
                    Ok(Visit::Gone) => report.deleted += 1,
                    Err(e) if is_store_failure(&e) => {
                        self.phase = CrawlPhase::Error;
                        return Err(phase_error(&self.site.name, "detail", e));
                    }
                    Err(_) => report.failed += 1,
                }
            }

            cursor.advance(batch.total, all_seen);

            let elapsed = started.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} listings visited, {} due, {:.2} listings/sec",
                attempted.len(),
                batch.total,
                attempted.len() as f64 / elapsed.max(f64::EPSILON)
            );
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            publisher = %self.site.name,
            refreshed = report.listings,
            deleted = report.deleted,
            failed = report.failed,
            "Detail phase finished in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        self.phase = CrawlPhase::Done;
        Ok(report)
    }
}

/// Submits one search and walks its result pages
async fn run_searcher(
    site: &SiteProfile,
    ctx: &CrawlContext,
    searcher: &dyn Searcher,
    page: &dyn Page,
    phase: &mut CrawlPhase,
    report: &mut PhaseReport,
) -> Result<(), CasaError> {
    searcher.search(page).await?;
    paginate(site, ctx, searcher, page, phase, report).await
}

/// Walks the result pages of one search
async fn paginate(
    site: &SiteProfile,
    ctx: &CrawlContext,
    searcher: &dyn Searcher,
    page: &dyn Page,
    phase: &mut CrawlPhase,
    report: &mut PhaseReport,
) -> Result<(), CasaError> {
    let settings = &ctx.settings;
    let mut number = 1;
    let mut found: HashSet<String> = HashSet::new();

    loop {
        *phase = CrawlPhase::Pagination {
            searcher: searcher.label(),
            page: number,
        };
        let search_url = page.url().await?;

        let mut feed = ResultFeed::new(
            page,
            site.results.item.as_str(),
            settings.scroll_step,
            settings.scroll_pause(),
        )
        .with_end(site.results.end.clone());

        let mut fresh = 0u64;
        while let Some(card) = feed.next().await? {
            if let Some(url) = store_summary(site, ctx, searcher, card.as_ref(), &search_url).await? {
                if found.insert(url) {
                    fresh += 1;
                }
            }
        }
        tracing::debug!(searcher = searcher.label(), page = number, fresh, "Result page done");
        report.pages += 1;
        report.listings += fresh;

        if settings.max_result_pages.is_some_and(|max| number >= max) {
            break;
        }
        // an inert next control leaves the same cards on screen
        if fresh == 0 {
            tracing::debug!(
                searcher = searcher.label(),
                page = number,
                "No new listings on this page, pagination stopped"
            );
            break;
        }
        let Some(next) = &site.results.next_page else {
            break;
        };
        match visible_first(Scope::Page(page), next).await {
            Ok(button) => button.click().await?,
            Err(FieldError::Browser(e)) => return Err(e.into()),
            Err(_) => break,
        }
        pause(settings.wait()).await;
        number += 1;
    }

    Ok(())
}

/// Stores one result card as a summary record
///
/// Returns the listing URL, or `None` for cards without one.
async fn store_summary(
    site: &SiteProfile,
    ctx: &CrawlContext,
    searcher: &dyn Searcher,
    card: &dyn Element,
    search_url: &str,
) -> Result<Option<String>, CasaError> {
    let extraction = site
        .summary
        .extract(Scope::Element(card), &SUMMARY_SCHEMA)
        .await?;

    let Some(href) = extraction.record.get("url").and_then(FieldValue::as_text) else {
        tracing::warn!(
            publisher = %site.name,
            dropped = extraction.warnings.len(),
            "Result card without a listing URL skipped"
        );
        return Ok(None);
    };
    let url = site.website.join(href)?;
    log_field_warnings(url.as_str(), &extraction.warnings);

    let mut patch = ListingPatch::from_fields(url.as_str(), &extraction.record);
    patch.publisher = Some(site.name.clone());
    patch.search_url = Some(search_url.to_string());
    patch.proposal = patch.proposal.or(Some(searcher.proposal()));
    patch.to_inspect = Some(true);
    patch.deleted = Some(false);

    ctx.with_store(|store| store.upsert(&patch))?;
    Ok(Some(url.into()))
}

/// Opens, reads and closes one listing page
///
/// The picture listener is attached to a blank page before the listing is
/// loaded, so it sees the images of the first render too.
async fn visit_listing(site: &SiteProfile, ctx: &CrawlContext, url: &str) -> Result<Visit, CasaError> {
    tracing::debug!("Visiting {}", url);
    let settings = &ctx.settings;

    let has_preview = ctx
        .with_store(|store| store.get(url))?
        .is_some_and(|record| record.preview.is_some());
    let wants_pictures = settings.always_redownload_pictures || !has_preview;

    let page = match ctx.session.new_blank_page().await {
        Ok(page) => page,
        Err(e) => {
            let e = CasaError::from(e);
            log_failure(ctx, url, &CrawlPhase::Detail, &e).await;
            return Err(e);
        }
    };
    let collector = if wants_pictures {
        PictureCollector::start(page.as_ref(), site.detail.pictures.clone(), settings.max_pictures)
            .await
    } else {
        PictureCollector::idle()
    };

    let outcome = async {
        page.goto(url).await?;
        read_listing(site, ctx, url, page.as_ref(), collector, wants_pictures).await
    }
    .instrument(tracing::info_span!("listing", %url))
    .await;
    if let Err(e) = &outcome {
        log_failure(ctx, url, &CrawlPhase::Detail, e).await;
    }
    close_page(page.as_ref()).await;
    outcome
}

/// Maps a loaded listing page into the store
///
/// Without `wants_pictures` the listing keeps its current preview.
async fn read_listing(
    site: &SiteProfile,
    ctx: &CrawlContext,
    url: &str,
    page: &dyn Page,
    collector: PictureCollector,
    wants_pictures: bool,
) -> Result<Visit, CasaError> {
    let settings = &ctx.settings;

    if is_not_found(site, page).await? {
        let patch = ListingPatch {
            to_inspect: Some(false),
            deleted: Some(true),
            ..ListingPatch::new(url)
        };
        ctx.with_store(|store| store.upsert(&patch))?;
        tracing::info!("Listing gone: {}", url);
        return Ok(Visit::Gone);
    }

    let extraction = site
        .detail
        .mapper
        .extract(Scope::Page(page), &DETAIL_SCHEMA)
        .await?;
    log_field_warnings(url, &extraction.warnings);

    if wants_pictures {
        turn_carousel(site, settings, page).await;
    }
    let mut pictures = collector.finish().await;
    if wants_pictures && pictures.is_empty() {
        if let Some(selector) = &site.detail.picture_selector {
            pictures = download_pictures(&ctx.http, page, selector, settings.max_pictures)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!("Picture download skipped for {}: {}", url, e);
                    Vec::new()
                });
        }
    }
    let preview = match composite_vertically(&pictures) {
        Ok(preview) => preview,
        Err(e) => {
            tracing::warn!("Preview for {} not built: {}", url, e);
            None
        }
    };

    let mut patch = ListingPatch::from_fields(url, &extraction.record);
    patch.preview = preview;
    patch.to_inspect = Some(false);
    patch.deleted = Some(false);
    ctx.with_store(|store| store.upsert(&patch))?;

    Ok(Visit::Refreshed)
}

/// Whether the listing page reports the listing as gone
async fn is_not_found(site: &SiteProfile, page: &dyn Page) -> Result<bool, CasaError> {
    if matches!(page.status().await, Some(404 | 410)) {
        return Ok(true);
    }
    for marker in &site.detail.not_found {
        match visible_count(Scope::Page(page), marker).await {
            Ok(0) => {}
            Ok(_) => return Ok(true),
            Err(FieldError::Browser(e)) => return Err(e.into()),
            Err(e) => tracing::debug!("Not-found marker '{}' unreadable: {}", marker, e),
        }
    }
    Ok(false)
}

/// Clicks through the picture carousel so its images load
///
/// Best effort: any failure just ends the clicking.
async fn turn_carousel(site: &SiteProfile, settings: &CrawlSettings, page: &dyn Page) {
    let Some(next) = &site.detail.carousel_next else {
        return;
    };
    for _ in 0..site.detail.carousel_clicks {
        let clicked = match visible_first(Scope::Page(page), next).await {
            Ok(button) => button.click().await.map_err(FieldError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = clicked {
            tracing::debug!("Carousel stopped: {}", e);
            break;
        }
        pause(settings.scroll_pause()).await;
    }
}

fn log_field_warnings(url: &str, warnings: &[FieldWarning]) {
    for warning in warnings {
        tracing::warn!(
            field = %warning.field,
            listing = %url,
            "Field extraction failed: {}",
            warning.message
        );
    }
}

async fn close_page(page: &dyn Page) {
    if let Err(e) = page.close().await {
        tracing::debug!("Closing page failed: {}", e);
    }
}

/// Logs a failure together with every page still open in the session
async fn log_failure(ctx: &CrawlContext, what: &str, phase: &CrawlPhase, err: &CasaError) {
    let open_pages = ctx.session.open_pages().await;
    tracing::error!(
        phase = %phase,
        open_pages = ?open_pages,
        "{} failed: {}",
        what,
        err
    );
}

fn phase_error(publisher: &str, phase: &'static str, source: CasaError) -> CasaError {
    CasaError::Phase {
        publisher: publisher.to_string(),
        phase,
        source: Box::new(source),
    }
}

fn is_store_failure(err: &CasaError) -> bool {
    matches!(
        err,
        CasaError::StorageError(_) | CasaError::Storage(_) | CasaError::Database(_)
    )
}
