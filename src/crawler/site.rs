//! Site profile builder
//!
//! Turns one `[[publisher]]` table into the runtime pieces a `Publisher`
//! works with: searchers sharing one `SearchCore`, the summary and detail
//! mappers, and the picture response filter.

use crate::browser::{Locator, ResponseFilter};
use crate::config::{BrowserConfig, CrawlSettings, FieldRule, PublisherConfig};
use crate::crawler::publisher::{DetailPlan, ResultsPlan, SiteProfile};
use crate::crawler::searcher::{build_searcher, SearchCore, SearchDriver};
use crate::extract::{ExpandHook, RecordMapper, SelectorField};
use crate::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds the runtime profile of one publisher
///
/// # Arguments
///
/// * `publisher` - The validated publisher table
/// * `settings` - Crawl pacing; the search wait and mapper settle time come from here
/// * `browser` - Browser settings; navigation timeout bounds search waits
///
/// # Returns
///
/// * `Ok(SiteProfile)` - Profile ready to hand to `Publisher::new`
/// * `Err(ConfigError)` - A URL, pattern or driver could not be built
pub fn build_site(
    publisher: &PublisherConfig,
    settings: &CrawlSettings,
    browser: &BrowserConfig,
) -> Result<SiteProfile, ConfigError> {
    let website = Url::parse(&publisher.website)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {e}", publisher.website)))?;

    let driver = match (&publisher.form, &publisher.query) {
        (Some(form), _) => SearchDriver::Form(form.clone()),
        (None, Some(query)) => SearchDriver::Query(query.clone()),
        (None, None) => {
            return Err(ConfigError::Validation(format!(
                "Publisher '{}' has neither a search form nor a search query",
                publisher.name
            )))
        }
    };
    let core = Arc::new(SearchCore::new(
        driver,
        settings.wait(),
        Duration::from_secs(browser.navigation_timeout_secs),
    ));
    let searchers = publisher
        .searchers
        .iter()
        .map(|kind| build_searcher(*kind, Arc::clone(&core), publisher.search.resolved(*kind)))
        .collect();

    let summary = build_mapper(
        &publisher.summary.fields,
        publisher.summary.expand.as_ref(),
        &website,
        settings,
    )?;
    let detail_mapper = build_mapper(
        &publisher.detail.fields,
        publisher.detail.expand.as_ref(),
        &website,
        settings,
    )?;

    let picture_pattern = publisher
        .detail
        .picture_url_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;

    tracing::debug!(
        publisher = %publisher.name,
        searchers = publisher.searchers.len(),
        summary_fields = publisher.summary.fields.len(),
        detail_fields = publisher.detail.fields.len(),
        "Site profile built"
    );

    Ok(SiteProfile {
        name: publisher.name.clone(),
        website,
        searchers,
        results: ResultsPlan {
            item: publisher.results.item.clone(),
            next_page: publisher.results.next_page.clone(),
            end: publisher.results.end.clone(),
        },
        summary,
        detail: DetailPlan {
            mapper: detail_mapper,
            not_found: publisher.detail.not_found.clone(),
            carousel_next: publisher.detail.carousel_next.clone(),
            carousel_clicks: publisher.detail.carousel_clicks,
            pictures: ResponseFilter::images(picture_pattern),
            picture_selector: publisher.detail.picture_selector.clone(),
        },
    })
}

fn build_mapper(
    fields: &BTreeMap<String, FieldRule>,
    expand: Option<&Locator>,
    website: &Url,
    settings: &CrawlSettings,
) -> Result<RecordMapper, ConfigError> {
    let mut mapper = RecordMapper::new();
    for (name, rule) in fields {
        mapper = mapper.with_field(name.clone(), SelectorField::from_rule(rule, Some(website))?);
    }
    if let Some(expand) = expand {
        mapper = mapper.with_hook(ExpandHook::new(expand.clone(), settings.wait()));
    }
    Ok(mapper)
}
