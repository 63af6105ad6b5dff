//! Search variants
//!
//! A `Searcher` drives one search configuration to completion on a loaded
//! page. The steps every variant shares live in `SearchCore`:
//! - dismissing an optional consent banner (never fatal)
//! - choosing the proposal, locations and property types
//! - submitting and waiting for results
//!
//! Variants only decide which filters they send.

use crate::browser::{pause, Locator, Page, Scope};
use crate::config::{FormConfig, QueryConfig, SearchSettings, SearcherKind};
use crate::extract::{visible_first, wait_visible};
use crate::listing::Proposal;
use crate::{CasaError, ConfigError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// One way of configuring and submitting a publisher's search
#[async_trait]
pub trait Searcher: Send + Sync {
    fn kind(&self) -> SearcherKind;

    fn label(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Proposal assumed for results when the card does not state one
    fn proposal(&self) -> Proposal {
        self.kind().proposal()
    }

    /// Configures and submits the search on `page`, leaving results visible
    async fn search(&self, page: &dyn Page) -> Result<(), CasaError>;
}

/// How a publisher's search is submitted
#[derive(Debug, Clone)]
pub enum SearchDriver {
    /// Fill and submit the site's search form
    Form(FormConfig),
    /// Navigate straight to a search URL
    Query(QueryConfig),
}

/// A proposal-specific filter
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFilter {
    MaximumPrice(f64),
    MaximumCondominiumFee(f64),
    IncludeCondominiumFee,
    MinimumArea(u32),
    MaximumArea(u32),
    Bedrooms(u32),
    Bathrooms(u32),
}

impl SearchFilter {
    fn name(&self) -> &'static str {
        match self {
            Self::MaximumPrice(_) => "maximum-price",
            Self::MaximumCondominiumFee(_) => "maximum-condominium-fee",
            Self::IncludeCondominiumFee => "include-condominium-fee",
            Self::MinimumArea(_) => "minimum-area",
            Self::MaximumArea(_) => "maximum-area",
            Self::Bedrooms(_) => "bedrooms",
            Self::Bathrooms(_) => "bathrooms",
        }
    }
}

/// Filters both variants send
fn common_filters(settings: &SearchSettings) -> Vec<SearchFilter> {
    let mut filters = Vec::new();
    if let Some(price) = settings.maximum_price {
        filters.push(SearchFilter::MaximumPrice(price));
    }
    if let Some(area) = settings.minimum_area {
        filters.push(SearchFilter::MinimumArea(area));
    }
    if let Some(area) = settings.maximum_area {
        filters.push(SearchFilter::MaximumArea(area));
    }
    filters.extend(settings.bedrooms().iter().copied().map(SearchFilter::Bedrooms));
    filters.extend(settings.bathrooms().iter().copied().map(SearchFilter::Bathrooms));
    filters
}

/// Steps shared by every search variant of a publisher
#[derive(Debug, Clone)]
pub struct SearchCore {
    driver: SearchDriver,
    wait: Duration,
    timeout: Duration,
}

impl SearchCore {
    /// # Arguments
    ///
    /// * `driver` - Form or query submission
    /// * `wait` - Nominal pause after typing and navigating
    /// * `timeout` - Bound on waiting for suggestions and results
    pub fn new(driver: SearchDriver, wait: Duration, timeout: Duration) -> Self {
        Self {
            driver,
            wait,
            timeout,
        }
    }

    /// Runs the whole search for one variant
    pub async fn run(
        &self,
        page: &dyn Page,
        kind: SearcherKind,
        settings: &SearchSettings,
        filters: &[SearchFilter],
    ) -> Result<(), CasaError> {
        let outcome = match &self.driver {
            SearchDriver::Form(form) => self.run_form(page, form, kind, settings, filters).await,
            SearchDriver::Query(query) => {
                self.run_query(page, query, kind, settings, filters).await
            }
        };
        outcome.map_err(|e| CasaError::Search {
            searcher: kind.as_str().to_string(),
            source: Box::new(e),
        })
    }

    /// Clicks the consent banner away when one is showing
    ///
    /// The banner is optional, so every failure here is logged and ignored.
    pub async fn dismiss_consent(&self, page: &dyn Page) {
        let SearchDriver::Form(form) = &self.driver else {
            return;
        };
        let Some(consent) = &form.consent else {
            return;
        };

        match visible_first(Scope::Page(page), consent).await {
            Ok(button) => match button.click().await {
                Ok(()) => tracing::debug!("Consent banner dismissed"),
                Err(e) => tracing::info!("Could not dismiss consent banner: {}", e),
            },
            Err(e) => tracing::debug!("No consent banner: {}", e),
        }
    }

    async fn run_form(
        &self,
        page: &dyn Page,
        form: &FormConfig,
        kind: SearcherKind,
        settings: &SearchSettings,
        filters: &[SearchFilter],
    ) -> Result<(), CasaError> {
        self.dismiss_consent(page).await;

        let toggle = match kind {
            SearcherKind::Buying => &form.buying_toggle,
            SearcherKind::Renting => &form.renting_toggle,
        };
        if let Some(toggle) = toggle {
            click(page, toggle).await?;
        }

        if !settings.locations().is_empty() {
            match &form.location_input {
                Some(input) => {
                    for location in settings.locations() {
                        self.select_location(page, form, input, location).await?;
                    }
                }
                None => tracing::warn!("Search form has no location input; locations skipped"),
            }
        }

        for property_type in settings.property_types() {
            match &form.property_type_option {
                Some(template) => {
                    click(page, &Locator::from_template(template, property_type)?).await?
                }
                None => {
                    tracing::warn!(property_type = %property_type, "Search form has no property type option; skipped");
                    break;
                }
            }
        }

        for filter in filters {
            self.apply_form_filter(page, form, filter).await?;
        }

        if let Some(submit) = &form.submit {
            click(page, submit).await?;
        }
        match &form.results_ready {
            Some(ready) => {
                wait_visible(Scope::Page(page), ready, self.timeout).await?;
            }
            None => pause(self.wait).await,
        }
        Ok(())
    }

    async fn select_location(
        &self,
        page: &dyn Page,
        form: &FormConfig,
        input: &Locator,
        location: &str,
    ) -> Result<(), CasaError> {
        let field = visible_first(Scope::Page(page), input).await?;
        field.fill(location).await?;
        pause(self.wait).await;

        if let Some(suggestion) = &form.location_suggestion {
            let suggestion = Locator::from_template(&suggestion.to_string(), location)?;
            wait_visible(Scope::Page(page), &suggestion, self.timeout)
                .await?
                .click()
                .await?;
        }
        Ok(())
    }

    async fn apply_form_filter(
        &self,
        page: &dyn Page,
        form: &FormConfig,
        filter: &SearchFilter,
    ) -> Result<(), CasaError> {
        let (control, value) = match filter {
            SearchFilter::MaximumPrice(v) => (form.maximum_price.clone(), Some(format!("{v:.0}"))),
            SearchFilter::MaximumCondominiumFee(v) => {
                (form.maximum_condominium_fee.clone(), Some(format!("{v:.0}")))
            }
            SearchFilter::IncludeCondominiumFee => (form.include_condominium_fee.clone(), None),
            SearchFilter::MinimumArea(v) => (form.minimum_area.clone(), Some(v.to_string())),
            SearchFilter::MaximumArea(v) => (form.maximum_area.clone(), Some(v.to_string())),
            SearchFilter::Bedrooms(n) => (
                form.bedrooms_option
                    .as_deref()
                    .map(|t| Locator::from_template(t, &n.to_string()))
                    .transpose()?,
                None,
            ),
            SearchFilter::Bathrooms(n) => (
                form.bathrooms_option
                    .as_deref()
                    .map(|t| Locator::from_template(t, &n.to_string()))
                    .transpose()?,
                None,
            ),
        };

        let Some(control) = control else {
            tracing::warn!(filter = filter.name(), "Search form has no control for filter; skipped");
            return Ok(());
        };

        match value {
            Some(value) => {
                visible_first(Scope::Page(page), &control)
                    .await?
                    .fill(&value)
                    .await?
            }
            None => click(page, &control).await?,
        }
        Ok(())
    }

    async fn run_query(
        &self,
        page: &dyn Page,
        query: &QueryConfig,
        kind: SearcherKind,
        settings: &SearchSettings,
        filters: &[SearchFilter],
    ) -> Result<(), CasaError> {
        let url = query_url(query, kind, settings, filters)?;
        tracing::debug!("Search URL: {}", url);
        page.goto(url.as_str()).await?;
        pause(self.wait).await;
        Ok(())
    }
}

/// Builds the search URL of one variant
pub fn query_url(
    query: &QueryConfig,
    kind: SearcherKind,
    settings: &SearchSettings,
    filters: &[SearchFilter],
) -> Result<Url, CasaError> {
    let base = match kind {
        SearcherKind::Buying => &query.buying_url,
        SearcherKind::Renting => &query.renting_url,
    };
    let base = base.as_deref().ok_or_else(|| {
        ConfigError::Validation(format!("no {} search URL configured", kind.as_str()))
    })?;

    let mut url = Url::parse(base)?;
    let params = &query.params;
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(name) = &params.location {
            for location in settings.locations() {
                pairs.append_pair(name, location);
            }
        }
        if let Some(name) = &params.property_type {
            for property_type in settings.property_types() {
                pairs.append_pair(name, property_type);
            }
        }
        for filter in filters {
            let (name, value) = match filter {
                SearchFilter::MaximumPrice(v) => (&params.maximum_price, format!("{v:.0}")),
                SearchFilter::MaximumCondominiumFee(v) => {
                    (&params.maximum_condominium_fee, format!("{v:.0}"))
                }
                SearchFilter::IncludeCondominiumFee => {
                    (&params.include_condominium_fee, "true".to_string())
                }
                SearchFilter::MinimumArea(v) => (&params.minimum_area, v.to_string()),
                SearchFilter::MaximumArea(v) => (&params.maximum_area, v.to_string()),
                SearchFilter::Bedrooms(n) => (&params.bedrooms, n.to_string()),
                SearchFilter::Bathrooms(n) => (&params.bathrooms, n.to_string()),
            };
            match name {
                Some(name) => {
                    pairs.append_pair(name, &value);
                }
                None => tracing::warn!(
                    filter = filter.name(),
                    "Search URL has no parameter for filter; skipped"
                ),
            }
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

async fn click(page: &dyn Page, locator: &Locator) -> Result<(), CasaError> {
    visible_first(Scope::Page(page), locator).await?.click().await?;
    Ok(())
}

/// Searches for properties to buy
pub struct BuyingSearcher {
    core: Arc<SearchCore>,
    settings: SearchSettings,
}

impl BuyingSearcher {
    pub fn new(core: Arc<SearchCore>, settings: SearchSettings) -> Self {
        Self { core, settings }
    }

    pub fn filters(&self) -> Vec<SearchFilter> {
        common_filters(&self.settings)
    }
}

#[async_trait]
impl Searcher for BuyingSearcher {
    fn kind(&self) -> SearcherKind {
        SearcherKind::Buying
    }

    async fn search(&self, page: &dyn Page) -> Result<(), CasaError> {
        self.core
            .run(page, self.kind(), &self.settings, &self.filters())
            .await
    }
}

/// Searches for properties to rent, with condominium fee filters
pub struct RentingSearcher {
    core: Arc<SearchCore>,
    settings: SearchSettings,
}

impl RentingSearcher {
    pub fn new(core: Arc<SearchCore>, settings: SearchSettings) -> Self {
        Self { core, settings }
    }

    pub fn filters(&self) -> Vec<SearchFilter> {
        let mut filters = common_filters(&self.settings);
        if let Some(fee) = self.settings.maximum_condominium_fee {
            filters.push(SearchFilter::MaximumCondominiumFee(fee));
        }
        if self.settings.include_condominium_fee == Some(true) {
            filters.push(SearchFilter::IncludeCondominiumFee);
        }
        filters
    }
}

#[async_trait]
impl Searcher for RentingSearcher {
    fn kind(&self) -> SearcherKind {
        SearcherKind::Renting
    }

    async fn search(&self, page: &dyn Page) -> Result<(), CasaError> {
        self.core
            .run(page, self.kind(), &self.settings, &self.filters())
            .await
    }
}

/// Builds the searcher for one variant
pub fn build_searcher(
    kind: SearcherKind,
    core: Arc<SearchCore>,
    settings: SearchSettings,
) -> Box<dyn Searcher> {
    match kind {
        SearcherKind::Buying => Box::new(BuyingSearcher::new(core, settings)),
        SearcherKind::Renting => Box::new(RentingSearcher::new(core, settings)),
    }
}
