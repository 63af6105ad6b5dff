use crate::browser::Locator;
use crate::extract::ParseKind;
use crate::listing::Proposal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Casa-Ripple
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub crawl: CrawlSettings,
    #[serde(default, rename = "publisher")]
    pub publishers: Vec<PublisherConfig>,
}

/// Which browser backend drives the crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Chromium over the DevTools protocol
    #[default]
    Chrome,
    /// Plain HTTP fetches with server-rendered HTML
    Static,
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrowserConfig {
    pub backend: BackendKind,
    pub headless: bool,

    /// Path to the Chromium executable; autodetected when unset
    pub executable: Option<PathBuf>,

    /// Extra command-line arguments for Chromium
    pub args: Vec<String>,

    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub user_agent: Option<String>,

    /// Bound on navigations and protocol requests (seconds)
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            headless: true,
            executable: None,
            args: Vec::new(),
            window_width: None,
            window_height: None,
            user_agent: None,
            navigation_timeout_secs: 30,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

/// Crawl pacing and re-crawl policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlSettings {
    /// Listings untouched for longer than this are revisited; 0 disables
    pub look_back_minutes: u64,

    /// Only visit listings flagged for inspection
    pub only_inspect: bool,

    /// Revisit listings that never got a full detail extraction
    pub revisit_unfinished: bool,

    /// Capture pictures even when the listing already has a preview
    pub always_redownload_pictures: bool,

    /// Listing URLs pulled from the queue per batch
    pub batch_size: u32,

    /// Nominal pause after navigations and clicks (milliseconds)
    pub wait_ms: u64,

    /// Pixels scrolled per step on result pages
    pub scroll_step: u32,

    /// Nominal pause between scroll steps (milliseconds)
    pub scroll_pause_ms: u64,

    /// Stop following "next page" after this many result pages
    pub max_result_pages: Option<u32>,

    /// Pictures composited into a listing preview
    pub max_pictures: usize,
}

/// Widest accepted look-back window: ten years
pub const MAX_LOOK_BACK_MINUTES: u64 = 10 * 365 * 24 * 60;

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            look_back_minutes: 120,
            only_inspect: false,
            revisit_unfinished: true,
            always_redownload_pictures: false,
            batch_size: 10,
            wait_ms: 1000,
            scroll_step: 120,
            scroll_pause_ms: 60,
            max_result_pages: None,
            max_pictures: 8,
        }
    }
}

impl CrawlSettings {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    /// The staleness window, if stale revisits are enabled
    ///
    /// A window too wide to represent counts as disabled.
    pub fn look_back(&self) -> Option<chrono::Duration> {
        match self.look_back_minutes {
            0 => None,
            minutes => i64::try_from(minutes)
                .ok()
                .and_then(chrono::Duration::try_minutes),
        }
    }
}

/// Search variants a publisher runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearcherKind {
    Buying,
    Renting,
}

impl SearcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buying => "buying",
            Self::Renting => "renting",
        }
    }

    pub fn proposal(&self) -> Proposal {
        match self {
            Self::Buying => Proposal::Sell,
            Self::Renting => Proposal::Rent,
        }
    }
}

fn default_searchers() -> Vec<SearcherKind> {
    vec![SearcherKind::Buying, SearcherKind::Renting]
}

/// One crawl target
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PublisherConfig {
    pub name: String,

    /// Home page where every search starts
    pub website: String,

    #[serde(default = "default_searchers")]
    pub searchers: Vec<SearcherKind>,

    #[serde(default)]
    pub search: PublisherSearch,

    /// Drives the site's search form
    pub form: Option<FormConfig>,

    /// Builds search URLs directly
    pub query: Option<QueryConfig>,

    pub results: ResultsConfig,
    pub summary: MapperConfig,
    #[serde(default)]
    pub detail: DetailConfig,
}

/// Search settings of one publisher, per variant
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PublisherSearch {
    pub base: SearchSettings,
    pub buying: SearchSettings,
    pub renting: SearchSettings,
}

impl PublisherSearch {
    /// Settings of one variant with unset keys taken from `base`
    pub fn resolved(&self, kind: SearcherKind) -> SearchSettings {
        match kind {
            SearcherKind::Buying => self.buying.inherit(&self.base),
            SearcherKind::Renting => self.renting.inherit(&self.base),
        }
    }
}

/// What one search asks the site for
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SearchSettings {
    pub locations: Option<Vec<String>>,
    pub property_types: Option<Vec<String>>,
    pub maximum_price: Option<f64>,
    pub maximum_condominium_fee: Option<f64>,
    pub include_condominium_fee: Option<bool>,
    pub minimum_area: Option<u32>,
    pub maximum_area: Option<u32>,
    pub bedrooms: Option<Vec<u32>>,
    pub bathrooms: Option<Vec<u32>>,
}

impl SearchSettings {
    /// Fills every unset key from `base`
    pub fn inherit(&self, base: &SearchSettings) -> SearchSettings {
        SearchSettings {
            locations: self.locations.clone().or_else(|| base.locations.clone()),
            property_types: self
                .property_types
                .clone()
                .or_else(|| base.property_types.clone()),
            maximum_price: self.maximum_price.or(base.maximum_price),
            maximum_condominium_fee: self
                .maximum_condominium_fee
                .or(base.maximum_condominium_fee),
            include_condominium_fee: self
                .include_condominium_fee
                .or(base.include_condominium_fee),
            minimum_area: self.minimum_area.or(base.minimum_area),
            maximum_area: self.maximum_area.or(base.maximum_area),
            bedrooms: self.bedrooms.clone().or_else(|| base.bedrooms.clone()),
            bathrooms: self.bathrooms.clone().or_else(|| base.bathrooms.clone()),
        }
    }

    pub fn locations(&self) -> &[String] {
        self.locations.as_deref().unwrap_or_default()
    }

    pub fn property_types(&self) -> &[String] {
        self.property_types.as_deref().unwrap_or_default()
    }

    pub fn bedrooms(&self) -> &[u32] {
        self.bedrooms.as_deref().unwrap_or_default()
    }

    pub fn bathrooms(&self) -> &[u32] {
        self.bathrooms.as_deref().unwrap_or_default()
    }
}

/// Locators of a site's search form
///
/// Templates contain `{}` where the option value goes, e.g.
/// `"label=Quartos: {}"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FormConfig {
    pub consent: Option<Locator>,
    pub buying_toggle: Option<Locator>,
    pub renting_toggle: Option<Locator>,
    pub location_input: Option<Locator>,
    pub location_suggestion: Option<Locator>,
    pub property_type_option: Option<String>,
    pub maximum_price: Option<Locator>,
    pub maximum_condominium_fee: Option<Locator>,
    pub include_condominium_fee: Option<Locator>,
    pub minimum_area: Option<Locator>,
    pub maximum_area: Option<Locator>,
    pub bedrooms_option: Option<String>,
    pub bathrooms_option: Option<String>,
    pub submit: Option<Locator>,

    /// Visible once results have rendered
    pub results_ready: Option<Locator>,
}

/// Search by URL instead of by form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct QueryConfig {
    pub buying_url: Option<String>,
    pub renting_url: Option<String>,
    pub params: QueryParams,
}

/// Query parameter names; unset names are not sent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct QueryParams {
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub maximum_price: Option<String>,
    pub maximum_condominium_fee: Option<String>,
    pub include_condominium_fee: Option<String>,
    pub minimum_area: Option<String>,
    pub maximum_area: Option<String>,
    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
}

/// How search results are laid out
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultsConfig {
    /// CSS selector matching one result card
    pub item: String,
    pub next_page: Option<Locator>,

    /// Visible when the list has no more results
    pub end: Option<Locator>,
}

/// Field rules of the summary mapper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MapperConfig {
    pub expand: Option<Locator>,
    pub fields: BTreeMap<String, FieldRule>,
}

/// Listing page handling
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DetailConfig {
    /// Any of these visible means the listing is gone
    pub not_found: Vec<Locator>,
    pub expand: Option<Locator>,
    pub carousel_next: Option<Locator>,
    pub carousel_clicks: u32,
    pub picture_url_pattern: Option<String>,
    pub picture_selector: Option<String>,
    pub fields: BTreeMap<String, FieldRule>,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            not_found: Vec::new(),
            expand: None,
            carousel_next: None,
            carousel_clicks: 5,
            picture_url_pattern: None,
            picture_selector: None,
            fields: BTreeMap::new(),
        }
    }
}

/// Declarative extraction of one field
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldRule {
    /// Element holding the value; the scope itself when unset
    pub selector: Option<Locator>,
    pub attribute: Option<String>,
    #[serde(default)]
    pub parse: ParseKind,

    /// Regex applied to the text; the first capture group wins
    pub pattern: Option<String>,

    /// chrono format string for timestamps
    pub format: Option<String>,
}
