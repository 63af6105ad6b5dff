//! Casa-Ripple: an incremental property-listing crawler
//!
//! This crate drives a browser through real-estate search flows, maps result
//! and detail pages into typed listing records, and keeps the resulting
//! dataset fresh by revisiting listings on a staleness schedule.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod listing;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Casa-Ripple operations
#[derive(Debug, Error)]
pub enum CasaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Field error: {0}")]
    Field(#[from] extract::FieldError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Search '{searcher}' failed: {source}")]
    Search {
        searcher: String,
        #[source]
        source: Box<CasaError>,
    },

    #[error("Publisher '{publisher}' failed during {phase} phase: {source}")]
    Phase {
        publisher: String,
        phase: &'static str,
        #[source]
        source: Box<CasaError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for Casa-Ripple operations
pub type Result<T> = std::result::Result<T, CasaError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlContext, CrawlPhase, Publisher};
pub use listing::{ListingPatch, ListingRecord, Proposal};
pub use storage::{SqliteStorage, Store};
