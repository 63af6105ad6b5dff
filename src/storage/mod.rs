//! Storage module for persisting listings
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Field-level merge upserts keyed by listing URL
//! - The re-crawl queue query used by the detail phase
//! - Search and statistics for the CLI

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{StorageError, StorageResult, Store};

use crate::listing::Proposal;
use crate::CasaError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Store handle shared by every publisher of a run
pub type SharedStore = Arc<Mutex<dyn Store>>;

/// Opens (or creates) the listing database at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CasaError> {
    SqliteStorage::new(path)
}

/// Wraps a store for sharing between publishers
pub fn share(store: impl Store + 'static) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Offset/limit window into an ordered result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// Which listings of a publisher are due for a detail visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSelection {
    /// Only listings flagged `to_inspect`
    pub only_inspect: bool,
    /// Also listings last updated before this instant
    pub stale_before: Option<DateTime<Utc>>,
    /// Also listings never fully detailed (no broker yet)
    pub revisit_unfinished: bool,
}

/// Ordering of search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListingOrder {
    #[default]
    Newest,
    RecentlyUpdated,
    PriceAscending,
    PriceDescending,
}

impl ListingOrder {
    fn sql(&self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, url ASC",
            Self::RecentlyUpdated => "updated_at DESC, url ASC",
            Self::PriceAscending => "price IS NULL, price ASC, url ASC",
            Self::PriceDescending => "price IS NULL, price DESC, url ASC",
        }
    }
}

/// Search over the listing dataset
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    /// Case-insensitive term matched against address, description and broker
    pub like: Option<String>,
    pub publisher: Option<String>,
    pub proposal: Option<Proposal>,
    pub maximum_price: Option<f64>,
    pub include_deleted: bool,
    pub order: ListingOrder,
    pub window: Window,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            like: None,
            publisher: None,
            proposal: None,
            maximum_price: None,
            include_deleted: false,
            order: ListingOrder::default(),
            window: Window::new(0, 50),
        }
    }
}

/// Counts for one publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherStats {
    pub publisher: String,
    pub total: u64,
    pub pending: u64,
    pub detailed: u64,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query() {
        let query = ListingQuery::default();
        assert!(!query.include_deleted);
        assert_eq!(query.order, ListingOrder::Newest);
        assert_eq!(query.window, Window::new(0, 50));
    }
}
