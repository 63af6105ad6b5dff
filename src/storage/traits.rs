//! Storage traits and error types
//!
//! This module defines the trait interface for listing stores and
//! associated error types.

use crate::listing::{ListingPatch, ListingRecord};
use crate::storage::{ListingQuery, PublisherStats, QueueSelection, Window};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for listing store implementations
///
/// Every write is a single-record read-modify-write committed on its own, so
/// an interrupted crawl always leaves a consistent dataset behind.
pub trait Store: Send {
    // ===== Writes =====

    /// Merges a patch into the listing keyed by `patch.url`
    ///
    /// Creates the listing when it does not exist yet. Present fields
    /// overwrite stored ones, absent fields are left untouched, and
    /// `updated_at` never moves backwards.
    ///
    /// # Returns
    ///
    /// The listing as stored after the merge
    fn upsert(&mut self, patch: &ListingPatch) -> StorageResult<ListingRecord>;

    // ===== Reads =====

    /// Gets a listing by URL
    fn get(&self, url: &str) -> StorageResult<Option<ListingRecord>>;

    /// URLs of one publisher due for a detail visit
    ///
    /// # Arguments
    ///
    /// * `publisher` - Exact publisher name
    /// * `selection` - Which listings count as due
    /// * `window` - Offset/limit into the newest-first ordering
    ///
    /// # Returns
    ///
    /// The total number of due listings and the URLs inside the window
    fn query(
        &self,
        publisher: &str,
        selection: &QueueSelection,
        window: Window,
    ) -> StorageResult<(u64, Vec<String>)>;

    /// Searches listings for downstream consumers
    ///
    /// # Returns
    ///
    /// The total number of matches and the records inside the window
    fn search(&self, query: &ListingQuery) -> StorageResult<(u64, Vec<ListingRecord>)>;

    // ===== Statistics =====

    /// Per-publisher counts, ordered by publisher name
    fn publisher_stats(&self) -> StorageResult<Vec<PublisherStats>>;
}
