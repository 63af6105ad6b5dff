//! Statistics generation from the listing store
//!
//! This module provides functionality for extracting and displaying
//! dataset statistics for the `--stats` mode.

use crate::storage::{PublisherStats, Store};
use crate::CasaError;
use std::fmt::Write;

/// Dataset statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetStatistics {
    /// Per-publisher counts, ordered by publisher name
    pub publishers: Vec<PublisherStats>,

    /// Listings across every publisher
    pub total: u64,

    /// Listings still waiting for their first detail visit
    pub pending: u64,

    /// Listings visited at least once and still online
    pub detailed: u64,

    /// Listings found gone
    pub deleted: u64,
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The store to query
///
/// # Returns
///
/// * `Ok(DatasetStatistics)` - Successfully loaded statistics
/// * `Err(CasaError)` - Failed to query statistics
pub fn load_statistics(store: &dyn Store) -> Result<DatasetStatistics, CasaError> {
    let publishers = store.publisher_stats()?;

    let mut stats = DatasetStatistics::default();
    for publisher in &publishers {
        stats.total += publisher.total;
        stats.pending += publisher.pending;
        stats.detailed += publisher.detailed;
        stats.deleted += publisher.deleted;
    }
    stats.publishers = publishers;

    Ok(stats)
}

/// Formats statistics as the text block printed by `print_statistics`
pub fn render_statistics(stats: &DatasetStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Listing Statistics ===\n");

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Total listings: {}", stats.total);
    let _ = writeln!(out, "  Pending detail visit: {}", stats.pending);
    let _ = writeln!(out, "  Detailed: {}", stats.detailed);
    let _ = writeln!(out, "  Deleted: {}", stats.deleted);
    let _ = writeln!(out);

    if stats.publishers.is_empty() {
        let _ = writeln!(out, "No listings stored yet.");
        return out;
    }

    let _ = writeln!(out, "By Publisher:");
    for publisher in &stats.publishers {
        let _ = writeln!(
            out,
            "  {}: {} listings, {} pending, {} detailed ({:.1}%), {} deleted",
            publisher.publisher,
            publisher.total,
            publisher.pending,
            publisher.detailed,
            percentage(publisher.detailed, publisher.total),
            publisher.deleted
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Detail Coverage: {:.1}% ({} / {} listings detailed)",
        percentage(stats.detailed, stats.total),
        stats.detailed,
        stats.total
    );
    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &DatasetStatistics) {
    print!("{}", render_statistics(stats));
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingPatch;
    use crate::storage::SqliteStorage;

    fn seed(storage: &mut SqliteStorage, url: &str, publisher: &str, patch: ListingPatch) {
        storage
            .upsert(&ListingPatch {
                url: url.to_string(),
                publisher: Some(publisher.to_string()),
                ..patch
            })
            .unwrap();
    }

    #[test]
    fn test_load_statistics_sums_publishers() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed(&mut storage, "https://a/1", "norte", ListingPatch::default());
        seed(
            &mut storage,
            "https://a/2",
            "norte",
            ListingPatch {
                to_inspect: Some(false),
                broker: Some("Jane Realty".into()),
                ..ListingPatch::default()
            },
        );
        seed(
            &mut storage,
            "https://b/1",
            "sul",
            ListingPatch {
                to_inspect: Some(false),
                deleted: Some(true),
                ..ListingPatch::default()
            },
        );

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.publishers.len(), 2);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.detailed, 1);
        assert_eq!(stats.deleted, 1);
    }

    #[test]
    fn test_render_empty_dataset() {
        let rendered = render_statistics(&DatasetStatistics::default());
        assert!(rendered.contains("Total listings: 0"));
        assert!(rendered.contains("No listings stored yet."));
    }

    #[test]
    fn test_render_publisher_lines() {
        let stats = DatasetStatistics {
            publishers: vec![PublisherStats {
                publisher: "sul".into(),
                total: 4,
                pending: 1,
                detailed: 3,
                deleted: 0,
            }],
            total: 4,
            pending: 1,
            detailed: 3,
            deleted: 0,
        };
        let rendered = render_statistics(&stats);
        assert!(rendered.contains("  sul: 4 listings, 1 pending, 3 detailed (75.0%), 0 deleted"));
        assert!(rendered.contains("Detail Coverage: 75.0% (3 / 4 listings detailed)"));
    }
}
