//! Output module for the read-only CLI modes
//!
//! This module handles:
//! - Dataset statistics per publisher (`--stats`)
//! - Listing tables backed by `Store::search` (`--list`)

mod listings;
pub mod stats;

pub use listings::{format_price, load_listings, print_listings, render_listings, ListingPage};
pub use stats::{load_statistics, print_statistics, render_statistics, DatasetStatistics};
