//! Listing table for the `--list` mode

use crate::listing::ListingRecord;
use crate::storage::{ListingQuery, Store};
use crate::CasaError;
use std::fmt::Write;

/// One page of search results
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Matches across the whole dataset
    pub total: u64,
    pub listings: Vec<ListingRecord>,
}

/// Runs a listing search against the store
pub fn load_listings(store: &dyn Store, query: &ListingQuery) -> Result<ListingPage, CasaError> {
    let (total, listings) = store.search(query)?;
    Ok(ListingPage { total, listings })
}

/// Formats a price the way listing sites print it, e.g. `R$ 1.250.000`
pub fn format_price(price: f64) -> String {
    let whole = price.round().abs() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if price < 0.0 { "-" } else { "" };
    format!("R$ {sign}{grouped}")
}

/// Formats a page of listings as a plain-text table
pub fn render_listings(page: &ListingPage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Listings ({} of {}) ===\n",
        page.listings.len(),
        page.total
    );

    for listing in &page.listings {
        let proposal = listing.proposal.map_or("-", |p| p.to_db_string());
        let price = listing.price.map_or_else(|| "-".to_string(), format_price);
        let _ = writeln!(out, "{}", listing.url);
        let _ = write!(
            out,
            "  {} | {} | {}",
            listing.publisher.as_deref().unwrap_or("-"),
            proposal,
            price
        );
        if let Some(bedrooms) = listing.bedrooms {
            let _ = write!(out, " | {bedrooms} bedrooms");
        }
        if let Some(area) = listing.area {
            let _ = write!(out, " | {area} m²");
        }
        if listing.deleted {
            let _ = write!(out, " | deleted");
        }
        let _ = writeln!(out);
        if let Some(address) = &listing.address {
            let _ = writeln!(out, "  {address}");
        }
        if let Some(broker) = &listing.broker {
            let _ = writeln!(out, "  Broker: {broker}");
        }
        let _ = writeln!(
            out,
            "  Updated: {}",
            listing.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    out
}

/// Prints a page of listings to stdout
pub fn print_listings(page: &ListingPage) {
    print!("{}", render_listings(page));
}
