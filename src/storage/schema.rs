//! Database schema definitions
//!
//! This module contains the SQL schema of the Casa-Ripple listing database.

/// SQL schema for the database
///
/// Timestamps are RFC 3339 UTC strings with microsecond precision and a `Z`
/// suffix, so lexical order equals chronological order.
pub const SCHEMA_SQL: &str = r#"
-- One row per listing URL
CREATE TABLE IF NOT EXISTS listings (
    url TEXT PRIMARY KEY,
    publisher TEXT,
    search_url TEXT,
    proposal TEXT,
    property_kind TEXT,
    address TEXT,
    price REAL,
    condo_fee REAL,
    property_tax REAL,
    bedrooms INTEGER,
    suites INTEGER,
    bathrooms INTEGER,
    parking_spaces INTEGER,
    area INTEGER,
    thumbnail BLOB,
    description TEXT,
    broker TEXT,
    floor INTEGER,
    balcony INTEGER,
    published_at TEXT,
    site_updated_at TEXT,
    preview BLOB,
    to_inspect INTEGER NOT NULL DEFAULT 1,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listings_publisher ON listings(publisher, deleted);
CREATE INDEX IF NOT EXISTS idx_listings_created ON listings(created_at);
CREATE INDEX IF NOT EXISTS idx_listings_updated ON listings(updated_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
