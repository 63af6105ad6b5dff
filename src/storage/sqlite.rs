//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::listing::{ListingPatch, ListingRecord, PropertyKind, Proposal};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageResult, Store};
use crate::storage::{ListingQuery, PublisherStats, QueueSelection, Window};
use crate::CasaError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const RECORD_COLUMNS: &str = "url, publisher, search_url, proposal, property_kind, address, \
    price, condo_fee, property_tax, bedrooms, suites, bathrooms, parking_spaces, area, \
    thumbnail, description, broker, floor, balcony, published_at, site_updated_at, preview, \
    to_inspect, deleted, created_at, updated_at";

/// Selection shared by the queue count and the queue slice
const QUEUE_PREDICATE: &str = "publisher = ?1 AND deleted = 0 AND (to_inspect = 1 OR (?2 = 0 AND \
    ((?3 IS NOT NULL AND updated_at < ?3) OR (?4 = 1 AND broker IS NULL))))";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CasaError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CasaError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, CasaError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Merges a patch as of the given instant
    pub fn upsert_at(
        &mut self,
        patch: &ListingPatch,
        now: DateTime<Utc>,
    ) -> StorageResult<ListingRecord> {
        let tx = self.conn.transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM listings WHERE url = ?1"),
                params![patch.url],
                read_record,
            )
            .optional()?;

        let record = match existing {
            Some(mut record) => {
                record.apply(patch, now);
                record
            }
            None => ListingRecord::from_patch(patch, now),
        };

        write_record(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }
}

impl Store for SqliteStorage {
    // ===== Writes =====

    fn upsert(&mut self, patch: &ListingPatch) -> StorageResult<ListingRecord> {
        self.upsert_at(patch, Utc::now())
    }

    // ===== Reads =====

    fn get(&self, url: &str) -> StorageResult<Option<ListingRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM listings WHERE url = ?1"),
                params![url],
                read_record,
            )
            .optional()?;
        Ok(record)
    }

    fn query(
        &self,
        publisher: &str,
        selection: &QueueSelection,
        window: Window,
    ) -> StorageResult<(u64, Vec<String>)> {
        let stale_before = selection.stale_before.map(fmt_ts);

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM listings WHERE {QUEUE_PREDICATE}"),
            params![
                publisher,
                selection.only_inspect,
                stale_before,
                selection.revisit_unfinished
            ],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT url FROM listings WHERE {QUEUE_PREDICATE} \
             ORDER BY created_at DESC, url ASC LIMIT ?5 OFFSET ?6"
        ))?;
        let urls = stmt
            .query_map(
                params![
                    publisher,
                    selection.only_inspect,
                    stale_before,
                    selection.revisit_unfinished,
                    window.limit as i64,
                    window.offset as i64
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((total as u64, urls))
    }

    fn search(&self, query: &ListingQuery) -> StorageResult<(u64, Vec<ListingRecord>)> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(term) = query.like.as_deref().filter(|t| !t.trim().is_empty()) {
            conditions.push("(address LIKE ? OR description LIKE ? OR broker LIKE ?)");
            let pattern = format!("%{}%", term.trim());
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }
        if let Some(publisher) = &query.publisher {
            conditions.push("publisher = ?");
            values.push(Value::Text(publisher.clone()));
        }
        if let Some(proposal) = query.proposal {
            conditions.push("proposal = ?");
            values.push(Value::Text(proposal.to_db_string().to_string()));
        }
        if let Some(maximum_price) = query.maximum_price {
            conditions.push("price <= ?");
            values.push(Value::Real(maximum_price));
        }
        if !query.include_deleted {
            conditions.push("deleted = 0");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM listings {where_clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(query.window.limit as i64));
        values.push(Value::Integer(query.window.offset as i64));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM listings {where_clause} ORDER BY {} LIMIT ? OFFSET ?",
            query.order.sql()
        ))?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), read_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((total as u64, records))
    }

    // ===== Statistics =====

    fn publisher_stats(&self) -> StorageResult<Vec<PublisherStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT publisher,
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN to_inspect = 1 AND deleted = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN to_inspect = 0 AND deleted = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(deleted), 0)
             FROM listings
             WHERE publisher IS NOT NULL
             GROUP BY publisher
             ORDER BY publisher",
        )?;

        let stats = stmt
            .query_map([], |row| {
                Ok(PublisherStats {
                    publisher: row.get(0)?,
                    total: row.get::<_, i64>(1)? as u64,
                    pending: row.get::<_, i64>(2)? as u64,
                    detailed: row.get::<_, i64>(3)? as u64,
                    deleted: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stats)
    }
}

/// Formats a timestamp in the fixed-width, lexically sortable stored form
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_ts(idx, &raw)).transpose()
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<ListingRecord> {
    let proposal: Option<String> = row.get(3)?;
    let property_kind: Option<String> = row.get(4)?;
    let created_at: String = row.get(24)?;
    let updated_at: String = row.get(25)?;

    Ok(ListingRecord {
        url: row.get(0)?,
        publisher: row.get(1)?,
        search_url: row.get(2)?,
        proposal: proposal.as_deref().and_then(Proposal::from_db_string),
        property_kind: property_kind.as_deref().and_then(PropertyKind::from_db_string),
        address: row.get(5)?,
        price: row.get(6)?,
        condo_fee: row.get(7)?,
        property_tax: row.get(8)?,
        bedrooms: row.get(9)?,
        suites: row.get(10)?,
        bathrooms: row.get(11)?,
        parking_spaces: row.get(12)?,
        area: row.get(13)?,
        thumbnail: row.get(14)?,
        description: row.get(15)?,
        broker: row.get(16)?,
        floor: row.get(17)?,
        balcony: row.get(18)?,
        published_at: parse_opt_ts(19, row.get(19)?)?,
        site_updated_at: parse_opt_ts(20, row.get(20)?)?,
        preview: row.get(21)?,
        to_inspect: row.get(22)?,
        deleted: row.get(23)?,
        created_at: parse_ts(24, &created_at)?,
        updated_at: parse_ts(25, &updated_at)?,
    })
}

fn write_record(conn: &Connection, record: &ListingRecord) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO listings ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
             ON CONFLICT(url) DO UPDATE SET
                publisher = excluded.publisher,
                search_url = excluded.search_url,
                proposal = excluded.proposal,
                property_kind = excluded.property_kind,
                address = excluded.address,
                price = excluded.price,
                condo_fee = excluded.condo_fee,
                property_tax = excluded.property_tax,
                bedrooms = excluded.bedrooms,
                suites = excluded.suites,
                bathrooms = excluded.bathrooms,
                parking_spaces = excluded.parking_spaces,
                area = excluded.area,
                thumbnail = excluded.thumbnail,
                description = excluded.description,
                broker = excluded.broker,
                floor = excluded.floor,
                balcony = excluded.balcony,
                published_at = excluded.published_at,
                site_updated_at = excluded.site_updated_at,
                preview = excluded.preview,
                to_inspect = excluded.to_inspect,
                deleted = excluded.deleted,
                updated_at = excluded.updated_at"
        ),
        params![
            record.url,
            record.publisher,
            record.search_url,
            record.proposal.map(|p| p.to_db_string()),
            record.property_kind.map(|k| k.to_db_string()),
            record.address,
            record.price,
            record.condo_fee,
            record.property_tax,
            record.bedrooms,
            record.suites,
            record.bathrooms,
            record.parking_spaces,
            record.area,
            record.thumbnail,
            record.description,
            record.broker,
            record.floor,
            record.balcony,
            record.published_at.map(fmt_ts),
            record.site_updated_at.map(fmt_ts),
            record.preview,
            record.to_inspect,
            record.deleted,
            fmt_ts(record.created_at),
            fmt_ts(record.updated_at),
        ],
    )?;
    Ok(())
}
