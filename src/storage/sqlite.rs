//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DocumentStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DocumentStore, StorageError, StorageResult};
use crate::storage::{ItemRecord, ItemRef, PageDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite document store backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the store at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn to_db_time(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_db_time(ms: i64) -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::Serialization(format!("timestamp out of range: {}", ms)))
}

/// Raw column values of an `items` row, decoded outside the rusqlite closure
struct ItemRow {
    key: String,
    category: String,
    url: String,
    fetched_at: i64,
    next_eligible_at: i64,
    fields: String,
}

impl ItemRow {
    fn decode(self) -> StorageResult<ItemRecord> {
        let fields: Map<String, Value> = serde_json::from_str(&self.fields)?;
        Ok(ItemRecord {
            key: self.key,
            category: self.category,
            url: self.url,
            fetched_at: from_db_time(self.fetched_at)?,
            next_eligible_at: from_db_time(self.next_eligible_at)?,
            fields,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    // ===== Items =====

    async fn upsert_item(&self, record: &ItemRecord) -> StorageResult<()> {
        let fields = serde_json::to_string(&record.fields)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO items (key, category, url, fetched_at, next_eligible_at, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
                category = excluded.category,
                url = excluded.url,
                fetched_at = excluded.fetched_at,
                next_eligible_at = excluded.next_eligible_at,
                fields = excluded.fields",
            params![
                record.key,
                record.category,
                record.url,
                to_db_time(&record.fetched_at),
                to_db_time(&record.next_eligible_at),
                fields
            ],
        )?;
        Ok(())
    }

    async fn find_item(&self, key: &str) -> StorageResult<Option<ItemRecord>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT key, category, url, fetched_at, next_eligible_at, fields
                 FROM items WHERE key = ?1",
                params![key],
                |row| {
                    Ok(ItemRow {
                        key: row.get(0)?,
                        category: row.get(1)?,
                        url: row.get(2)?,
                        fetched_at: row.get(3)?,
                        next_eligible_at: row.get(4)?,
                        fields: row.get(5)?,
                    })
                },
            )
            .optional()?
        };

        row.map(ItemRow::decode).transpose()
    }

    async fn count_items(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Page descriptors =====

    async fn upsert_page(&self, page: &PageDescriptor) -> StorageResult<()> {
        let items = serde_json::to_string(&page.items)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pages (category, region, page_index, fetched_at, items)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(category, region, page_index) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                items = excluded.items",
            params![
                page.category,
                page.region,
                page.page_index,
                to_db_time(&page.fetched_at),
                items
            ],
        )?;
        Ok(())
    }

    async fn find_page(
        &self,
        category: &str,
        region: &str,
        page_index: u32,
    ) -> StorageResult<Option<PageDescriptor>> {
        let row: Option<(i64, String)> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT fetched_at, items FROM pages
                 WHERE category = ?1 AND region = ?2 AND page_index = ?3",
                params![category, region, page_index],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        match row {
            Some((fetched_at, items)) => {
                let items: Vec<ItemRef> = serde_json::from_str(&items)?;
                Ok(Some(PageDescriptor {
                    category: category.to_string(),
                    region: region.to_string(),
                    page_index,
                    fetched_at: from_db_time(fetched_at)?,
                    items,
                }))
            }
            None => Ok(None),
        }
    }
}
