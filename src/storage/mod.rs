//! Storage module for the mirrored documents
//!
//! This module handles all database operations for the mirror, including:
//! - SQLite database initialization and schema management
//! - Item records, keyed by item key, replaced wholesale on every fetch
//! - Page descriptors, keyed by `(category, region, page_index)`

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{DocumentStore, StorageError, StorageResult};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::path::Path;

/// Name of the field carrying the source-reported next update date
pub const NEXT_UPDATE_FIELD: &str = "next_update";

/// UTC offset of the dates published by the site (JST)
const SITE_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Opens or creates the document store at `path`
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// A mirrored listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub key: String,
    pub category: String,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub next_eligible_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl ItemRecord {
    /// Parses the hinted next-update date out of `fields`
    ///
    /// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates, taken as
    /// midnight in the site's timezone (JST). Anything else counts as no hint.
    pub fn next_update_hint(&self) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(NEXT_UPDATE_FIELD)?.as_str()?.trim();

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }

        let site_tz = FixedOffset::east_opt(SITE_UTC_OFFSET_SECS)?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_local_timezone(site_tz)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A reference to an item as listed on a result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub key: String,
    pub category: String,
    pub url: String,
}

/// What one listing page contained at its last successful fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub category: String,
    pub region: String,
    pub page_index: u32,
    pub fetched_at: DateTime<Utc>,
    pub items: Vec<ItemRef>,
}
