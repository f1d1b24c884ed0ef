//! Database schema definitions
//!
//! This module contains the SQL schema for the document store.

/// SQL schema for the document store
pub const SCHEMA_SQL: &str = r#"
-- One row per item key; rows are replaced, never merged
-- Times are Unix epoch milliseconds
CREATE TABLE IF NOT EXISTS items (
    key TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    url TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    next_eligible_at INTEGER NOT NULL,
    fields TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
CREATE INDEX IF NOT EXISTS idx_items_next_eligible ON items(next_eligible_at);

-- One row per listing page
CREATE TABLE IF NOT EXISTS pages (
    category TEXT NOT NULL,
    region TEXT NOT NULL,
    page_index INTEGER NOT NULL,
    fetched_at INTEGER NOT NULL,
    items TEXT NOT NULL,
    PRIMARY KEY (category, region, page_index)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
