//! Storage traits and error types
//!
//! This module defines the trait interface for document store backends and
//! associated error types.

use crate::storage::{ItemRecord, PageDescriptor};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Document store used by the crawl orchestrator
///
/// Writes are full replacements keyed by identity; there is no partial
/// update. Implementations must tolerate concurrent callers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ===== Items =====

    /// Creates or replaces the record stored under `record.key`
    async fn upsert_item(&self, record: &ItemRecord) -> StorageResult<()>;

    /// Point lookup by item key
    async fn find_item(&self, key: &str) -> StorageResult<Option<ItemRecord>>;

    /// Number of stored items
    async fn count_items(&self) -> StorageResult<u64>;

    // ===== Page descriptors =====

    /// Creates or replaces the descriptor for its `(category, region, page_index)`
    async fn upsert_page(&self, page: &PageDescriptor) -> StorageResult<()>;

    /// Lookup by composite key
    async fn find_page(
        &self,
        category: &str,
        region: &str,
        page_index: u32,
    ) -> StorageResult<Option<PageDescriptor>>;
}
