//! ielove-mirror: a self-refreshing mirror of a paginated listing catalog
//!
//! This crate keeps a local document store of ielove listings fresh without
//! hammering the origin site. A region sweep fans out into listing pages,
//! listing pages fan out into item fetches, and every successful item fetch
//! re-enqueues itself for the moment the record goes stale.

pub mod clock;
pub mod config;
pub mod crawler;
pub mod policy;
pub mod queue;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for ielove-mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extract error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unknown {kind} '{value}' (not in catalog)")]
    UnknownTarget { kind: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("URL has no item key: {0}")]
    MissingKey(String),
}

/// Result type alias for ielove-mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use crawler::Orchestrator;
pub use policy::{ItemState, StalenessPolicy};
pub use queue::{Task, TaskKind};
pub use storage::{ItemRecord, ItemRef, PageDescriptor};
pub use url::item_key;
