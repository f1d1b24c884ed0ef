//! Configuration module for ielove-mirror
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and carries the built-in region/category tables.
//!
//! # Example
//!
//! ```no_run
//! use ielove_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Workers: {}", config.queue.workers);
//! ```

mod catalog;
mod parser;
mod types;
mod validation;

// Re-export types
pub use catalog::{Catalog, CATEGORIES, REGIONS};
pub use types::{
    CatalogConfig, Config, FetcherConfig, QueueConfig, RateLimitConfig, SiteConfig,
    StalenessConfig, StorageConfig, UserAgentConfig, MAX_STALENESS_DAYS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
