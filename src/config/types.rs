use crate::config::catalog::{default_categories, default_regions};
use serde::Deserialize;

/// Main configuration structure for ielove-mirror
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Origin site addresses
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Root of the catalog, e.g. `https://www.ielove.co.jp`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Endpoint answering the pager-count POST
    ///
    /// Defaults to `{base-url}/bkn/ajax/count/` when absent.
    #[serde(rename = "page-count-endpoint", default)]
    pub page_count_endpoint: Option<String>,
}

impl SiteConfig {
    /// Returns the pager-count endpoint, deriving it from the base URL if unset
    pub fn page_count_endpoint(&self) -> String {
        match &self.page_count_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}/bkn/ajax/count/", self.base_url.trim_end_matches('/')),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP client timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Document store location
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding items and page descriptors
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Task queue and worker pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite database holding pending tasks
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// How long an idle worker sleeps before polling again (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lease length of a claimed task before it becomes visible again
    #[serde(rename = "visibility-timeout-secs", default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Deliveries without an ack after which a task is dropped
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Page limit used by `sweep` when none is given
    #[serde(rename = "default-limit", default = "default_limit")]
    pub default_limit: u32,

    /// Per-kind dispatch rates
    #[serde(rename = "rate-limits", default)]
    pub rate_limits: RateLimitConfig,
}

fn default_workers() -> u32 {
    4
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_limit() -> u32 {
    50
}

/// Dispatch rates per task kind, written as `N/s`, `N/m` or `N/h`
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(rename = "scrape-region", default = "default_region_rate")]
    pub scrape_region: String,

    #[serde(rename = "scrape-page", default = "default_page_rate")]
    pub scrape_page: String,

    #[serde(rename = "scrape-item", default = "default_item_rate")]
    pub scrape_item: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scrape_region: default_region_rate(),
            scrape_page: default_page_rate(),
            scrape_item: default_item_rate(),
        }
    }
}

fn default_region_rate() -> String {
    "1/m".to_string()
}

fn default_page_rate() -> String {
    "20/m".to_string()
}

fn default_item_rate() -> String {
    "20/m".to_string()
}

/// Longest staleness window accepted in the config, in days
pub const MAX_STALENESS_DAYS: i64 = 36_500;

/// Staleness windows, in days
#[derive(Debug, Clone, Deserialize)]
pub struct StalenessConfig {
    /// Refresh floor applied when no usable hint exists
    #[serde(rename = "refresh-after-days", default = "default_refresh_after_days")]
    pub refresh_after_days: i64,

    /// Grace added to a hinted next-update date
    #[serde(rename = "hint-grace-days", default = "default_hint_grace_days")]
    pub hint_grace_days: i64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            refresh_after_days: default_refresh_after_days(),
            hint_grace_days: default_hint_grace_days(),
        }
    }
}

fn default_refresh_after_days() -> i64 {
    30
}

fn default_hint_grace_days() -> i64 {
    1
}

/// Valid regions and categories
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            categories: default_categories(),
        }
    }
}
