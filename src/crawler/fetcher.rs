//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the mirror, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing and item pages
//! - The pager-count POST that tells how many listing pages a sweep has
//! - Error classification into transient and permanent failures

use crate::config::{FetcherConfig, SiteConfig, UserAgentConfig};
use crate::crawler::parser::{max_page_number, pager_form_params};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// A fetch failure, classified by whether retrying later could help
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeouts, connection failures, HTTP 429 and 5xx
    #[error("transient failure fetching {url}: {message}")]
    Transient { url: String, message: String },

    /// Any other failure; the target or the request is wrong
    #[error("permanent failure fetching {url}: {message}")]
    Permanent { url: String, message: String },
}

impl FetchError {
    pub fn transient(url: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(url: &str, message: impl Into<String>) -> Self {
        Self::Permanent {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The URL that was requested
    pub url: String,

    /// Final URL after redirects
    pub final_url: String,

    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    /// Builds a document fetched from `url` with status 200 (for tests and fakes)
    pub fn new(url: &str, body: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Source of documents
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one page
    async fn fetch(&self, url: &str) -> Result<Document, FetchError>;

    /// Returns how many result pages the listing at `listing_url` has
    async fn fetch_page_count(&self, listing_url: &str) -> Result<u32, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `fetcher` - Timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use ielove_mirror::config::{FetcherConfig, UserAgentConfig};
/// use ielove_mirror::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "IeloveMirror".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(user_agent))
        .timeout(Duration::from_secs(fetcher.timeout_secs))
        .connect_timeout(Duration::from_secs(fetcher.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Formats `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// reqwest-backed [`Fetcher`]
pub struct HttpFetcher {
    client: Client,
    page_count_endpoint: String,
}

impl HttpFetcher {
    pub fn new(client: Client, page_count_endpoint: impl Into<String>) -> Self {
        Self {
            client,
            page_count_endpoint: page_count_endpoint.into(),
        }
    }

    /// Builds a fetcher from the site, user agent and fetcher sections
    pub fn from_config(
        site: &SiteConfig,
        user_agent: &UserAgentConfig,
        fetcher: &FetcherConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, fetcher)?;
        Ok(Self::new(client, site.page_count_endpoint()))
    }

    async fn read_body(url: &str, response: Response) -> Result<(String, u16, String), FetchError> {
        let status = response.status();
        let final_url = response.url().to_string();

        if let Some(err) = classify_status(url, status) {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;
        Ok((final_url, status.as_u16(), body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;

        let (final_url, status, body) = Self::read_body(url, response).await?;
        Ok(Document {
            url: url.to_string(),
            final_url,
            status,
            body,
            fetched_at: Utc::now(),
        })
    }

    async fn fetch_page_count(&self, listing_url: &str) -> Result<u32, FetchError> {
        let listing = self.fetch(listing_url).await?;
        let params = pager_form_params(&listing.body)
            .ok_or_else(|| FetchError::permanent(listing_url, "no pager form on listing page"))?;

        let endpoint = self.page_count_endpoint.as_str();
        tracing::debug!("POST {}", endpoint);
        let response = self
            .client
            .post(endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(endpoint, &e))?;
        let (_, _, body) = Self::read_body(endpoint, response).await?;

        let reply: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::permanent(endpoint, format!("pager reply is not JSON: {}", e)))?;
        let pager = reply
            .get("pcPager")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FetchError::permanent(endpoint, "pager reply has no pcPager"))?;

        max_page_number(pager)
            .ok_or_else(|| FetchError::permanent(endpoint, "pager shows no page numbers"))
    }
}

/// Maps a non-success status to a fetch error
fn classify_status(url: &str, status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let message = format!("HTTP {}", status.as_u16());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(FetchError::transient(url, message))
    } else {
        Some(FetchError::permanent(url, message))
    }
}

fn classify_reqwest_error(url: &str, e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::transient(url, "request timeout")
    } else if e.is_connect() {
        FetchError::transient(url, format!("connection failed: {}", e))
    } else if e.is_body() || e.is_decode() {
        FetchError::transient(url, format!("body read failed: {}", e))
    } else {
        FetchError::permanent(url, e.to_string())
    }
}
