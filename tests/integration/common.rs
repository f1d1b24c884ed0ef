//! Shared fixtures for the integration tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ielove_mirror::clock::ManualClock;
use ielove_mirror::crawler::{Document, FetchError, Fetcher, HtmlExtractor, Orchestrator};
use ielove_mirror::queue::SqliteTaskQueue;
use ielove_mirror::storage::{DocumentStore, SqliteStore, StorageError, StorageResult};
use ielove_mirror::{ItemRecord, PageDescriptor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const BASE: &str = "https://www.ielove.co.jp";

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, 0, 0, 0).unwrap()
}

pub fn item_url(key: &str) -> String {
    format!("{}/chintai/{}/", BASE, key)
}

pub fn listing_page_url(page_index: u32) -> String {
    if page_index > 1 {
        format!("{}/chintai/tokyo/result/?pg={}", BASE, page_index)
    } else {
        format!("{}/chintai/tokyo/result/", BASE)
    }
}

/// A result page listing the given item keys
pub fn listing_html(keys: &[&str]) -> String {
    let links: String = keys
        .iter()
        .map(|k| {
            format!(
                r#"<a class="result-panel-room__inner" href="/chintai/{}/">{}</a>"#,
                k, k
            )
        })
        .collect();
    format!("<html><body><div>{}</div></body></html>", links)
}

/// An item page with a rent detail and, optionally, a next-update date
pub fn item_html(name: &str, rent: u32, next_update: Option<&str>) -> String {
    let hint = next_update
        .map(|d| {
            format!(
                r#"<dt class="detail-bkninfo__head">次回更新予定日</dt><dd class="detail-bkninfo__txt">{}</dd>"#,
                d
            )
        })
        .unwrap_or_default();
    format!(
        r#"<html><body>
        <h1 class="detail-summary__tatemononame">{}</h1>
        <div class="detail-bkninfo__block"><dl>
          <dt class="detail-bkninfo__head">賃料</dt><dd class="detail-bkninfo__txt">{}</dd>
          {}
        </dl></div>
        </body></html>"#,
        name, rent, hint
    )
}

/// Fetcher serving canned bodies and failures by URL
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, Result<String, FetchError>>>,
    page_count: Mutex<Result<u32, FetchError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            page_count: Mutex::new(Ok(1)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.pages.lock().unwrap().insert(url.to_string(), Err(error));
    }

    pub fn set_page_count(&self, count: Result<u32, FetchError>) {
        *self.page_count.lock().unwrap() = count;
    }

    /// URLs fetched so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(Document::new(url, body.clone())),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::permanent(url, "HTTP 404")),
        }
    }

    async fn fetch_page_count(&self, listing_url: &str) -> Result<u32, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("count:{}", listing_url));
        self.page_count.lock().unwrap().clone()
    }
}

/// An orchestrator wired to fakes, in-memory storage and a manual clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub fetcher: Arc<FakeFetcher>,
    pub store: Arc<SqliteStore>,
    pub queue: Arc<SqliteTaskQueue>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let fetcher = Arc::new(FakeFetcher::new());
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let queue = Arc::new(SqliteTaskQueue::new_in_memory().unwrap());
        let orchestrator = Orchestrator::new(
            fetcher.clone(),
            Arc::new(HtmlExtractor::new(BASE)),
            store.clone(),
            queue.clone(),
            BASE,
        )
        .with_clock(clock.clone());

        Self {
            clock,
            fetcher,
            store,
            queue,
            orchestrator,
        }
    }
}

/// Store whose item lookups fail for the given keys
pub struct UnreadableStore {
    inner: SqliteStore,
    unreadable: Vec<String>,
}

impl UnreadableStore {
    pub fn new(unreadable: &[&str]) -> Self {
        Self {
            inner: SqliteStore::new_in_memory().unwrap(),
            unreadable: unreadable.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DocumentStore for UnreadableStore {
    async fn upsert_item(&self, record: &ItemRecord) -> StorageResult<()> {
        self.inner.upsert_item(record).await
    }

    async fn find_item(&self, key: &str) -> StorageResult<Option<ItemRecord>> {
        if self.unreadable.iter().any(|k| k == key) {
            return Err(StorageError::Serialization(format!("corrupt row for {}", key)));
        }
        self.inner.find_item(key).await
    }

    async fn count_items(&self) -> StorageResult<u64> {
        self.inner.count_items().await
    }

    async fn upsert_page(&self, page: &PageDescriptor) -> StorageResult<()> {
        self.inner.upsert_page(page).await
    }

    async fn find_page(
        &self,
        category: &str,
        region: &str,
        page_index: u32,
    ) -> StorageResult<Option<PageDescriptor>> {
        self.inner.find_page(category, region, page_index).await
    }
}
