//! Crawl orchestration
//!
//! The orchestrator owns the three task handlers. A region sweep fans out
//! into listing pages, a listing page fans out into the items that need a
//! fetch, and every successful item fetch schedules its own next refresh.
//! All shared state lives in the document store and the task queue.

use crate::clock::{Clock, SystemClock};
use crate::config::{Catalog, Config};
use crate::crawler::{Extractor, Fetcher, HtmlExtractor, HttpFetcher};
use crate::policy::{ItemState, StalenessPolicy};
use crate::queue::{Task, TaskHandler, TaskQueue};
use crate::storage::{DocumentStore, ItemRecord, PageDescriptor};
use crate::url::{item_key, listing_url};
use crate::{MirrorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// What a region sweep did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOutcome {
    /// Page count reported by the site, if the query succeeded
    pub page_count: Option<u32>,

    /// Number of ScrapePage tasks enqueued
    pub pages_enqueued: u32,
}

/// What a listing page fetch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutcome {
    /// Item references found on the page
    pub items_seen: usize,

    /// ScrapeItem tasks enqueued for unseen or stale items
    pub items_enqueued: usize,
}

/// What an item task did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The stored record was still fresh; nothing fetched or enqueued
    Skipped { key: String, next_eligible_at: DateTime<Utc> },

    /// The item was fetched, stored and rescheduled
    Fetched { key: String, next_eligible_at: DateTime<Utc> },
}

/// Runs the crawl task handlers against injected collaborators
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    policy: StalenessPolicy,
    catalog: Catalog,
    base_url: String,
}

impl Orchestrator {
    /// Creates an orchestrator with the system clock, default staleness
    /// policy and the built-in catalog
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn TaskQueue>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            store,
            queue,
            clock: Arc::new(SystemClock),
            policy: StalenessPolicy::default(),
            catalog: Catalog::default(),
            base_url: base_url.into(),
        }
    }

    /// Wires the HTTP fetcher, HTML extractor, policy and catalog from a config
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded and validated configuration
    /// * `store` - Document store to mirror into
    /// * `queue` - Queue new tasks are enqueued on
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to handle tasks
    /// * `Err(MirrorError)` - HTTP client could not be built
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self> {
        let fetcher = HttpFetcher::from_config(&config.site, &config.user_agent, &config.fetcher)?;
        let extractor = HtmlExtractor::new(config.site.base_url.clone());

        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(extractor),
            store,
            queue,
            config.site.base_url.clone(),
        )
        .with_policy(StalenessPolicy::from_config(&config.staleness))
        .with_catalog(Catalog::new(&config.catalog)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Classifies an item key against the store at the current time
    pub async fn item_state(&self, key: &str) -> Result<ItemState> {
        let record = self.store.find_item(key).await?;
        Ok(self.policy.item_state(record.as_ref(), self.clock.now()))
    }

    /// True if the key has never been fetched or its record has gone stale
    pub async fn should_fetch(&self, key: &str) -> Result<bool> {
        Ok(self.item_state(key).await?.should_fetch())
    }

    /// Enqueues one ScrapeRegion task per selected (region, category) pair
    ///
    /// `None` selects every catalog entry for that axis.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of tasks enqueued
    /// * `Err(MirrorError::UnknownTarget)` - Region or category not in the catalog
    pub async fn sweep(
        &self,
        region: Option<&str>,
        category: Option<&str>,
        limit: u32,
    ) -> Result<usize> {
        if let Some(region) = region {
            self.check_region(region)?;
        }
        if let Some(category) = category {
            self.check_category(category)?;
        }

        let now = self.clock.now();
        let targets = self.catalog.targets(region, category);
        for (region, category) in &targets {
            self.queue
                .enqueue(Task::scrape_region(region, category, limit), now)
                .await?;
        }

        tracing::info!(tasks = targets.len(), limit, "Enqueued region sweeps");
        Ok(targets.len())
    }

    /// Fans a region sweep out into listing page tasks
    ///
    /// Enqueues pages `1..=min(page_count, limit)`; if the page count cannot
    /// be queried, pages `1..=limit`.
    pub async fn scrape_region(
        &self,
        region: &str,
        category: &str,
        limit: u32,
    ) -> Result<RegionOutcome> {
        self.check_region(region)?;
        self.check_category(category)?;

        let first_page = listing_url(&self.base_url, category, region, 1)?;
        let page_count = match self.fetcher.fetch_page_count(&first_page).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(
                    region,
                    category,
                    "Page count query failed, sweeping {} pages: {}",
                    limit,
                    e
                );
                None
            }
        };

        let pages = page_count.map_or(limit, |count| count.min(limit));
        let now = self.clock.now();
        for page_index in 1..=pages {
            self.queue
                .enqueue(Task::scrape_page(category, region, page_index), now)
                .await?;
        }

        Ok(RegionOutcome {
            page_count,
            pages_enqueued: pages,
        })
    }

    /// Records one listing page and enqueues the items that need a fetch
    pub async fn scrape_page(
        &self,
        category: &str,
        region: &str,
        page_index: u32,
    ) -> Result<PageOutcome> {
        self.check_region(region)?;
        self.check_category(category)?;

        let url = listing_url(&self.base_url, category, region, page_index)?;
        let document = self.fetcher.fetch(&url).await?;
        let items = self.extractor.extract_page(&document)?;

        let now = self.clock.now();
        self.store
            .upsert_page(&PageDescriptor {
                category: category.to_string(),
                region: region.to_string(),
                page_index,
                fetched_at: now,
                items: items.clone(),
            })
            .await?;

        let mut enqueued = 0;
        for item in &items {
            let record = match self.store.find_item(&item.key).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(
                        key = %item.key,
                        "Failed to look up item, not enqueued: {}",
                        e
                    );
                    continue;
                }
            };
            if !self.policy.should_fetch(record.as_ref(), now) {
                tracing::trace!(key = %item.key, "Item fresh, not enqueued");
                continue;
            }
            self.queue.enqueue(Task::scrape_item(&item.url), now).await?;
            enqueued += 1;
        }

        Ok(PageOutcome {
            items_seen: items.len(),
            items_enqueued: enqueued,
        })
    }

    /// Fetches one item if it needs it, stores it and schedules its refresh
    ///
    /// A fresh record makes this a no-op, which also ends any duplicate
    /// refresh chain for the key. A failure at any step leaves the store
    /// and the queue untouched.
    pub async fn scrape_item(&self, url: &str) -> Result<ItemOutcome> {
        let key = item_key(url)?;

        let existing = self.store.find_item(&key).await?;
        if !self.policy.should_fetch(existing.as_ref(), self.clock.now()) {
            let next_eligible_at = existing
                .map(|r| r.next_eligible_at)
                .unwrap_or_else(|| self.clock.now());
            return Ok(ItemOutcome::Skipped {
                key,
                next_eligible_at,
            });
        }

        let document = self.fetcher.fetch(url).await?;
        let item = self.extractor.extract_item(&document)?;

        let now = self.clock.now();
        let mut record = ItemRecord {
            key: item.key,
            category: item.category,
            url: item.url,
            fetched_at: now,
            next_eligible_at: now,
            fields: item.fields,
        };
        record.next_eligible_at = self.policy.next_eligible_for(&record, now);

        self.store.upsert_item(&record).await?;
        self.queue
            .enqueue(Task::scrape_item(&record.url), record.next_eligible_at)
            .await?;

        Ok(ItemOutcome::Fetched {
            key: record.key,
            next_eligible_at: record.next_eligible_at,
        })
    }

    fn check_region(&self, region: &str) -> Result<()> {
        if self.catalog.has_region(region) {
            Ok(())
        } else {
            Err(MirrorError::UnknownTarget {
                kind: "region",
                value: region.to_string(),
            })
        }
    }

    fn check_category(&self, category: &str) -> Result<()> {
        if self.catalog.has_category(category) {
            Ok(())
        } else {
            Err(MirrorError::UnknownTarget {
                kind: "category",
                value: category.to_string(),
            })
        }
    }
}

/// Logs a handler failure at the level its kind deserves
fn log_failure(task: &Task, error: &MirrorError) {
    match error {
        MirrorError::Fetch(e) if e.is_transient() => {
            tracing::warn!(task = %task, "Transient failure, task abandoned: {}", e);
        }
        MirrorError::Fetch(e) => {
            tracing::error!(task = %task, "Permanent fetch failure: {}", e);
        }
        MirrorError::Extract(e) => {
            tracing::error!(task = %task, "Extraction failed: {}", e);
        }
        other => {
            tracing::error!(task = %task, "Task failed: {}", other);
        }
    }
}

#[async_trait]
impl TaskHandler for Orchestrator {
    async fn handle(&self, task: Task) {
        let result = match &task {
            Task::ScrapeRegion {
                region,
                category,
                limit,
            } => self
                .scrape_region(region, category, *limit)
                .await
                .map(|outcome| {
                    tracing::info!(
                        region = %region,
                        category = %category,
                        page_count = ?outcome.page_count,
                        pages = outcome.pages_enqueued,
                        "Region sweep fanned out"
                    );
                }),
            Task::ScrapePage {
                category,
                region,
                page_index,
            } => self
                .scrape_page(category, region, *page_index)
                .await
                .map(|outcome| {
                    tracing::info!(
                        region = %region,
                        category = %category,
                        page_index,
                        items = outcome.items_seen,
                        enqueued = outcome.items_enqueued,
                        "Listing page scraped"
                    );
                }),
            Task::ScrapeItem { url } => self.scrape_item(url).await.map(|outcome| match outcome {
                ItemOutcome::Skipped {
                    key,
                    next_eligible_at,
                } => {
                    tracing::debug!(key = %key, url = %url, %next_eligible_at, "Item still fresh, skipped");
                }
                ItemOutcome::Fetched {
                    key,
                    next_eligible_at,
                } => {
                    tracing::info!(key = %key, url = %url, %next_eligible_at, "Item mirrored");
                }
            }),
        };

        if let Err(e) = result {
            log_failure(&task, &e);
        }
    }
}
