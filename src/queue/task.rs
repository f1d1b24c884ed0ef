use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of crawl work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    ScrapeRegion,
    ScrapePage,
    ScrapeItem,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [Self::ScrapeRegion, Self::ScrapePage, Self::ScrapeItem];

    /// Converts the kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ScrapeRegion => "scrape_region",
            Self::ScrapePage => "scrape_page",
            Self::ScrapeItem => "scrape_item",
        }
    }

    /// Parses a kind from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scrape_region" => Some(Self::ScrapeRegion),
            "scrape_page" => Some(Self::ScrapePage),
            "scrape_item" => Some(Self::ScrapeItem),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A unit of crawl work together with its target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Bounded sweep of one category in one region
    ScrapeRegion {
        region: String,
        category: String,
        limit: u32,
    },

    /// One listing page of a sweep
    ScrapePage {
        category: String,
        region: String,
        page_index: u32,
    },

    /// One item, fetched now and then perpetually rescheduled
    ScrapeItem { url: String },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::ScrapeRegion { .. } => TaskKind::ScrapeRegion,
            Self::ScrapePage { .. } => TaskKind::ScrapePage,
            Self::ScrapeItem { .. } => TaskKind::ScrapeItem,
        }
    }

    pub fn scrape_region(region: &str, category: &str, limit: u32) -> Self {
        Self::ScrapeRegion {
            region: region.to_string(),
            category: category.to_string(),
            limit,
        }
    }

    pub fn scrape_page(category: &str, region: &str, page_index: u32) -> Self {
        Self::ScrapePage {
            category: category.to_string(),
            region: region.to_string(),
            page_index,
        }
    }

    pub fn scrape_item(url: &str) -> Self {
        Self::ScrapeItem {
            url: url.to_string(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScrapeRegion {
                region,
                category,
                limit,
            } => write!(f, "scrape_region({}/{}, limit={})", category, region, limit),
            Self::ScrapePage {
                category,
                region,
                page_index,
            } => write!(f, "scrape_page({}/{}#{})", category, region, page_index),
            Self::ScrapeItem { url } => write!(f, "scrape_item({})", url),
        }
    }
}

/// A task handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Queue row id, used to acknowledge the delivery
    pub id: i64,
    pub task: Task,
    pub not_before: DateTime<Utc>,
    /// How many times this task has been handed out, this delivery included
    pub attempts: u32,
}
