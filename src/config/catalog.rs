//! Built-in catalog tables
//!
//! The set of crawlable regions and property categories is data, not logic.
//! These tables are the defaults; a config file may replace either list.

use crate::config::types::CatalogConfig;

/// Every prefecture slug the catalog serves
pub const REGIONS: &[&str] = &[
    "aichi",
    "akita",
    "aomori",
    "chiba",
    "ehime",
    "fukui",
    "fukuoka",
    "fukushima",
    "gifu",
    "gunma",
    "hiroshima",
    "hokkaido",
    "hyogo",
    "ibaraki",
    "ishikawa",
    "iwate",
    "kagawa",
    "kagoshima",
    "kanagawa",
    "kochi",
    "kumamoto",
    "kyoto",
    "mie",
    "miyagi",
    "miyazaki",
    "nagano",
    "nagasaki",
    "nara",
    "niigata",
    "oita",
    "okayama",
    "osaka",
    "saga",
    "saitama",
    "shiga",
    "shimane",
    "shizuoka",
    "tochigi",
    "tokushima",
    "tokyo",
    "tottori",
    "toyama",
    "wakayama",
    "yamagata",
    "yamaguchi",
    "yamanashi",
];

/// Every property category slug the catalog serves
pub const CATEGORIES: &[&str] = &[
    "chintai",
    "kodate_chuko",
    "kodate_shinchiku",
    "mansion_chuko",
    "mansion_shinchiku",
    "tochi",
];

pub(crate) fn default_regions() -> Vec<String> {
    REGIONS.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn default_categories() -> Vec<String> {
    CATEGORIES.iter().map(|s| s.to_string()).collect()
}

/// Lookup view over the configured catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    regions: Vec<String>,
    categories: Vec<String>,
}

impl Catalog {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            regions: config.regions.clone(),
            categories: config.categories.clone(),
        }
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Expands optional filters into concrete `(region, category)` pairs
    ///
    /// `None` means every entry of that table. Unknown names are returned
    /// unchanged so the caller can report them.
    pub fn targets(&self, region: Option<&str>, category: Option<&str>) -> Vec<(String, String)> {
        let regions: Vec<String> = match region {
            Some(r) => vec![r.to_string()],
            None => self.regions.clone(),
        };
        let categories: Vec<String> = match category {
            Some(c) => vec![c.to_string()],
            None => self.categories.clone(),
        };

        regions
            .iter()
            .flat_map(|r| categories.iter().map(move |c| (r.clone(), c.clone())))
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(&CatalogConfig::default())
    }
}
