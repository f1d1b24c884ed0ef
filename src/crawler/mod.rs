//! Crawler module for fetching and processing catalog pages
//!
//! This module contains the core crawl logic, including:
//! - HTTP fetching with transient/permanent error classification
//! - HTML extraction of listing references and item fields
//! - The orchestrator that turns tasks into fetches, records and new tasks

mod fetcher;
mod orchestrator;
mod parser;

pub use fetcher::{build_http_client, user_agent_string, Document, FetchError, Fetcher, HttpFetcher};
pub use orchestrator::{ItemOutcome, Orchestrator, PageOutcome, RegionOutcome};
pub use parser::{
    max_page_number, pager_form_params, process_string, split_address, AddressParts,
    ExtractError, ExtractedItem, Extractor, HtmlExtractor, NEXT_UPDATE_LABEL,
};
