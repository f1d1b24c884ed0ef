//! URL handling module for ielove-mirror
//!
//! This module provides item URL normalization, item key derivation, and
//! construction of listing (result page) URLs.

mod key;
mod listing;
mod normalize;

// Re-export main functions
pub use key::{item_category, item_key};
pub use listing::{listing_url, resolve_href};
pub use normalize::normalize_item_url;
