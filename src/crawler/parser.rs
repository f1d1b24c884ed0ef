//! HTML extraction for listing and item pages
//!
//! This module turns fetched documents into data:
//! - Item references from a listing (result) page
//! - Item fields from an item page, with source text normalised
//! - Pager parameters and page counts for region sweeps

use crate::crawler::Document;
use crate::storage::{ItemRef, NEXT_UPDATE_FIELD};
use crate::url::{item_category, item_key, normalize_item_url, resolve_href};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Detail label carrying the source's next scheduled update
pub const NEXT_UPDATE_LABEL: &str = "次回更新予定日";

/// Detail label carrying the postal address
const ADDRESS_LABEL: &str = "住所";

/// Marker in the alt text of the floor-plan thumbnail
const FLOOR_PLAN_ALT: &str = "間取り";

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+$").expect("valid regex"));
static JAPANESE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*年(\d+)\s*月(\d+)\s*日").expect("valid regex")
});
static MAP_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"q=(\d+\.\d+),(\d+\.\d+)(?:&|$)").expect("valid regex"));
static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+[都道府県])?\s*(\w+[市町村])?\s*(\w+[区])?\s*(.*?)\s*(?:地図)?$")
        .expect("valid regex")
});

static ITEM_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result-panel-room__inner[href]").expect("valid selector"));
static TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1.detail-summary__tatemononame").expect("valid selector"));
static SALESPOINT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p.detail-salespoint__txt").expect("valid selector"));
static DETAIL_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.detail-bkninfo__block").expect("valid selector"));
static DETAIL_HEAD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("dt.detail-bkninfo__head").expect("valid selector"));
static DETAIL_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("dd.detail-bkninfo__txt").expect("valid selector"));
static MAP_FRAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.detail-spot__map iframe[data-src]").expect("valid selector"));
static THUMBNAIL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.detail-thumbimage__img[src]").expect("valid selector"));
static PAGER_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form#pagerParams input[name]").expect("valid selector"));
static PAGER_FORM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form#pagerParams").expect("valid selector"));

/// An extraction failure
///
/// Always permanent: the same document will fail the same way until the
/// extractor or the site changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("unexpected page structure at {url}: {message}")]
    Structure { url: String, message: String },

    #[error("cannot derive item identity from {url}: {message}")]
    Identity { url: String, message: String },
}

/// Fields extracted from one item page, before storage metadata is added
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedItem {
    pub key: String,
    pub category: String,
    pub url: String,
    pub fields: Map<String, Value>,
}

impl ExtractedItem {
    /// The next-update date the page announced, if any
    pub fn next_update(&self) -> Option<&str> {
        self.fields.get(NEXT_UPDATE_FIELD).and_then(|v| v.as_str())
    }
}

/// Turns documents into item references and item fields
pub trait Extractor: Send + Sync {
    /// Extracts the ordered item references of a listing page
    fn extract_page(&self, document: &Document) -> Result<Vec<ItemRef>, ExtractError>;

    /// Extracts the fields of an item page
    fn extract_item(&self, document: &Document) -> Result<ExtractedItem, ExtractError>;
}

/// Extractor for ielove listing and item pages
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    base_url: String,
}

impl HtmlExtractor {
    /// # Arguments
    ///
    /// * `base_url` - Site root that relative item links are resolved against
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Extractor for HtmlExtractor {
    fn extract_page(&self, document: &Document) -> Result<Vec<ItemRef>, ExtractError> {
        let html = Html::parse_document(&document.body);
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for link in html.select(&ITEM_LINK) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };

            let url = match resolve_href(&self.base_url, href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Skipping item link {}: {}", href, e);
                    continue;
                }
            };

            let (Ok(key), Some(category)) = (item_key(url.as_str()), item_category(&url)) else {
                tracing::debug!("Skipping item link without key or category: {}", url);
                continue;
            };

            if seen.insert(key.clone()) {
                refs.push(ItemRef {
                    key,
                    category,
                    url: url.to_string(),
                });
            }
        }

        tracing::trace!(url = %document.url, items = refs.len(), "Extracted listing page");
        Ok(refs)
    }

    fn extract_item(&self, document: &Document) -> Result<ExtractedItem, ExtractError> {
        let identity_error = |message: String| ExtractError::Identity {
            url: document.url.clone(),
            message,
        };

        let url = normalize_item_url(&document.url).map_err(|e| identity_error(e.to_string()))?;
        let key = item_key(url.as_str()).map_err(|e| identity_error(e.to_string()))?;
        let category =
            item_category(&url).ok_or_else(|| identity_error("no category segment".to_string()))?;

        let html = Html::parse_document(&document.body);
        let mut fields = Map::new();

        let title = html.select(&TITLE).next();
        if let Some(title) = title {
            fields.insert("name".to_string(), process_string(&element_text(&title)));
        }

        if let Some(salespoint) = html.select(&SALESPOINT).next() {
            fields.insert(
                "salespoint".to_string(),
                process_string(&element_text(&salespoint)),
            );
        }

        let mut details = Map::new();
        let mut blocks = 0usize;
        for block in html.select(&DETAIL_BLOCK) {
            blocks += 1;
            let heads = block.select(&DETAIL_HEAD);
            let texts = block.select(&DETAIL_TEXT);
            for (head, text) in heads.zip(texts) {
                let label = value_text(&process_string(&element_text(&head)));
                details.insert(label, detail_value(&text));
            }
        }

        if title.is_none() && blocks == 0 {
            return Err(ExtractError::Structure {
                url: document.url.clone(),
                message: "no title and no detail blocks".to_string(),
            });
        }

        let mut location = Map::new();
        if let Some(geo) = html
            .select(&MAP_FRAME)
            .next()
            .and_then(|frame| frame.value().attr("data-src"))
            .and_then(parse_map_query)
        {
            location.insert("geo".to_string(), Value::from(vec![geo.0, geo.1]));
        }

        let address = details
            .get(ADDRESS_LABEL)
            .and_then(|v| v.as_str())
            .and_then(split_address);
        if let Some(parts) = address {
            details.insert(
                ADDRESS_LABEL.to_string(),
                Value::from(format!(
                    "{} {} {} {}",
                    parts.prefecture, parts.city, parts.ward, parts.address
                )),
            );
            location.insert("prefecture".to_string(), Value::from(parts.prefecture));
            location.insert("city".to_string(), Value::from(parts.city));
            location.insert("ward".to_string(), Value::from(parts.ward));
            location.insert("address".to_string(), Value::from(parts.address));
        }

        if let Some(Value::String(next_update)) = details.get(NEXT_UPDATE_LABEL) {
            fields.insert(NEXT_UPDATE_FIELD.to_string(), Value::from(next_update.clone()));
        }

        if let Some(src) = floor_plan_src(&html) {
            let image_url = url
                .join(src)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string());
            let mut floor_plan = Map::new();
            floor_plan.insert("url".to_string(), Value::from(image_url));
            fields.insert("floor_plan".to_string(), Value::Object(floor_plan));
        }

        fields.insert("details".to_string(), Value::Object(details));
        fields.insert("location".to_string(), Value::Object(location));

        Ok(ExtractedItem {
            key,
            category,
            url: url.to_string(),
            fields,
        })
    }
}

/// Normalises one piece of source text
///
/// Full-width digits and punctuation are folded to ASCII and whitespace is
/// trimmed. The result is `null` for `-`, a number for plain integers and
/// decimals, a `YYYY-MM-DD` string when the text holds a `YYYY年M月D日`
/// date, and the folded string otherwise.
///
/// # Examples
///
/// ```
/// use ielove_mirror::crawler::process_string;
/// use serde_json::json;
///
/// assert_eq!(process_string("１２"), json!(12));
/// assert_eq!(process_string(" - "), json!(null));
/// assert_eq!(process_string("2024年6月1日"), json!("2024-06-01"));
/// ```
pub fn process_string(raw: &str) -> Value {
    let mut text = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '０'..='９' => {
                let digit = c as u32 - '０' as u32;
                text.push(char::from_digit(digit, 10).unwrap_or(c));
            }
            '\n' => text.push(' '),
            '㎡' => text.push_str("m2"),
            '、' => text.push_str(", "),
            '！' => text.push_str("! "),
            '。' => text.push_str(". "),
            '\u{3000}' => text.push(' '),
            '（' => text.push('('),
            '）' => text.push(')'),
            '［' => text.push('['),
            '］' => text.push(']'),
            _ => text.push(c),
        }
    }

    let text = text.trim();
    if text == "-" {
        return Value::Null;
    }
    if INTEGER.is_match(text) {
        if let Ok(n) = text.parse::<u64>() {
            return Value::from(n);
        }
    }
    if DECIMAL.is_match(text) {
        if let Ok(x) = text.parse::<f64>() {
            return Value::from(x);
        }
    }
    if let Some(date) = parse_japanese_date(text) {
        return Value::from(date);
    }
    Value::from(text)
}

/// Finds a `YYYY年M月D日` date and formats it as `YYYY-MM-DD`
fn parse_japanese_date(text: &str) -> Option<String> {
    let caps = JAPANESE_DATE.captures(text)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Source of the first thumbnail whose alt text marks it as the floor plan
fn floor_plan_src<'a>(html: &'a Html) -> Option<&'a str> {
    html.select(&THUMBNAIL)
        .find(|img| {
            img.value()
                .attr("alt")
                .is_some_and(|alt| alt.contains(FLOOR_PLAN_ALT))
        })
        .and_then(|img| img.value().attr("src"))
}

/// All text below an element, joined
fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Value of a detail cell: null, a single normalised value or the joined text
fn detail_value(cell: &ElementRef<'_>) -> Value {
    let mut parts: Vec<Value> = cell
        .text()
        .map(process_string)
        .filter(|v| !matches!(v, Value::String(s) if s.is_empty()))
        .collect();

    match parts.len() {
        0 => Value::Null,
        1 => parts.remove(0),
        _ => Value::from(parts.iter().map(value_text).collect::<Vec<_>>().join(" ")),
    }
}

/// Renders a normalised value back to text
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn parse_map_query(src: &str) -> Option<(f64, f64)> {
    let caps = MAP_QUERY.captures(src)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// A postal address split into its administrative parts
///
/// Missing parts are `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParts {
    pub prefecture: String,
    pub city: String,
    pub ward: String,
    pub address: String,
}

/// Splits a Japanese address into prefecture, city, ward and the rest
pub fn split_address(raw: &str) -> Option<AddressParts> {
    let caps = ADDRESS.captures(raw)?;
    let part = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("-")
            .to_string()
    };
    Some(AddressParts {
        prefecture: part(1),
        city: part(2),
        ward: part(3),
        address: part(4),
    })
}

/// Hidden inputs of the listing page's `form#pagerParams`, in document order
///
/// Returns `None` if the page has no pager form.
pub fn pager_form_params(html: &str) -> Option<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    document.select(&PAGER_FORM).next()?;

    Some(
        document
            .select(&PAGER_INPUT)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                let value = input.value().attr("value").unwrap_or("");
                Some((name.to_string(), value.to_string()))
            })
            .collect(),
    )
}

/// Largest page number shown in a pager HTML fragment
pub fn max_page_number(pager_html: &str) -> Option<u32> {
    let fragment = Html::parse_fragment(pager_html);
    fragment
        .root_element()
        .text()
        .filter_map(|t| process_string(t).as_u64())
        .filter_map(|n| u32::try_from(n).ok())
        .max()
}
