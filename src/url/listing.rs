use crate::url::normalize::normalize_item_url;
use crate::UrlError;
use url::Url;

/// Builds the URL of one listing (result) page
///
/// Page 1 is the bare result URL; later pages carry a `pg` query parameter,
/// e.g. `https://www.ielove.co.jp/mansion_chuko/tokyo/result/?pg=2`.
pub fn listing_url(
    base_url: &str,
    category: &str,
    region: &str,
    page_index: u32,
) -> Result<String, UrlError> {
    let base = Url::parse(base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    let mut url = base
        .join(&format!("/{}/{}/result/", category, region))
        .map_err(|e| UrlError::Parse(e.to_string()))?;

    if page_index > 1 {
        url.query_pairs_mut()
            .append_pair("pg", &page_index.to_string());
    }

    Ok(url.to_string())
}

/// Resolves a link found on a listing page into a normalized item URL
pub fn resolve_href(base_url: &str, href: &str) -> Result<Url, UrlError> {
    let base = Url::parse(base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    let joined = base
        .join(href)
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_item_url(joined.as_str())
}
