use crate::url::normalize::path_segments;
use crate::UrlError;
use url::Url;

/// Derives the stable item key from an item URL
///
/// The key is the last non-empty path segment, so query strings, fragments
/// and trailing slashes never change it. A string without a scheme is taken
/// to be a key already and returned unchanged.
///
/// # Examples
///
/// ```
/// use ielove_mirror::url::item_key;
///
/// assert_eq!(item_key("https://www.ielove.co.jp/chintai/c1-397758400/?pg=2").unwrap(), "c1-397758400");
/// assert_eq!(item_key("c1-397758400").unwrap(), "c1-397758400");
/// ```
pub fn item_key(url_or_key: &str) -> Result<String, UrlError> {
    let trimmed = url_or_key.trim();
    if !trimmed.contains("://") {
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(UrlError::MissingKey(url_or_key.to_string()));
        }
        return Ok(trimmed.to_string());
    }

    let url = Url::parse(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?;
    path_segments(url.path())
        .last()
        .map(|s| s.to_string())
        .ok_or_else(|| UrlError::MissingKey(url_or_key.to_string()))
}

/// Returns the category slug of an item URL (its first path segment)
///
/// Item pages live at `/{category}/{key}/`; anything shallower has no
/// category.
pub fn item_category(url: &Url) -> Option<String> {
    let segments = path_segments(url.path());
    if segments.len() < 2 {
        return None;
    }
    segments.first().map(|s| s.to_string())
}
