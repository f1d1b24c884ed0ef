use crate::UrlError;
use url::Url;

/// Normalizes an item URL to the form used for fetching and storage
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject schemes other than HTTP and HTTPS
/// 3. Normalize path:
///    - Remove empty and dot segments (. and ..)
///    - Always end with a single trailing slash
/// 4. Remove the query string; item identity never depends on it
/// 5. Remove fragment (everything after #)
///
/// The host is left as is (the catalog lives on `www.`), apart from the
/// lowercasing the URL parser already performs.
///
/// # Examples
///
/// ```
/// use ielove_mirror::url::normalize_item_url;
///
/// let url = normalize_item_url("https://www.ielove.co.jp/chintai/c1-397758400?from=list").unwrap();
/// assert_eq!(url.as_str(), "https://www.ielove.co.jp/chintai/c1-397758400/");
/// ```
pub fn normalize_item_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and forcing a trailing slash
pub(crate) fn normalize_path(path: &str) -> String {
    let segments = path_segments(path);
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}/", segments.join("/"))
}

/// Splits a path into its meaningful segments, resolving `.` and `..`
pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    normalized_segments
}
