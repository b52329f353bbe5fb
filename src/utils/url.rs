//! URL helpers for building Assistants API endpoints.
//!
//! Base URLs come from user configuration and may carry trailing slashes;
//! endpoint paths are assembled from remote ids. Both are normalised here so
//! request code never produces `//` in a path.

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Normalize a base URL by removing trailing slashes.
///
/// ```
/// use palaver::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// ```
/// use palaver::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/threads"),
///     "https://api.example.com/v1/threads"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Build an endpoint path from segments, dropping empty ones.
///
/// Leading and trailing slashes are trimmed from each segment so joining
/// never produces `//`. Slashes inside a segment are kept as they are.
pub fn endpoint_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
