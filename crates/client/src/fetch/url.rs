//! URL normalization for consistent caching and fetching.

use url::Url;

/// Error type for URL normalization failures.
///
/// Display strings are surfaced to callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("No URL provided")]
    Empty,

    #[error("URL must use HTTP or HTTPS protocol")]
    UnsupportedScheme(String),

    #[error("Invalid URL format")]
    InvalidUrl(String),
}

impl From<UrlError> for ogproxy_core::Error {
    fn from(err: UrlError) -> Self {
        ogproxy_core::Error::InvalidUrl(err.to_string())
    }
}

/// Recover the target URL from an inbound request path.
///
/// The leading `/` is stripped and the remainder percent-decoded, so both
/// `/example.com/page` and `/https%3A%2F%2Fexample.com%2Fpage` work.
pub fn target_from_path(path: &str) -> Result<String, UrlError> {
    let raw = path.strip_prefix('/').unwrap_or(path);
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))
}

/// Normalize a target URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to http:// unless the input starts with http:// or https://
/// 3. Reject anything that is not HTTP(S)
/// 4. Lowercase the host
/// 5. Remove fragment (#...)
/// 6. Keep query string intact (do not reorder)
pub fn normalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if has_http_scheme(trimmed) { trimmed.to_string() } else { format!("http://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            parsed
                .set_host(Some(&lowered))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

fn has_http_scheme(input: &str) -> bool {
    let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Build the cache key for a normalized URL.
///
/// Responses can differ per language, so the inbound `Accept-Language`
/// value (when present) is appended as an `accept-language` query parameter.
pub fn cache_key(url: &Url, accept_language: Option<&str>) -> String {
    match accept_language.map(str::trim).filter(|v| !v.is_empty()) {
        Some(lang) => {
            let mut keyed = url.clone();
            keyed.query_pairs_mut().append_pair("accept-language", lang);
            keyed.to_string()
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        let url = normalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_normalize_default_scheme() {
        let url = normalize("example.com").unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn test_normalize_scheme_case_insensitive() {
        let url = normalize("HTTPS://example.com/a").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_normalize_lowercase_host() {
        let url = normalize("https://EXAMPLE.COM/Path").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/Path");
    }

    #[test]
    fn test_normalize_remove_fragment() {
        let url = normalize("https://example.com#section").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn test_normalize_preserve_query() {
        let url = normalize("https://example.com?b=2&a=1").unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_normalize_trim_whitespace() {
        let url = normalize("  https://example.com  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), Err(UrlError::Empty));
        assert_eq!(normalize("   "), Err(UrlError::Empty));
    }

    #[test]
    fn test_normalize_invalid() {
        let result = normalize("exa mple.com");
        assert!(matches!(result, Err(UrlError::InvalidUrl(_))));
        assert_eq!(result.unwrap_err().to_string(), "Invalid URL format");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(UrlError::Empty.to_string(), "No URL provided");
        assert_eq!(
            UrlError::UnsupportedScheme("ftp".into()).to_string(),
            "URL must use HTTP or HTTPS protocol"
        );
    }

    #[test]
    fn test_into_core_error() {
        let err: ogproxy_core::Error = UrlError::Empty.into();
        assert!(err.is_validation());
        assert!(matches!(err, ogproxy_core::Error::InvalidUrl(msg) if msg == "No URL provided"));
    }

    #[test]
    fn test_target_from_path() {
        assert_eq!(target_from_path("/example.com").unwrap(), "example.com");
        assert_eq!(target_from_path("/example.com/a/b").unwrap(), "example.com/a/b");
        assert_eq!(
            target_from_path("/https%3A%2F%2Fexample.com%2Fpage").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_target_from_empty_path() {
        assert_eq!(target_from_path("/"), Err(UrlError::Empty));
        assert_eq!(target_from_path(""), Err(UrlError::Empty));
    }

    #[test]
    fn test_cache_key_plain() {
        let url = normalize("example.com").unwrap();
        assert_eq!(cache_key(&url, None), "http://example.com/");
        assert_eq!(cache_key(&url, Some("  ")), "http://example.com/");
    }

    #[test]
    fn test_cache_key_with_language() {
        let url = normalize("example.com/page?x=1").unwrap();
        assert_eq!(
            cache_key(&url, Some("fr-CH, fr;q=0.9")),
            "http://example.com/page?x=1&accept-language=fr-CH%2C+fr%3Bq%3D0.9"
        );
    }
}
