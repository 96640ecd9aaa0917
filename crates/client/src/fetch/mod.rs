//! HTTP fetch pipeline.
//!
//! ### Requests
//! - A [`FetchRequest`] is a plain descriptor: URL, headers, and an optional
//!   edge-cache policy for delegated caching.
//! - Redirects are followed up to the configured limit (default: 5).
//!
//! ### Responses
//! - Headers arrive first; the body is exposed as a [`Body`] that is either
//!   already buffered (cache hits) or still streaming from the network.
//! - Non-2xx statuses are returned as-is; deciding what counts as failure is
//!   left to the caller.

pub mod url;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};

use ogproxy_core::{AppConfig, CachedResponse, Error};

pub use self::url::{UrlError, cache_key, normalize, target_from_path};

/// Header carrying the upstream cache verdict.
pub const CACHE_STATUS_HEADER: &str = "cf-cache-status";

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "OG-Parser Bot/1.0")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "OG-Parser Bot/1.0".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// Caching instructions handed to an upstream caching fetch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeCachePolicy {
    pub cache_key: String,
    /// Cache regardless of the origin's own caching headers.
    pub cache_everything: bool,
    pub ttl_secs: u64,
}

/// Outbound request descriptor.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub edge_cache: Option<EdgeCachePolicy>,
}

impl FetchRequest {
    /// A GET request for `url` with no extra headers.
    pub fn get(url: Url) -> Self {
        Self { url, headers: HeaderMap::new(), edge_cache: None }
    }

    /// Add a header, skipping values that are not valid header text.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(e) => tracing::warn!(header = %name, "dropping invalid header value: {}", e),
        }
        self
    }
}

/// Body chunks as they come off the wire.
pub type BodyStream = BoxStream<'static, Result<Bytes, Error>>;

/// Response body, either fully buffered or still streaming.
pub enum Body {
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// Wrap a chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        Body::Stream(stream.boxed())
    }

    /// View the body as a chunk stream regardless of representation.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Full(bytes) => stream::iter([Ok(bytes)]).boxed(),
            Body::Stream(stream) => stream,
        }
    }

    /// Read the body to completion.
    pub async fn collect(self) -> Result<Bytes, Error> {
        match self {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Response returned by a [`Transport`] or replayed from the cache.
#[derive(Debug)]
pub struct OriginResponse {
    pub status: StatusCode,
    /// The final URL after redirects.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl OriginResponse {
    /// Rebuild a response from a cache entry.
    pub fn from_cached(cached: CachedResponse) -> Result<Self, Error> {
        let status = StatusCode::from_u16(cached.status)
            .map_err(|e| Error::Serialization(format!("stored status {}: {}", cached.status, e)))?;
        let url = Url::parse(&cached.url).map_err(|e| Error::Serialization(format!("stored url: {}", e)))?;

        let mut headers = HeaderMap::with_capacity(cached.headers.len());
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }

        Ok(Self { status, url, headers, body: Body::Full(cached.body) })
    }

    /// Header pairs in a storable form. Values that are not valid UTF-8 are dropped.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect()
    }

    /// Cache verdict reported by an upstream caching layer, if any.
    pub fn upstream_cache_status(&self) -> Option<String> {
        self.headers
            .get(CACHE_STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

/// Performs outbound requests.
///
/// The production implementation is [`HttpTransport`]; tests swap in fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return once status and headers are available.
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, Error>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: Client,
    config: FetchConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, Error> {
        let start = Instant::now();

        if let Some(policy) = &request.edge_cache {
            tracing::debug!(
                cache_key = %policy.cache_key,
                ttl_secs = policy.ttl_secs,
                cache_everything = policy.cache_everything,
                "delegating cache to upstream layer"
            );
        }

        let response = self
            .http
            .get(request.url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("network error: {}", e)))?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();

        tracing::debug!(
            "fetched {} -> {} status {} in {}ms",
            request.url,
            url,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        let body = Body::from_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| Error::HttpError(format!("failed to read response: {}", e)))),
        );

        Ok(OriginResponse { status, url, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "OG-Parser Bot/1.0");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "test-agent".into(), timeout_ms: 500, max_redirects: 2, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.max_redirects, 2);
    }

    #[test]
    fn test_fetch_request_header() {
        let request = FetchRequest::get(Url::parse("http://example.com").unwrap())
            .header(header::ACCEPT_LANGUAGE, "fr")
            .header(header::USER_AGENT, "bad\nvalue");
        assert_eq!(request.headers.get(header::ACCEPT_LANGUAGE).unwrap(), "fr");
        assert!(request.headers.get(header::USER_AGENT).is_none());
        assert!(request.edge_cache.is_none());
    }

    #[tokio::test]
    async fn test_body_collect_stream() {
        let chunks = vec![Ok(Bytes::from_static(b"<html")), Ok(Bytes::from_static(b" lang=\"en\">"))];
        let body = Body::from_stream(stream::iter(chunks));
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"<html lang=\"en\">"));
    }

    #[tokio::test]
    async fn test_body_collect_propagates_error() {
        let chunks = vec![Ok(Bytes::from_static(b"<html")), Err(Error::HttpError("reset".into()))];
        let body = Body::from_stream(stream::iter(chunks));
        assert!(matches!(body.collect().await, Err(Error::HttpError(_))));
    }

    #[tokio::test]
    async fn test_full_body_as_stream() {
        let mut stream = Body::Full(Bytes::from_static(b"abc")).into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_origin_response_from_cached() {
        let cached = CachedResponse {
            status: 200,
            url: "https://example.com/final".into(),
            headers: vec![
                ("content-type".into(), "text/html".into()),
                ("cache-control".into(), "s-maxage=60".into()),
            ],
            body: Bytes::from_static(b"<html></html>"),
        };

        let response = OriginResponse::from_cached(cached).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.url.as_str(), "https://example.com/final");
        assert_eq!(response.headers.get(header::CACHE_CONTROL).unwrap(), "s-maxage=60");
        assert_eq!(response.header_pairs().len(), 2);
        assert!(matches!(response.body, Body::Full(_)));
    }

    #[test]
    fn test_upstream_cache_status() {
        let mut response = OriginResponse {
            status: StatusCode::OK,
            url: Url::parse("https://example.com").unwrap(),
            headers: HeaderMap::new(),
            body: Body::Full(Bytes::new()),
        };
        assert_eq!(response.upstream_cache_status(), None);

        response.headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
        assert_eq!(response.upstream_cache_status().as_deref(), Some("HIT"));
    }

    #[tokio::test]
    async fn test_http_transport_new() {
        let transport = HttpTransport::new(FetchConfig::default());
        assert!(transport.is_ok());
    }
}
