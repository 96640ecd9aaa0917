//! Cache-aside lookup in front of the origin.
//!
//! ### Local mode
//! - A stored response is replayed as a `HIT`.
//! - On a miss the origin is fetched. A 2xx response is handed back as a
//!   `MISS` with its body teed. Once the caller has read the body to the
//!   end, a background task writes the full copy to the store.
//! - Non-2xx responses fail the lookup and are never stored.
//!
//! ### Upstream mode
//! - The request carries an [`EdgeCachePolicy`] and caching is left to the
//!   fetch layer. The cache status is whatever that layer reports.

use std::future::Future;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::header::{self, HeaderValue};
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use ogproxy_core::{CacheStore, CachedResponse, Error};

use crate::fetch::{Body, EdgeCachePolicy, FetchRequest, OriginResponse, Transport};

/// Detached work that must finish even after its response was returned.
///
/// Cloning shares the same set of tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` to completion in the background.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Wait for every task spawned so far.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}

/// Where an origin response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Value reported by the upstream caching layer, if it reported one.
    Upstream(Option<String>),
}

impl CacheStatus {
    /// Label surfaced as `diagnostics.cfCacheStatus`.
    pub fn label(&self) -> Option<String> {
        match self {
            CacheStatus::Hit => Some("HIT".to_string()),
            CacheStatus::Miss => Some("MISS".to_string()),
            CacheStatus::Upstream(status) => status.clone(),
        }
    }
}

/// An origin response plus its cache status.
#[derive(Debug)]
pub struct Resolved {
    pub response: OriginResponse,
    pub cache_status: CacheStatus,
}

/// Cache-aside orchestrator.
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    tasks: BackgroundTasks,
}

impl CacheAside {
    pub fn new(store: Arc<dyn CacheStore>, transport: Arc<dyn Transport>, tasks: BackgroundTasks) -> Self {
        Self { store, transport, tasks }
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Resolve `cache_key` to an origin response.
    ///
    /// `produce_request` is only invoked when the origin has to be contacted.
    /// `ttl_secs` is the lifetime of a newly stored entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpStatus`] for a non-2xx origin response and the
    /// transport's error when the fetch itself fails.
    pub async fn resolve<F>(
        &self, cache_key: &str, produce_request: F, ttl_secs: u64, use_upstream_cache: bool,
    ) -> Result<Resolved, Error>
    where
        F: FnOnce() -> FetchRequest,
    {
        if use_upstream_cache {
            return self.resolve_upstream(cache_key, produce_request(), ttl_secs).await;
        }

        match self.store.get(cache_key).await {
            Ok(Some(cached)) => match OriginResponse::from_cached(cached) {
                Ok(response) => {
                    tracing::info!(cache_key, "serving from cache");
                    return Ok(Resolved { response, cache_status: CacheStatus::Hit });
                }
                Err(e) => tracing::warn!(cache_key, "unreadable cache entry, fetching from origin: {}", e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(cache_key, "cache lookup failed, fetching from origin: {}", e),
        }

        tracing::info!(cache_key, "not cached, fetching from origin");
        let response = self.transport.fetch(produce_request()).await?;
        ensure_success(&response)?;

        let response = self.persist_on_completion(cache_key, response, ttl_secs);
        Ok(Resolved { response, cache_status: CacheStatus::Miss })
    }

    async fn resolve_upstream(
        &self, cache_key: &str, mut request: FetchRequest, ttl_secs: u64,
    ) -> Result<Resolved, Error> {
        tracing::info!(cache_key, "delegating to upstream cache");
        request.edge_cache =
            Some(EdgeCachePolicy { cache_key: cache_key.to_string(), cache_everything: true, ttl_secs });

        let response = self.transport.fetch(request).await?;
        let status = response.upstream_cache_status();
        tracing::info!(cache_key, cache_status = status.as_deref().unwrap_or("none"), "upstream cache status");
        ensure_success(&response)?;

        Ok(Resolved { response, cache_status: CacheStatus::Upstream(status) })
    }

    /// Tag the response with its cache lifetime and schedule the store write
    /// for when the body has been read in full.
    fn persist_on_completion(&self, cache_key: &str, mut response: OriginResponse, ttl_secs: u64) -> OriginResponse {
        if let Ok(value) = HeaderValue::from_str(&format!("s-maxage={ttl_secs}")) {
            response.headers.insert(header::CACHE_CONTROL, value);
        }

        let status = response.status.as_u16();
        let url = response.url.to_string();
        let headers = response.header_pairs();
        let (body, complete) = tee(response.body);
        response.body = body;

        let store = Arc::clone(&self.store);
        let key = cache_key.to_string();
        self.tasks.wait_until(async move {
            let Ok(body) = complete.await else {
                tracing::debug!(cache_key = %key, "body not read to completion, skipping cache write");
                return;
            };
            let len = body.len();
            match store.put(&key, CachedResponse { status, url, headers, body }).await {
                Ok(()) => tracing::debug!(cache_key = %key, bytes = len, "stored response"),
                Err(e) => tracing::warn!(cache_key = %key, "failed to store response: {}", e),
            }
        });

        response
    }
}

fn ensure_success(response: &OriginResponse) -> Result<(), Error> {
    if response.status.is_success() {
        return Ok(());
    }
    tracing::warn!(url = %response.url, status = response.status.as_u16(), "origin returned error status");
    Err(Error::HttpStatus(response.status.as_u16()))
}

/// Split a body into one for the caller and a receiver that yields the full
/// copy once the caller's stream has ended. A read error drops the sender.
fn tee(body: Body) -> (Body, oneshot::Receiver<Bytes>) {
    let (tx, rx) = oneshot::channel();

    let body = match body {
        Body::Full(bytes) => {
            let _ = tx.send(bytes.clone());
            Body::Full(bytes)
        }
        Body::Stream(inner) => Body::from_stream(stream::unfold(
            (inner, BytesMut::new(), Some(tx)),
            |(mut inner, mut copy, mut tx)| async move {
                match inner.next().await {
                    Some(Ok(chunk)) => {
                        copy.extend_from_slice(&chunk);
                        Some((Ok(chunk), (inner, copy, tx)))
                    }
                    Some(Err(e)) => {
                        tx.take();
                        Some((Err(e), (inner, copy, tx)))
                    }
                    None => {
                        if let Some(tx) = tx.take() {
                            let _ = tx.send(copy.freeze());
                        }
                        None
                    }
                }
            },
        )),
    };

    (body, rx)
}
