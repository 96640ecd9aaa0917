//! In-memory fakes for the transport and cache store seams.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use ogproxy_core::{CacheStore, CachedResponse, Error};

use crate::fetch::{Body, FetchRequest, OriginResponse, Transport};

/// Size of the chunks a [`StaticOrigin`] body is streamed in.
const CHUNK: usize = 16;

/// Origin that answers every request with the same response and counts fetches.
pub struct StaticOrigin {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    fetches: AtomicUsize,
    last_request: Mutex<Option<FetchRequest>>,
}

impl StaticOrigin {
    pub fn ok(body: &str) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn with_status(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::copy_from_slice(body.as_bytes()),
            fetches: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers
            .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<FetchRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Transport for StaticOrigin {
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let url = request.url.clone();
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request);

        let chunks: Vec<Result<Bytes, Error>> = self
            .body
            .chunks(CHUNK)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();

        Ok(OriginResponse {
            status: self.status,
            url,
            headers: self.headers.clone(),
            body: Body::from_stream(stream::iter(chunks)),
        })
    }
}

/// Origin whose every fetch fails at the network level.
#[derive(Default)]
pub struct UnreachableOrigin {
    fetches: AtomicUsize,
}

impl UnreachableOrigin {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for UnreachableOrigin {
    async fn fetch(&self, request: FetchRequest) -> Result<OriginResponse, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(Error::HttpError(format!("network error: connection refused for {}", request.url)))
    }
}

/// Store whose reads and writes always fail.
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<CachedResponse>, Error> {
        Err(Error::Client("store unavailable".to_string()))
    }

    async fn put(&self, _key: &str, _response: CachedResponse) -> Result<(), Error> {
        Err(Error::Client("store unavailable".to_string()))
    }
}
