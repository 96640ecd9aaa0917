//! Client code for ogproxy.
//!
//! This crate provides the origin fetch pipeline, the cache-aside
//! orchestrator and the streaming Open Graph extractor used by the server.

pub mod cacher;
pub mod fetch;
pub mod og;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cacher::{BackgroundTasks, CacheAside, CacheStatus, Resolved};
pub use fetch::{
    Body, EdgeCachePolicy, FetchConfig, FetchRequest, HttpTransport, OriginResponse, Transport, UrlError, cache_key,
    normalize, target_from_path,
};
pub use og::{assemble, extract};
