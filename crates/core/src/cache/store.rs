//! The cache primitive consumed by the cache-aside layer.

use async_trait::async_trait;

use super::responses::CachedResponse;
use crate::Error;

/// Key/value store for full origin responses.
///
/// Implementations are expected to be safe for concurrent use and to enforce
/// expiry themselves: `get` must never hand back an entry whose TTL has run
/// out.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a fresh entry.
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, Error>;

    /// Store or overwrite an entry.
    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), Error>;
}
