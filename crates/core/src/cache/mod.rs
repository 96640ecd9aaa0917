//! Response cache consulted by the cache-aside layer.
//!
//! The cache is reached through the [`CacheStore`] trait so callers can swap
//! the backend. The bundled backend is SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Rows keyed by the SHA-256 digest of the cache key
//! - Expiry derived from the stored response's `Cache-Control` header
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod responses;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use responses::CachedResponse;
pub use store::CacheStore;
