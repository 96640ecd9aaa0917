//! Core types and shared functionality for ogproxy.
//!
//! This crate provides:
//! - The Open Graph record served to callers
//! - Response cache with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod model;

pub use cache::{CacheDb, CacheStore, CachedResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{Diagnostics, OpenGraphData};
