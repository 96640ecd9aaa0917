//! Stored origin responses.
//!
//! A row holds everything needed to replay an origin response: status,
//! final URL, headers and the full body. The row's expiry comes from the
//! response's own `Cache-Control` header, so whoever stores a response
//! decides its TTL.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::key_digest;
use super::store::CacheStore;
use crate::Error;

/// A fully buffered origin response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Header pairs in their original order. Names are stored lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Shared-cache lifetime in seconds.
    ///
    /// `s-maxage` wins over `max-age`; `None` when neither directive is set.
    pub fn ttl_seconds(&self) -> Option<u64> {
        let cache_control = self.header("cache-control")?;
        directive(cache_control, "s-maxage").or_else(|| directive(cache_control, "max-age"))
    }
}

fn directive(cache_control: &str, name: &str) -> Option<u64> {
    cache_control.split(',').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case(name) { value.trim().trim_matches('"').parse().ok() } else { None }
    })
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl CacheDb {
    /// Insert or replace the response stored under `cache_key`.
    pub async fn upsert_response(&self, cache_key: &str, response: &CachedResponse) -> Result<(), Error> {
        let now = Utc::now();
        let expires_at = response
            .ttl_seconds()
            .and_then(|ttl| now.checked_add_signed(chrono::Duration::try_seconds(i64::try_from(ttl).ok()?)?))
            .map(timestamp);
        let stored_at = timestamp(now);
        let key_hash = key_digest(cache_key);
        let cache_key = cache_key.to_string();
        let url = response.url.clone();
        let status = response.status;
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.to_vec();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO responses (
                    key_hash, cache_key, url, status_code, headers_json, body, stored_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(key_hash) DO UPDATE SET
                    cache_key = excluded.cache_key,
                    url = excluded.url,
                    status_code = excluded.status_code,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    stored_at = excluded.stored_at,
                    expires_at = excluded.expires_at",
                    params![key_hash, cache_key, url, status, headers_json, body, stored_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the response stored under `cache_key` if it has not expired.
    pub async fn get_response(&self, cache_key: &str) -> Result<Option<CachedResponse>, Error> {
        let key_hash = key_digest(cache_key);
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status_code, headers_json, body
                FROM responses
                WHERE key_hash = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                )?;

                let result = stmt.query_row(params![key_hash, now], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                });

                match result {
                    Ok((url, status, headers_json, body)) => Ok(Some(CachedResponse {
                        status,
                        url,
                        headers: serde_json::from_str(&headers_json)?,
                        body: Bytes::from(body),
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired responses.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM responses WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, Error> {
        self.get_response(key).await
    }

    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), Error> {
        self.upsert_response(key, &response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(cache_control: Option<&str>) -> CachedResponse {
        let mut headers = vec![("content-type".to_string(), "text/html".to_string())];
        if let Some(value) = cache_control {
            headers.push(("cache-control".to_string(), value.to_string()));
        }
        CachedResponse {
            status: 200,
            url: "https://example.com/".to_string(),
            headers,
            body: Bytes::from_static(b"<html lang=\"en\"></html>"),
        }
    }

    #[test]
    fn test_ttl_prefers_s_maxage() {
        let response = make_response(Some("public, max-age=60, s-maxage=3600"));
        assert_eq!(response.ttl_seconds(), Some(3600));
    }

    #[test]
    fn test_ttl_falls_back_to_max_age() {
        let response = make_response(Some("public, max-age=60"));
        assert_eq!(response.ttl_seconds(), Some(60));
    }

    #[test]
    fn test_ttl_absent() {
        assert_eq!(make_response(None).ttl_seconds(), None);
        assert_eq!(make_response(Some("no-cache")).ttl_seconds(), None);
    }

    #[test]
    fn test_header_case_insensitive() {
        let response = make_response(Some("s-maxage=10"));
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.header("CACHE-CONTROL"), Some("s-maxage=10"));
        assert_eq!(response.header("etag"), None);
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let response = make_response(Some("s-maxage=3600"));

        db.upsert_response("http://example.com/", &response).await.unwrap();

        let retrieved = db.get_response("http://example.com/").await.unwrap().unwrap();
        assert_eq!(retrieved, response);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.get_response("http://nonexistent.example/").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = make_response(Some("s-maxage=3600"));
        let mut second = first.clone();
        second.body = Bytes::from_static(b"<html lang=\"fr\"></html>");

        db.upsert_response("http://example.com/", &first).await.unwrap();
        db.upsert_response("http://example.com/", &second).await.unwrap();

        let retrieved = db.get_response("http://example.com/").await.unwrap().unwrap();
        assert_eq!(retrieved.body, second.body);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_served() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_response("http://example.com/", &make_response(Some("s-maxage=0")))
            .await
            .unwrap();

        assert!(db.get_response("http://example.com/").await.unwrap().is_none());
        assert_eq!(db.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entry_without_ttl_never_expires() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_response("http://example.com/", &make_response(None))
            .await
            .unwrap();

        assert_eq!(db.purge_expired().await.unwrap(), 0);
        assert!(db.get_response("http://example.com/").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_store_trait() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store: &dyn CacheStore = &db;

        store
            .put("http://example.com/?accept-language=fr", make_response(Some("s-maxage=60")))
            .await
            .unwrap();

        assert!(store.get("http://example.com/?accept-language=fr").await.unwrap().is_some());
        assert!(store.get("http://example.com/").await.unwrap().is_none());
    }
}
