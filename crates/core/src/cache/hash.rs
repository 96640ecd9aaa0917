//! Fixed-width row keys for the response table.

use sha2::{Digest, Sha256};

/// Digest a cache key into the hex string used as the table's primary key.
///
/// Cache keys are full URLs and can be arbitrarily long; the digest keeps
/// the index compact.
pub fn key_digest(cache_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cache_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_stability() {
        let a = key_digest("http://example.com/");
        let b = key_digest("http://example.com/");
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_varies_with_query() {
        let plain = key_digest("http://example.com/");
        let localized = key_digest("http://example.com/?accept-language=fr");
        assert_ne!(plain, localized);
    }

    #[test]
    fn test_digest_format() {
        let hash = key_digest("http://example.com/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
