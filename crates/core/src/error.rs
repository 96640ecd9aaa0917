//! Unified error types for ogproxy.
//!
//! Every variant renders with a stable code prefix so log lines can be
//! grepped by category.

use tokio_rusqlite::rusqlite;

/// Unified error types for the ogproxy workspace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target URL failed validation or normalization.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Origin answered with a non-success status.
    #[error("HTTP_ERROR: status {0}")]
    HttpStatus(u16),

    /// Network failure while talking to the origin.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The HTTP client could not be constructed.
    #[error("CLIENT_ERROR: {0}")]
    Client(String),

    /// The metadata scan could not complete.
    #[error("EXTRACT_FAILED: {0}")]
    ExtractFailed(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A cached row could not be encoded or decoded.
    #[error("CACHE_ERROR: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by
    /// the origin or the service itself.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidUrl(_))
    }

    /// Whether the error happened while retrieving the target page.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::HttpStatus(_) | Error::HttpError(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidUrl("No URL provided".to_string());
        assert!(err.to_string().contains("INVALID_URL"));
        assert!(err.to_string().contains("No URL provided"));
    }

    #[test]
    fn test_http_status_display() {
        let err = Error::HttpStatus(503);
        assert_eq!(err.to_string(), "HTTP_ERROR: status 503");
    }

    #[test]
    fn test_error_categories() {
        assert!(Error::InvalidUrl("x".into()).is_validation());
        assert!(!Error::InvalidUrl("x".into()).is_upstream());
        assert!(Error::HttpStatus(404).is_upstream());
        assert!(Error::HttpError("reset".into()).is_upstream());
        assert!(!Error::ExtractFailed("x".into()).is_upstream());
        assert!(!Error::MigrationFailed("x".into()).is_validation());
    }
}
