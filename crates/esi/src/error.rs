//! ESI client error types.

use thiserror::Error;

/// ESI client error type.
#[derive(Debug, Error)]
pub enum EsiError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Terminal status from ESI: a 4xx, or a 5xx that survived every retry.
    #[error("ESI returned status {0}")]
    Status(reqwest::StatusCode),

    /// The `x-pages` header was absent or unparseable.
    #[error("missing or malformed x-pages header")]
    MissingPages,

    /// A sub-fetch landed too close to the end of the cache window.
    #[error("cache window too close to expiry")]
    WindowClosed,

    /// The request has a streaming body and cannot be replayed.
    #[error("request cannot be retried")]
    UncloneableRequest,
}

/// Result type for ESI operations.
pub type Result<T> = std::result::Result<T, EsiError>;
