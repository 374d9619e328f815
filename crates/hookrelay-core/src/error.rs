//! Error types for `hookrelay` core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `hookrelay` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire frame could not be decoded into an event
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Unknown body policy name
    #[error("Unknown body policy '{0}' (expected one of: non-get, post-only, always)")]
    UnknownBodyPolicy(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
