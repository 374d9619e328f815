//! Forwarding client error types.

/// Errors that end or prevent a forwarding session.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream error: {0}")]
    Stream(String),
}
