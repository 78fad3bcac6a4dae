//! Error types for ketchup.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid query {name}: {reason}")]
    InvalidQuery { name: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Search service errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response from search service: {0}")]
    InvalidResponse(String),
}

impl SearchError {
    /// Authentication failures abort the whole run; everything else only
    /// fails the query that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed { .. })
    }
}

/// Result type alias for ketchup.
pub type Result<T> = std::result::Result<T, Error>;
