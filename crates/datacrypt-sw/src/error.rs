//! Controller error type.

use datacrypt_net::NetError;
use thiserror::Error;

/// Errors that can occur in offline cache controller operations.
#[derive(Error, Debug)]
pub enum CacheControllerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Install failed on {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Share target error: {0}")]
    Share(String),
}

impl CacheControllerError {
    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, CacheControllerError>;
