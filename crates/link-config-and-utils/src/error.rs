//! Errors raised while resolving paths and loading configuration.

use thiserror::Error;

/// Configuration, path and file errors.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured redirect URI does not parse
    #[error("Invalid redirect URI {uri:?}: {source}")]
    InvalidRedirectUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path error (e.g., home directory not found)
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
