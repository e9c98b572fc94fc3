//! Error types for the veto decision core

use thiserror::Error;

/// Result type alias for veto operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

/// Cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache backend does not support {0}")]
    Unsupported(&'static str),

    #[error("Failed to encode cache entry: {0}")]
    Serialization(String),

    #[error("{0} is not a valid IPv4 address")]
    InvalidIpv4(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Decision feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid feed response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read feed source: {0}")]
    Io(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_unsupported_message() {
        let err = CacheError::Unsupported("prune");
        assert!(err.to_string().contains("prune"));
    }

    #[test]
    fn test_cache_error_invalid_ipv4() {
        let err = CacheError::InvalidIpv4("not-an-ip".to_string());
        assert!(err.to_string().contains("not-an-ip"));
    }

    #[test]
    fn test_feed_error_invalid_response() {
        let err = FeedError::InvalidResponse("missing 'new' field".to_string());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_config_error_invalid() {
        let err = ConfigError::Invalid("fallback must belong to ordered remediations".to_string());
        assert!(err.to_string().contains("fallback"));
    }

    #[test]
    fn test_error_from_cache_error() {
        let cache_err = CacheError::Unsupported("invalidate_tag");
        let err: Error = cache_err.into();

        match err {
            Error::Cache(CacheError::Unsupported("invalidate_tag")) => (),
            _ => panic!("Expected Error::Cache(CacheError::Unsupported)"),
        }
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_str = "invalid: [yaml: content";
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let config_err: ConfigError = yaml_err.into();

        match config_err {
            ConfigError::ParseError(_) => (),
            _ => panic!("Expected ConfigError::ParseError"),
        }
    }
}
