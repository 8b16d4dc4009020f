use std::error::Error as StdError;

use thiserror::Error;

/// Errors surfaced by the adapter.
///
/// Everything on the query path resolves to one of `ConnectionError`,
/// `DatabaseError`, `InternalError` or `RuntimeError`; driver error types never
/// reach the caller. `ConfigError` is only produced while loading credentials.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Runtime error: {message}")]
    RuntimeError {
        message: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AdapterError {
    /// Wrap an unclassified failure, keeping the original error as the source.
    pub fn runtime(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        let source = source.into();
        AdapterError::RuntimeError {
            message: source.to_string(),
            source,
        }
    }

    /// Short name of the error kind, used in log lines and CLI output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::ConnectionError(_) => "ConnectionError",
            AdapterError::DatabaseError(_) => "DatabaseError",
            AdapterError::InternalError(_) => "InternalError",
            AdapterError::RuntimeError { .. } => "RuntimeError",
            AdapterError::ConfigError(_) => "ConfigError",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn runtime_keeps_source() {
        let err = AdapterError::runtime(std::io::Error::other("socket went away"));
        assert_eq!(err.kind(), "RuntimeError");
        assert_eq!(err.to_string(), "Runtime error: socket went away");
        assert!(err.source().is_some());
    }

    #[test]
    fn display_prefixes_kind() {
        let err = AdapterError::InternalError("no transaction open".into());
        assert_eq!(err.to_string(), "Internal error: no transaction open");
    }
}
