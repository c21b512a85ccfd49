//! Error types for Tandem operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Tandem crates. Uses `thiserror` for derive macros.
//!
//! Every error maps onto one of four [`ErrorKind`]s so callers on the request
//! path can tell a bad request from a flaky network from a failed provider.

use thiserror::Error;

/// Boxed error source carried by transport and generation failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in Tandem operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied input that can never succeed (empty query, missing field).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record or resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network or feed failure that is expected to heal on retry.
    #[error("Transport error: {message}")]
    Transport {
        /// What was being attempted.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The embedding provider failed on valid input.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The generation provider failed on valid input.
    #[error("Generation error: {message}")]
    Generation {
        /// What went wrong.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A shared resource was used after it was closed.
    #[error("Resource closed: {0}")]
    Closed(String),

    /// Generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retried or reconnected automatically; never surfaced to a user.
    Transient,
    /// Client error, surfaced immediately, never retried.
    Validation,
    /// Provider failure after valid input (embedding or generation).
    DerivedData,
    /// Anything else: configuration, storage, programming errors.
    Internal,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a transport error without a source.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping an underlying cause.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an embedding error.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a generation error without a source.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a generation error wrapping an underlying cause.
    pub fn generation_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Generation {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a closed-resource error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    /// Create a generic operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transient,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Embedding(_) | Self::Generation { .. } => ErrorKind::DerivedData,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Tandem's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::transport("feed closed").kind(), ErrorKind::Transient);
        assert_eq!(Error::validation("empty").kind(), ErrorKind::Validation);
        assert_eq!(Error::embedding("boom").kind(), ErrorKind::DerivedData);
        assert_eq!(Error::generation("boom").kind(), ErrorKind::DerivedData);
        assert_eq!(Error::config("bad").kind(), ErrorKind::Internal);
        assert_eq!(Error::not_found("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(Error::transport("timeout").is_retryable());
        assert!(!Error::generation("refused").is_retryable());
        assert!(!Error::validation("empty").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::validation("query must not be empty");
        assert_eq!(err.to_string(), "Validation error: query must not be empty");

        let err = Error::transport("change feed disconnected");
        assert_eq!(err.to_string(), "Transport error: change feed disconnected");
    }

    #[test]
    fn test_transport_with_source_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::transport_with_source("subscribe failed", io);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("reset"));
    }

    #[test]
    fn test_from_serde_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
