//! Error handling for the observability pipeline
//!
//! This module defines all error types used throughout the pipeline.

#![allow(missing_docs)]

use thiserror::Error;

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, ObservabilityError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum ObservabilityError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input to a public operation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Durable or remote event sink failures
    #[error("Sink error: {0}")]
    Sink(String),

    /// Notification channel failures
    #[error("Notification error: {0}")]
    Notification(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// A span was closed more than once
    #[error("Span already closed: {0}")]
    SpanAlreadyClosed(String),

    /// An alert was asked to make a transition its state machine forbids
    #[error("Invalid transition for alert {alert_id}: {from} -> {to}")]
    InvalidTransition {
        alert_id: String,
        from: String,
        to: String,
    },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to decide how an error is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected immediately, never stored
    Validation,
    /// Recovered locally by retrying on the next cycle or isolating the channel
    Transient,
    /// Reported as a warning, operation is a no-op
    Logic,
    /// Lookup of an unknown id
    NotFound,
    /// Bad configuration at startup
    Config,
    /// Anything else
    Internal,
}

impl ObservabilityError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObservabilityError::Validation(_) => ErrorKind::Validation,
            ObservabilityError::Io(_)
            | ObservabilityError::HttpClient(_)
            | ObservabilityError::Sink(_)
            | ObservabilityError::Notification(_) => ErrorKind::Transient,
            ObservabilityError::SpanAlreadyClosed(_)
            | ObservabilityError::InvalidTransition { .. } => ErrorKind::Logic,
            ObservabilityError::NotFound(_) => ErrorKind::NotFound,
            ObservabilityError::Config(_) | ObservabilityError::Yaml(_) => ErrorKind::Config,
            ObservabilityError::Serialization(_) | ObservabilityError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether retrying on a later cycle may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether the error reports a logic mistake by the caller
    pub fn is_logic(&self) -> bool {
        self.kind() == ErrorKind::Logic
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ObservabilityError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ObservabilityError::NotFound(what.into())
    }
}
