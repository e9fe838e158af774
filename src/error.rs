// src/error.rs

//! Unified error handling for the synchronization pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Broad failure classes used to decide how far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or status failure, fatal to the enclosing fetch
    Transport,
    /// Malformed payload, fatal to the enclosing batch
    Decode,
    /// Write-layer failure, fatal to the enclosing flush
    Store,
    /// Missing or invalid configuration, fatal at startup
    Configuration,
    /// Caller violated an input contract
    Validation,
    /// Work stopped because cancellation was requested
    Cancelled,
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Tabular feed could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Upstream call failed or returned a non-success status
    #[error("Transport error for {context}: {message}")]
    Transport { context: String, message: String },

    /// Upstream payload could not be decoded
    #[error("Decode error for {context}: {message}")]
    Decode { context: String, message: String },

    /// Sink write failed
    #[error("Store error for {context}: {message}")]
    Store { context: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pagination never produced an empty page
    #[error("Category {category} exceeded {max_pages} pages without an empty page")]
    PageLimit { category: String, max_pages: usize },

    /// Snapshot guard refused to apply a suspicious delta
    #[error(
        "Snapshot guard triggered: {delete_count} of {previous_count} records would be deleted ({reason})"
    )]
    SnapshotGuard {
        previous_count: usize,
        delete_count: usize,
        reason: String,
    },

    /// Cancellation was observed before new work started
    #[error("Cancelled during {0}")]
    Cancelled(String),
}

impl AppError {
    /// Create a transport error with context.
    pub fn transport(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a decode error with context.
    pub fn decode(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error with context.
    pub fn store(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Store {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a cancellation error naming the stage that observed it.
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled(stage.into())
    }

    /// Re-wrap an error with additional context while keeping its kind.
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Transport {
                context: inner,
                message,
            } => Self::Transport {
                context: format!("{context}: {inner}"),
                message,
            },
            Self::Decode {
                context: inner,
                message,
            } => Self::Decode {
                context: format!("{context}: {inner}"),
                message,
            },
            Self::Store {
                context: inner,
                message,
            } => Self::Store {
                context: format!("{context}: {inner}"),
                message,
            },
            Self::Http(e) => Self::transport(context.to_string(), e),
            Self::Json(e) => Self::decode(context.to_string(), e),
            other => other,
        }
    }

    /// Classify the error into the pipeline taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::Transport { .. } | Self::PageLimit { .. } => {
                ErrorKind::Transport
            }
            Self::Json(_) | Self::Csv(_) | Self::Decode { .. } => ErrorKind::Decode,
            Self::Io(_) | Self::Store { .. } | Self::SnapshotGuard { .. } => ErrorKind::Store,
            Self::Toml(_) | Self::Url(_) | Self::Config(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}
