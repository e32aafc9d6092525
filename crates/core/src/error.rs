//! Core error types

use thiserror::Error;

/// Core error type for Portcullis
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key-value store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite backend error
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Alias used across the workspace.
pub type Error = CoreError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
