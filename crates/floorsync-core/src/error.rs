//! Error types for floorsync-core

use thiserror::Error;

/// Result type alias using floorsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in floorsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent byte store failed to load or save
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted blob could not be decoded
    #[error("Persisted store is corrupted: {0}")]
    Corrupted(String),
}
