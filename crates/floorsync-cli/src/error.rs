use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] floorsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Record type cannot be empty")]
    EmptyRecordType,
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Failed to resolve a data directory; pass --data-dir or set FLOORSYNC_DATA_DIR")]
    NoDataDir,
    #[error("Refusing to clear storage without --yes")]
    ConfirmationRequired,
    #[error("Sync is not configured. Pass --endpoint or set FLOORSYNC_ENDPOINT.")]
    SyncNotConfigured,
}
