// File: pos-sync/src/error.rs
// Purpose: Error types for the sync engine

use thiserror::Error;

/// Errors raised by a key-value store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed for key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode value for key `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while talking to the remote sync endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("remote rejected batch: {reason}")]
    Rejected { reason: String },
    #[error("failed to build request body: {0}")]
    Encode(String),
}

/// Errors surfaced by the public coordinator API
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
