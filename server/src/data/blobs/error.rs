//! Blob storage error types

use thiserror::Error;

/// Errors from the blob storage backends
#[derive(Error, Debug)]
pub enum BlobStorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid checksum '{0}': expected 32 hex characters")]
    InvalidChecksum(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
