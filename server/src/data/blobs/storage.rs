//! Blob storage trait definition

use async_trait::async_trait;

use super::error::BlobStorageError;
use crate::utils::crypto::{is_md5_hex, md5_hex};

/// A content-addressed byte store keyed by MD5 checksum.
///
/// Implementations must be thread-safe (Send + Sync) for use in async contexts.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store bytes under `checksum`; a no-op if they are already present
    async fn store(&self, checksum: &str, data: &[u8]) -> Result<(), BlobStorageError>;

    /// Bytes for `checksum`, or `NotFound`
    async fn get(&self, checksum: &str) -> Result<Vec<u8>, BlobStorageError>;

    async fn exists(&self, checksum: &str) -> Result<bool, BlobStorageError>;

    /// Remove `checksum`; does not fail if it is absent
    async fn delete(&self, checksum: &str) -> Result<(), BlobStorageError>;
}

/// Reject anything but a lowercase or uppercase 32-char hex digest
pub fn validate_checksum(checksum: &str) -> Result<(), BlobStorageError> {
    if !is_md5_hex(checksum) {
        return Err(BlobStorageError::InvalidChecksum(checksum.to_string()));
    }
    Ok(())
}

/// MD5 hex digest of `data`
pub fn checksum_of(data: &[u8]) -> String {
    md5_hex(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_empty() {
        assert_eq!(checksum_of(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_validate_checksum() {
        assert!(validate_checksum("d41d8cd98f00b204e9800998ecf8427e").is_ok());
        assert!(validate_checksum("d41d8cd9").is_err());
        assert!(validate_checksum("../../../../etc/passwd-000000000").is_err());
    }
}
