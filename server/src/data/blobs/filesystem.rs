//! Filesystem blob storage
//!
//! Blobs are sharded by checksum prefix:
//! `{base_path}/{checksum[0:2]}/{checksum[2:4]}/{checksum}`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::error::BlobStorageError;
use super::storage::{BlobStorage, validate_checksum};

#[derive(Debug, Clone)]
pub struct FilesystemBlobStorage {
    base_path: PathBuf,
}

impl FilesystemBlobStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn blob_path(&self, checksum: &str) -> PathBuf {
        self.base_path
            .join(&checksum[0..2])
            .join(&checksum[2..4])
            .join(checksum)
    }

    /// Remove now-empty shard directories, stopping at the base path
    async fn cleanup_empty_parents(&self, blob_path: &Path) {
        let mut current = blob_path.parent();
        while let Some(dir) = current {
            if dir == self.base_path || !dir.starts_with(&self.base_path) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            tracing::trace!(path = %dir.display(), "Removed empty shard directory");
            current = dir.parent();
        }
    }
}

#[async_trait]
impl BlobStorage for FilesystemBlobStorage {
    async fn store(&self, checksum: &str, data: &[u8]) -> Result<(), BlobStorageError> {
        validate_checksum(checksum)?;
        let path = self.blob_path(checksum);
        if fs::try_exists(&path).await? {
            tracing::trace!(checksum, "Blob already on disk");
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // write then rename so readers never see a partial blob
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(checksum, size = data.len(), path = %path.display(), "Blob stored");
        Ok(())
    }

    async fn get(&self, checksum: &str) -> Result<Vec<u8>, BlobStorageError> {
        validate_checksum(checksum)?;
        fs::read(self.blob_path(checksum)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobStorageError::NotFound(checksum.to_string())
            } else {
                BlobStorageError::Io(e)
            }
        })
    }

    async fn exists(&self, checksum: &str) -> Result<bool, BlobStorageError> {
        validate_checksum(checksum)?;
        Ok(fs::try_exists(self.blob_path(checksum)).await?)
    }

    async fn delete(&self, checksum: &str) -> Result<(), BlobStorageError> {
        validate_checksum(checksum)?;
        let path = self.blob_path(checksum);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(checksum, "Blob file deleted");
                self.cleanup_empty_parents(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
