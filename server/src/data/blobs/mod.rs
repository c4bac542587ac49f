//! Content-addressed blob store
//!
//! Images referenced by catalog rows (`image_blob`, `cover_blob`, ...) are
//! stored once per MD5 checksum. The `blobs` table always holds a row per
//! checksum so entity columns can reference it; the bytes live in that row,
//! on disk, or both, depending on `BlobStorageMode`.

mod error;
mod filesystem;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;

pub use error::BlobStorageError;
pub use filesystem::FilesystemBlobStorage;
pub use storage::{BlobStorage, checksum_of, validate_checksum};

use crate::core::config::{BlobStorageMode, BlobsConfig};
use crate::data::error::DataError;
use crate::data::sqlite::repositories::blob;

pub struct BlobStore {
    pool: SqlitePool,
    mode: BlobStorageMode,
    files: Option<Arc<dyn BlobStorage>>,
}

impl BlobStore {
    /// `default_dir` is used for on-disk blobs when the config sets no path
    pub fn new(pool: SqlitePool, config: &BlobsConfig, default_dir: PathBuf) -> Self {
        let files = config.storage.uses_filesystem().then(|| {
            let dir = config.path.clone().unwrap_or(default_dir);
            tracing::debug!(path = %dir.display(), mode = %config.storage, "Blob filesystem storage");
            Arc::new(FilesystemBlobStorage::new(dir)) as Arc<dyn BlobStorage>
        });
        Self {
            pool,
            mode: config.storage,
            files,
        }
    }

    pub fn mode(&self) -> BlobStorageMode {
        self.mode
    }

    /// Store `data` and return its checksum; storing the same bytes twice is a no-op
    pub async fn write(&self, data: &[u8]) -> Result<String, DataError> {
        let checksum = checksum_of(data);
        if let Some(files) = &self.files {
            files.store(&checksum, data).await?;
        }
        let bytes = self.mode.uses_database().then_some(data);
        blob::upsert_blob(&self.pool, &checksum, bytes).await?;
        tracing::debug!(checksum = %checksum, size = data.len(), "Blob written");
        Ok(checksum)
    }

    /// Bytes for `checksum`; `NotFound` when nothing is stored under it
    pub async fn read(&self, checksum: &str) -> Result<Vec<u8>, DataError> {
        validate_checksum(checksum)?;
        match blob::get_blob(&self.pool, checksum).await? {
            Some(Some(bytes)) => return Ok(bytes),
            Some(None) => {}
            None => return Err(DataError::not_found("blob", checksum)),
        }
        let Some(files) = &self.files else {
            return Err(DataError::not_found("blob", checksum));
        };
        files.get(checksum).await.map_err(|e| match e {
            BlobStorageError::NotFound(_) => DataError::not_found("blob", checksum),
            other => other.into(),
        })
    }

    /// Delete `checksum` unless an entity still references it.
    ///
    /// Returns `false` without touching anything when the blob is still
    /// referenced or does not exist.
    pub async fn delete(&self, checksum: &str) -> Result<bool, DataError> {
        validate_checksum(checksum)?;
        match blob::delete_blob(&self.pool, checksum).await.map_err(DataError::from) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(DataError::Constraint(reason)) => {
                tracing::debug!(checksum, reason = %reason, "Blob delete skipped");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        if let Some(files) = &self.files {
            files.delete(checksum).await?;
        }
        tracing::debug!(checksum, "Blob deleted");
        Ok(true)
    }

    pub async fn reference_count(&self, checksum: &str) -> Result<i64, DataError> {
        Ok(blob::reference_count(&self.pool, checksum).await?)
    }
}
