//! Data storage layer
//!
//! - `sqlite` - Catalog database, filter compilation and repositories
//! - `blobs` - Content-addressed image storage
//! - `error` - Unified error type for the engine

pub mod blobs;
pub mod error;
pub mod sqlite;

pub use blobs::BlobStore;
pub use error::{DataError, FilterError};
pub use sqlite::SqliteService;

use std::sync::Arc;

use crate::core::config::DatabaseConfig;
use crate::core::storage::AppStorage;

/// Catalog database service
///
/// `Detached` carries no backend at all. It is enough for compiling filters
/// (`explain`) but must never be asked for a pool.
pub enum TransactionalService {
    Sqlite(Arc<SqliteService>),
    Detached,
}

impl TransactionalService {
    /// Open the catalog database under `storage`
    pub async fn init(storage: &AppStorage, config: &DatabaseConfig) -> Result<Self, DataError> {
        let service = SqliteService::init(storage, config).await?;
        Ok(Self::Sqlite(Arc::new(service)))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached)
    }

    /// Get the SQLite pool
    ///
    /// # Panics
    /// Panics on a detached service. Running queries without a backend is a
    /// programming error, not a user error.
    pub fn pool(&self) -> &sqlx::SqlitePool {
        match self {
            Self::Sqlite(s) => s.pool(),
            Self::Detached => panic!("No catalog database configured for this service"),
        }
    }

    /// Close the database connection gracefully
    pub async fn close(&self) {
        if let Self::Sqlite(s) = self {
            s.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_service() {
        let service = TransactionalService::Detached;
        assert!(service.is_detached());
    }

    #[test]
    #[should_panic(expected = "No catalog database configured")]
    fn test_detached_pool_panics() {
        let _ = TransactionalService::Detached.pool();
    }

    #[tokio::test]
    async fn test_sqlite_service_pool() {
        let pool = crate::data::sqlite::fixtures::pool().await;
        let service = TransactionalService::Sqlite(Arc::new(SqliteService::from_pool(pool)));
        assert!(!service.is_detached());
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(service.pool())
            .await
            .unwrap();
        assert_eq!(one, 1);
        service.close().await;
    }
}
