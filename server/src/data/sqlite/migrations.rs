//! Catalog schema migrations
//!
//! Every migration is recorded in `schema_migrations` with a SHA-256 of its
//! SQL; `schema_version` holds the highest applied version. A recorded
//! checksum that no longer matches the compiled-in SQL is logged, not fatal.

use sqlx::{Sqlite, SqlitePool, Transaction};

use super::error::SqliteError;
use super::schema::{SCHEMA, SCHEMA_VERSION};
use crate::utils::crypto::sha256_hex;

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

/// In version order; the last entry is `SCHEMA_VERSION`
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "catalog_schema",
    sql: SCHEMA,
}];

/// Bring the catalog up to `SCHEMA_VERSION`
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteError> {
    let applied = applied_migrations(pool).await?;

    for migration in MIGRATIONS {
        match applied.iter().find(|(v, _)| *v == migration.version) {
            Some((_, checksum)) => {
                if *checksum != sha256_hex(migration.sql) {
                    tracing::warn!(
                        version = migration.version,
                        name = migration.name,
                        "Applied migration differs from the bundled SQL"
                    );
                }
            }
            None => apply(pool, migration).await?,
        }
    }

    tracing::debug!(version = SCHEMA_VERSION, "Catalog schema ready");
    Ok(())
}

/// (version, checksum) of every recorded migration; empty on a fresh database
async fn applied_migrations(pool: &SqlitePool) -> Result<Vec<(i32, String)>, SqliteError> {
    let has_ledger: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
    )
    .fetch_one(pool)
    .await?;
    if !has_ledger {
        return Ok(Vec::new());
    }

    Ok(
        sqlx::query_as("SELECT version, checksum FROM schema_migrations ORDER BY version")
            .fetch_all(pool)
            .await?,
    )
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<(), SqliteError> {
    let start = std::time::Instant::now();
    let failed = |e: sqlx::Error| SqliteError::MigrationFailed {
        version: migration.version,
        name: migration.name.to_string(),
        error: e.to_string(),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(migration.sql)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    record(&mut tx, migration, start.elapsed().as_millis() as i64).await?;
    tx.commit().await?;

    tracing::debug!(
        version = migration.version,
        name = migration.name,
        elapsed_ms = start.elapsed().as_millis() as i64,
        "Migration applied"
    );
    Ok(())
}

async fn record(
    tx: &mut Transaction<'_, Sqlite>,
    migration: &Migration,
    elapsed_ms: i64,
) -> Result<(), SqliteError> {
    let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);

    sqlx::query(
        r#"
        INSERT INTO schema_version (id, version, applied_at, description) VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            version = MAX(schema_version.version, excluded.version),
            applied_at = excluded.applied_at,
            description = excluded.description
        "#,
    )
    .bind(migration.version)
    .bind(now)
    .bind(migration.name)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO schema_migrations (version, name, applied_at, checksum, execution_time_ms) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(migration.version)
    .bind(migration.name)
    .bind(now)
    .bind(sha256_hex(migration.sql))
    .bind(elapsed_ms)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[test]
    fn test_last_migration_is_schema_version() {
        assert_eq!(MIGRATIONS.last().map(|m| m.version), Some(SCHEMA_VERSION));
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[tokio::test]
    async fn test_fresh_database_records_schema() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let version: i32 = sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let applied = applied_migrations(&pool).await.unwrap();
        assert_eq!(applied, vec![(1, sha256_hex(SCHEMA))]);
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_checksum_drift_is_not_fatal() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        sqlx::query("UPDATE schema_migrations SET checksum = 'stale'")
            .execute(&pool)
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
    }
}
