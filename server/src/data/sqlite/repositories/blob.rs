//! Blob repository for SQLite operations

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;

/// Entity columns holding a blob checksum, as (table, column)
pub const BLOB_REFERENCES: [(&str, &str); 6] = [
    ("scenes", "cover_blob"),
    ("performers", "image_blob"),
    ("studios", "image_blob"),
    ("tags", "image_blob"),
    ("groups", "front_image_blob"),
    ("groups", "back_image_blob"),
];

/// Record a blob row, with bytes when stored in the database.
///
/// A checksum already present keeps its row; missing bytes are filled in.
pub async fn upsert_blob(
    pool: &SqlitePool,
    checksum: &str,
    data: Option<&[u8]>,
) -> Result<(), SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO blobs (checksum, blob) VALUES (?, ?)
        ON CONFLICT(checksum) DO UPDATE SET blob = COALESCE(blobs.blob, excluded.blob)
        "#,
    )
    .bind(checksum)
    .bind(data)
    .execute(pool)
    .await?;
    Ok(())
}

/// `None` when no row exists; `Some(None)` when the bytes live elsewhere
pub async fn get_blob(
    pool: &SqlitePool,
    checksum: &str,
) -> Result<Option<Option<Vec<u8>>>, SqliteError> {
    let row: Option<(Option<Vec<u8>>,)> =
        sqlx::query_as("SELECT blob FROM blobs WHERE checksum = ?")
            .bind(checksum)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(blob,)| blob))
}

/// Delete a blob row.
///
/// The delete runs under a savepoint. A foreign key violation rolls back to
/// it and returns `Constraint`, leaving the row in place. Returns `false`
/// when no row existed.
pub async fn delete_blob(pool: &SqlitePool, checksum: &str) -> Result<bool, SqliteError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SAVEPOINT blob_delete").execute(&mut *tx).await?;
    let deleted = match sqlx::query("DELETE FROM blobs WHERE checksum = ?")
        .bind(checksum)
        .execute(&mut *tx)
        .await
        .map_err(SqliteError::from)
    {
        Ok(result) => result.rows_affected() > 0,
        Err(e) if e.is_foreign_key_violation() => {
            sqlx::query("ROLLBACK TO SAVEPOINT blob_delete")
                .execute(&mut *tx)
                .await?;
            return Err(SqliteError::Constraint(format!(
                "blob {} is still referenced",
                checksum
            )));
        }
        Err(e) => return Err(e),
    };
    sqlx::query("RELEASE SAVEPOINT blob_delete")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(deleted)
}

/// Number of entity columns pointing at `checksum`
pub async fn reference_count(pool: &SqlitePool, checksum: &str) -> Result<i64, SqliteError> {
    let counts = BLOB_REFERENCES
        .iter()
        .map(|(table, column)| format!("(SELECT COUNT(*) FROM {} WHERE {} = ?)", table, column))
        .collect::<Vec<_>>();
    let sql = format!("SELECT {}", counts.join(" + "));

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for _ in BLOB_REFERENCES {
        query = query.bind(checksum);
    }
    Ok(query.fetch_one(pool).await?)
}
