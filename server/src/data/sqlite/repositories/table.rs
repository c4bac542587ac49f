//! Per-entity table primitives
//!
//! Single-row lookups and updates over one entity table. Query results are
//! hydrated through `by_id`, one lookup per id.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::data::error::{DataError, FilterError};
use crate::data::sqlite::filters::{EntityKind, SqlArg, to_arguments};

/// The common columns of any catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct EntityRow {
    pub id: i64,
    /// `title` for scenes, images and galleries, `name` otherwise
    pub label: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    kind: EntityKind,
}

impl Table {
    pub const fn new(kind: EntityKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn label_column(&self) -> &'static str {
        match self.kind {
            EntityKind::Scenes | EntityKind::Images | EntityKind::Galleries => "title",
            _ => "name",
        }
    }

    /// Columns `update_by_id` may write
    fn updatable_columns(&self) -> &'static [&'static str] {
        match self.kind {
            EntityKind::Scenes => &[
                "title", "code", "details", "director", "date", "rating", "organized",
                "o_counter", "studio_id", "resume_time", "play_duration", "play_count",
                "cover_blob",
            ],
            EntityKind::Images => &[
                "title", "code", "details", "photographer", "date", "rating", "organized",
                "o_counter", "studio_id",
            ],
            EntityKind::Galleries => &[
                "title", "code", "details", "photographer", "date", "rating", "organized",
                "studio_id", "folder_id",
            ],
            EntityKind::Performers => &[
                "name", "disambiguation", "gender", "url", "birthdate", "death_date",
                "ethnicity", "country", "eye_color", "hair_color", "height", "weight",
                "measurements", "fake_tits", "penis_length", "circumcised", "career_length",
                "tattoos", "piercings", "favorite", "rating", "details", "ignore_auto_tag",
                "image_blob",
            ],
            EntityKind::Studios => &[
                "name", "url", "parent_id", "rating", "favorite", "details", "ignore_auto_tag",
                "image_blob",
            ],
            EntityKind::Tags => &[
                "name", "description", "favorite", "ignore_auto_tag", "image_blob",
            ],
            EntityKind::Groups => &[
                "name", "aliases", "duration", "date", "rating", "studio_id", "director",
                "synopsis", "front_image_blob", "back_image_blob",
            ],
        }
    }

    /// Fetch one row; a missing id is `None`, not an error
    pub async fn by_id(&self, pool: &SqlitePool, id: i64) -> Result<Option<EntityRow>, DataError> {
        let sql = format!(
            "SELECT id, {label} AS label, created_at, updated_at FROM {t} WHERE id = ?",
            label = self.label_column(),
            t = self.kind.table()
        );
        sqlx::query_as::<_, EntityRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| DataError::execution(format!("{}: by id", self.kind), e))
    }

    pub async fn exists(&self, pool: &SqlitePool, id: i64) -> Result<bool, DataError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
            self.kind.table()
        );
        let found: bool = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(|e| DataError::execution(format!("{}: exists", self.kind), e))?;
        Ok(found)
    }

    /// `NotFound` unless the row exists
    pub async fn check_id_exists(&self, pool: &SqlitePool, id: i64) -> Result<(), DataError> {
        if self.exists(pool, id).await? {
            Ok(())
        } else {
            Err(DataError::not_found(self.kind.table(), id))
        }
    }

    /// Set whitelisted columns on one row and bump `updated_at`.
    ///
    /// Unknown columns are rejected before anything is written; a missing
    /// row is `NotFound`.
    pub async fn update_by_id(
        &self,
        pool: &SqlitePool,
        id: i64,
        fields: &[(&str, SqlArg)],
    ) -> Result<(), DataError> {
        let allowed = self.updatable_columns();
        if let Some((column, _)) = fields.iter().find(|(c, _)| !allowed.iter().any(|a| a == c)) {
            return Err(DataError::Validation(FilterError::invalid_value(
                column,
                format!("not an updatable column of {}", self.kind),
            )));
        }

        let mut assignments: Vec<String> =
            fields.iter().map(|(c, _)| format!("{} = ?", c)).collect();
        assignments.push("updated_at = CURRENT_TIMESTAMP".to_string());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            self.kind.table(),
            assignments.join(", ")
        );

        let mut args: Vec<SqlArg> = fields.iter().map(|(_, v)| v.clone()).collect();
        args.push(SqlArg::Int(id));
        let context = format!("{}: update", self.kind);
        let arguments = to_arguments(&args).map_err(|e| DataError::execution(&context, e))?;

        let result = sqlx::query_with(&sql, arguments)
            .execute(pool)
            .await
            .map_err(|e| DataError::execution(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(DataError::not_found(self.kind.table(), id));
        }
        tracing::debug!(entity = %self.kind, id, fields = fields.len(), "Row updated");
        Ok(())
    }
}
