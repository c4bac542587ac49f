//! Filtered, sorted and paginated id queries
//!
//! A page is two statements over the same compiled filter: the page of ids
//! (sorted, with `LIMIT`/`OFFSET`) and the total count. Both run inside one
//! read transaction so the count matches the page.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::table::{EntityRow, Table};
use crate::core::config::QueryConfig;
use crate::data::error::{DataError, FilterError};
use crate::data::sqlite::filters::builder::{SqlArg, SqlClause, and_clauses, or_clauses};
use crate::data::sqlite::filters::{
    CompiledFilter, EntityFilter, EntityKind, FilterBuilder, to_arguments,
};
use crate::utils::sql::{escape_like_pattern, search_words};

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(format!(
                "Invalid sort direction '{}'. Valid options: asc, desc",
                s
            )),
        }
    }
}

/// Search, sort and page selection for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    /// Free text; every word must appear in some search column
    pub q: Option<String>,
    pub sort: Option<String>,
    pub direction: SortDirection,
    /// 1-based; values below 1 are treated as 1. The offset saturates at
    /// `i64::MAX`, so any page past the last row is empty
    pub page: Option<i64>,
    /// `-1` returns every row; other positive values are clamped to
    /// `max_per_page`, and anything else uses `default_per_page`
    pub per_page: Option<i64>,
}

/// One page of ids in sort order plus the unpaginated total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub ids: Vec<i64>,
    pub count: i64,
}

/// Resolved `LIMIT`/`OFFSET`, or `None` for all rows
fn page_bounds(options: &FindOptions, config: &QueryConfig) -> Option<(i64, i64)> {
    let per_page = match options.per_page {
        Some(-1) => return None,
        Some(n) if n > 0 => n.min(config.max_per_page),
        _ => config.default_per_page,
    };
    let page = options.page.unwrap_or(1).max(1);
    Some((per_page, (page - 1).saturating_mul(per_page)))
}

// =============================================================================
// Per-entity search and sort
// =============================================================================

/// Columns (or correlated expressions) matched by `q`
fn search_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Scenes => &[
            "scenes.title",
            "scenes.details",
            "scenes.code",
            "scenes.director",
        ],
        EntityKind::Images => &["images.title", "images.details", "images.photographer"],
        EntityKind::Galleries => &[
            "galleries.title",
            "galleries.details",
            "galleries.photographer",
        ],
        EntityKind::Performers => &[
            "performers.name",
            "performers.disambiguation",
            "(SELECT GROUP_CONCAT(pa.alias, ' ') FROM performer_aliases pa WHERE pa.performer_id = performers.id)",
        ],
        EntityKind::Studios => &[
            "studios.name",
            "(SELECT GROUP_CONCAT(sa.alias, ' ') FROM studio_aliases sa WHERE sa.studio_id = studios.id)",
        ],
        EntityKind::Tags => &[
            "tags.name",
            "(SELECT GROUP_CONCAT(ta.alias, ' ') FROM tag_aliases ta WHERE ta.tag_id = tags.id)",
        ],
        EntityKind::Groups => &["groups.name", "groups.aliases", "groups.director"],
    }
}

/// Every word of `q` in at least one search column, `None` for blank input
fn search_clause(kind: EntityKind, q: &str) -> Option<SqlClause> {
    let words = search_words(q);
    if words.is_empty() {
        return None;
    }
    let columns = search_columns(kind);
    Some(and_clauses(
        words
            .iter()
            .map(|w| {
                let pattern = format!("%{}%", escape_like_pattern(w));
                or_clauses(
                    columns
                        .iter()
                        .map(|col| {
                            SqlClause::new(
                                format!("{} LIKE ? ESCAPE '\\'", col),
                                vec![pattern.clone().into()],
                            )
                        })
                        .collect(),
                )
            })
            .collect(),
    ))
}

fn relation_count(table: &str, join_table: &str, fk: &str) -> String {
    format!(
        "(SELECT COUNT(*) FROM {j} WHERE {j}.{fk} = {t}.id)",
        j = join_table,
        fk = fk,
        t = table
    )
}

/// Sort expression for a whitelisted key
fn sort_expr(kind: EntityKind, key: &str) -> Option<String> {
    let t = kind.table();
    let column = |c: &str| Some(format!("{}.{}", t, c));

    match key {
        "id" | "created_at" | "updated_at" => return column(key),
        _ => {}
    }
    if let Some(seed) = random_seed(key) {
        // multiplicative hash of the id, small enough to stay in i64
        return Some(format!(
            "(({}.id + {}) * 2654435761) % 4294967291",
            t,
            seed % 1_000_003
        ));
    }

    match (kind, key) {
        (EntityKind::Scenes | EntityKind::Images | EntityKind::Galleries, "title") => {
            Some(format!("{}.title COLLATE NOCASE", t))
        }
        (
            EntityKind::Performers | EntityKind::Studios | EntityKind::Tags | EntityKind::Groups,
            "name",
        ) => Some(format!("{}.name COLLATE NOCASE", t)),
        (
            EntityKind::Scenes | EntityKind::Images | EntityKind::Galleries | EntityKind::Groups,
            "date",
        ) => column("date"),
        (
            EntityKind::Scenes
            | EntityKind::Images
            | EntityKind::Galleries
            | EntityKind::Performers
            | EntityKind::Studios
            | EntityKind::Groups,
            "rating",
        ) => column("rating"),
        (EntityKind::Scenes | EntityKind::Images, "o_counter") => column("o_counter"),
        (EntityKind::Scenes, "play_count") => column("play_count"),
        (EntityKind::Scenes, "duration") => Some(
            "(SELECT MAX(vf.duration) FROM scenes_files sf \
             INNER JOIN video_files vf ON vf.file_id = sf.file_id WHERE sf.scene_id = scenes.id)"
                .to_string(),
        ),
        (EntityKind::Groups, "duration") => column("duration"),
        (EntityKind::Performers, "birthdate") => column("birthdate"),

        (EntityKind::Scenes, "tag_count") => Some(relation_count(t, "scenes_tags", "scene_id")),
        (EntityKind::Scenes, "performer_count") => {
            Some(relation_count(t, "performers_scenes", "scene_id"))
        }
        (EntityKind::Images, "tag_count") => Some(relation_count(t, "images_tags", "image_id")),
        (EntityKind::Images, "performer_count") => {
            Some(relation_count(t, "performers_images", "image_id"))
        }
        (EntityKind::Galleries, "tag_count") => {
            Some(relation_count(t, "galleries_tags", "gallery_id"))
        }
        (EntityKind::Galleries, "performer_count") => {
            Some(relation_count(t, "performers_galleries", "gallery_id"))
        }
        (EntityKind::Galleries, "image_count") => {
            Some(relation_count(t, "galleries_images", "gallery_id"))
        }
        (EntityKind::Performers, "scene_count") => {
            Some(relation_count(t, "performers_scenes", "performer_id"))
        }
        (EntityKind::Performers, "image_count") => {
            Some(relation_count(t, "performers_images", "performer_id"))
        }
        (EntityKind::Performers, "gallery_count") => {
            Some(relation_count(t, "performers_galleries", "performer_id"))
        }
        (EntityKind::Performers, "tag_count") => {
            Some(relation_count(t, "performers_tags", "performer_id"))
        }
        (EntityKind::Studios, "scene_count") => Some(relation_count(t, "scenes", "studio_id")),
        (EntityKind::Studios, "image_count") => Some(relation_count(t, "images", "studio_id")),
        (EntityKind::Studios, "gallery_count") => {
            Some(relation_count(t, "galleries", "studio_id"))
        }
        (EntityKind::Studios, "child_count") => Some(relation_count(t, "studios", "parent_id")),
        (EntityKind::Tags, "scene_count") => Some(relation_count(t, "scenes_tags", "tag_id")),
        (EntityKind::Tags, "image_count") => Some(relation_count(t, "images_tags", "tag_id")),
        (EntityKind::Tags, "gallery_count") => Some(relation_count(t, "galleries_tags", "tag_id")),
        (EntityKind::Tags, "performer_count") => {
            Some(relation_count(t, "performers_tags", "tag_id"))
        }
        (EntityKind::Tags, "studio_count") => Some(relation_count(t, "studios_tags", "tag_id")),
        (EntityKind::Tags, "group_count") => Some(relation_count(t, "groups_tags", "tag_id")),
        (EntityKind::Groups, "scene_count") => {
            Some(relation_count(t, "groups_scenes", "group_id"))
        }
        (EntityKind::Groups, "tag_count") => Some(relation_count(t, "groups_tags", "group_id")),
        _ => None,
    }
}

/// `random` draws a fresh seed; `random_<n>` repeats an earlier order
fn random_seed(key: &str) -> Option<i64> {
    if key == "random" {
        return Some(rand::random::<u32>() as i64);
    }
    key.strip_prefix("random_")?.parse::<i64>().ok()
}

fn default_sort_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Scenes | EntityKind::Images | EntityKind::Galleries => "title",
        EntityKind::Performers | EntityKind::Studios | EntityKind::Tags | EntityKind::Groups => {
            "name"
        }
    }
}

/// `ORDER BY` with the `id` tie-breaker that keeps pages stable
fn order_by(kind: EntityKind, options: &FindOptions) -> Result<String, DataError> {
    let key = options
        .sort
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(default_sort_key(kind));
    let expr = sort_expr(kind, key).ok_or_else(|| {
        DataError::Validation(FilterError::invalid_value(
            "sort",
            format!("unknown sort key '{}' for {}", key, kind),
        ))
    })?;
    Ok(format!(
        "ORDER BY {} {}, {}.id ASC",
        expr,
        options.direction.as_sql(),
        kind.table()
    ))
}

// =============================================================================
// Execution
// =============================================================================

/// Compile `filter` with the `q` search folded into the same statement
pub fn compile_query<F: EntityFilter>(
    filter: &F,
    q: Option<&str>,
) -> Result<CompiledFilter, DataError> {
    filter.validate(false).map_err(DataError::Validation)?;

    let mut f = FilterBuilder::new(F::KIND.table());
    let mut inner = f.sub_builder();
    filter.handle(&mut inner);
    f.and(inner);
    if let Some(search) = q.and_then(|q| search_clause(F::KIND, q)) {
        f.add_where_clause(search);
    }
    f.finish().map_err(DataError::Compile)
}

/// Run a filtered query and return the requested page of ids with the total.
pub async fn find_ids<F: EntityFilter>(
    pool: &SqlitePool,
    filter: &F,
    options: &FindOptions,
    config: &QueryConfig,
) -> Result<QueryResult, DataError> {
    let kind = F::KIND;
    let compiled = compile_query(filter, options.q.as_deref())?;
    let order = order_by(kind, options)?;

    let mut page_sql = format!("{} {}", compiled.to_sql(), order);
    let mut page_args = compiled.args();
    if let Some((limit, offset)) = page_bounds(options, config) {
        page_sql.push_str(" LIMIT ? OFFSET ?");
        page_args.push(SqlArg::Int(limit));
        page_args.push(SqlArg::Int(offset));
    }
    let count_sql = format!(
        "{}SELECT COUNT(*) FROM ({})",
        compiled.with_prefix(),
        compiled.body().sql
    );

    tracing::debug!(entity = %kind, sql = %page_sql, "Running filtered query");

    let context = |step: &str| format!("{}: {}", kind, step);
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DataError::execution(context("begin"), e))?;

    let args = to_arguments(&page_args).map_err(|e| DataError::execution(context("bind"), e))?;
    let ids: Vec<i64> = sqlx::query_scalar_with(&page_sql, args)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DataError::execution(context("find ids"), e))?;

    let args =
        to_arguments(&compiled.args()).map_err(|e| DataError::execution(context("bind"), e))?;
    let count: i64 = sqlx::query_scalar_with(&count_sql, args)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DataError::execution(context("count"), e))?;

    tx.commit()
        .await
        .map_err(|e| DataError::execution(context("commit"), e))?;

    tracing::debug!(entity = %kind, page = ids.len(), count, "Filtered query finished");
    Ok(QueryResult { ids, count })
}

/// Hydrate a page of ids, one lookup per id, in page order.
///
/// Ids deleted since the page was read are skipped.
pub async fn find_many(
    pool: &SqlitePool,
    kind: EntityKind,
    ids: &[i64],
) -> Result<Vec<EntityRow>, DataError> {
    let table = Table::new(kind);
    let mut rows = Vec::with_capacity(ids.len());
    for &id in ids {
        if let Some(row) = table.by_id(pool, id).await? {
            rows.push(row);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::filters::{PerformerFilter, SceneFilter, TagFilter};
    use crate::data::sqlite::fixtures::{self, filter};

    fn options(sort: &str, direction: SortDirection) -> FindOptions {
        FindOptions {
            sort: Some(sort.to_string()),
            direction,
            ..Default::default()
        }
    }

    #[test]
    fn test_page_bounds() {
        let config = QueryConfig {
            default_per_page: 25,
            max_per_page: 100,
        };
        let mut o = FindOptions::default();
        assert_eq!(page_bounds(&o, &config), Some((25, 0)));

        o.page = Some(3);
        o.per_page = Some(10);
        assert_eq!(page_bounds(&o, &config), Some((10, 20)));

        o.per_page = Some(5000);
        o.page = Some(0);
        assert_eq!(page_bounds(&o, &config), Some((100, 0)));

        o.per_page = Some(-1);
        assert_eq!(page_bounds(&o, &config), None);
    }

    #[test]
    fn test_page_bounds_saturate() {
        let config = QueryConfig::default();
        let o = FindOptions {
            page: Some(i64::MAX),
            per_page: Some(25),
            ..Default::default()
        };
        assert_eq!(page_bounds(&o, &config), Some((25, i64::MAX)));

        let o = FindOptions {
            page: Some(i64::MAX),
            per_page: Some(i64::MAX),
            ..Default::default()
        };
        assert_eq!(
            page_bounds(&o, &config),
            Some((config.max_per_page, i64::MAX))
        );

        let o = FindOptions {
            page: Some(i64::MIN),
            per_page: Some(i64::MIN),
            ..Default::default()
        };
        assert_eq!(page_bounds(&o, &config), Some((config.default_per_page, 0)));
    }

    #[test]
    fn test_unknown_sort_is_validation_error() {
        let err = order_by(EntityKind::Tags, &options("title", SortDirection::Asc)).unwrap_err();
        assert!(matches!(
            err,
            DataError::Validation(FilterError::InvalidValue { .. })
        ));
        assert!(order_by(EntityKind::Tags, &options("scene_count", SortDirection::Desc)).is_ok());
    }

    #[test]
    fn test_random_seed_is_repeatable() {
        assert_eq!(random_seed("random_42"), Some(42));
        assert_eq!(random_seed("random_x"), None);
        assert!(random_seed("random").is_some());
        assert_eq!(
            sort_expr(EntityKind::Scenes, "random_7"),
            sort_expr(EntityKind::Scenes, "random_7")
        );
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[tokio::test]
    async fn test_pages_and_count() {
        let pool = fixtures::pool().await;
        let mut expected = Vec::new();
        for name in ["e", "d", "c", "b", "a"] {
            expected.push(fixtures::tag(&pool, name).await);
        }
        expected.reverse();
        let config = QueryConfig::default();

        let mut o = options("name", SortDirection::Asc);
        o.per_page = Some(2);
        o.page = Some(2);
        let page = find_ids(&pool, &TagFilter::default(), &o, &config)
            .await
            .unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.ids, expected[2..4].to_vec());

        o.page = Some(9);
        let page = find_ids(&pool, &TagFilter::default(), &o, &config)
            .await
            .unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.count, 5);

        o.page = Some(i64::MAX);
        o.per_page = Some(25);
        let page = find_ids(&pool, &TagFilter::default(), &o, &config)
            .await
            .unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.count, 5);

        o.page = Some(1);
        o.per_page = Some(config.max_per_page + 1);
        let page = find_ids(&pool, &TagFilter::default(), &o, &config)
            .await
            .unwrap();
        assert_eq!(page.ids, expected);

        o.per_page = Some(-1);
        o.direction = SortDirection::Desc;
        let page = find_ids(&pool, &TagFilter::default(), &o, &config)
            .await
            .unwrap();
        let mut reversed = expected.clone();
        reversed.reverse();
        assert_eq!(page.ids, reversed);
    }

    #[tokio::test]
    async fn test_count_matches_grouped_filter() {
        let pool = fixtures::pool().await;
        let t1 = fixtures::tag(&pool, "T1").await;
        let t2 = fixtures::tag(&pool, "T2").await;
        let s1 = fixtures::scene(&pool, "S1").await;
        let s2 = fixtures::scene(&pool, "S2").await;
        let s3 = fixtures::scene(&pool, "S3").await;
        fixtures::tag_scene(&pool, s1, t1).await;
        fixtures::tag_scene(&pool, s2, t1).await;
        fixtures::tag_scene(&pool, s2, t2).await;
        fixtures::tag_scene(&pool, s3, t2).await;

        let f: SceneFilter = filter(&format!(
            r#"{{"tags": {{"value": [{}, {}], "modifier": "INCLUDES_ALL"}}}}"#,
            t1, t2
        ));
        let result = find_ids(&pool, &f, &FindOptions::default(), &QueryConfig::default())
            .await
            .unwrap();
        assert_eq!(result.ids, vec![s2]);
        assert_eq!(result.count, 1);

        let o = options("tag_count", SortDirection::Desc);
        let result = find_ids(&pool, &SceneFilter::default(), &o, &QueryConfig::default())
            .await
            .unwrap();
        assert_eq!(result.ids, vec![s2, s1, s3]);
    }

    #[tokio::test]
    async fn test_search_words_and_like_escaping() {
        let pool = fixtures::pool().await;
        let a = fixtures::performer(&pool, "Jane Doe").await;
        let b = fixtures::performer(&pool, "100% Real").await;
        fixtures::performer(&pool, "1000 Real").await;
        fixtures::exec(
            &pool,
            &format!(
                "INSERT INTO performer_aliases (performer_id, alias) VALUES ({}, 'Janie')",
                a
            ),
        )
        .await;
        let config = QueryConfig::default();

        let mut o = FindOptions {
            q: Some("janie doe".to_string()),
            ..Default::default()
        };
        let result = find_ids(&pool, &PerformerFilter::default(), &o, &config)
            .await
            .unwrap();
        assert_eq!(result.ids, vec![a]);

        o.q = Some("100%".to_string());
        let result = find_ids(&pool, &PerformerFilter::default(), &o, &config)
            .await
            .unwrap();
        assert_eq!(result.ids, vec![b]);
    }

    #[tokio::test]
    async fn test_find_many_keeps_order_and_skips_missing() {
        let pool = fixtures::pool().await;
        let a = fixtures::scene(&pool, "A").await;
        let b = fixtures::scene(&pool, "B").await;

        let rows = find_many(&pool, EntityKind::Scenes, &[b, a + 1000, a])
            .await
            .unwrap();
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_deref()).collect();
        assert_eq!(labels, vec![Some("B"), Some("A")]);
    }

    #[tokio::test]
    async fn test_search_combines_with_or_filter() {
        let pool = fixtures::pool().await;
        let a = fixtures::scene(&pool, "alpha beach").await;
        fixtures::scene(&pool, "beta beach").await;
        fixtures::scene(&pool, "alpha forest").await;

        let f: SceneFilter = filter(
            r#"{"title": {"value": "beach", "modifier": "INCLUDES"},
                "or": {"title": {"value": "forest", "modifier": "INCLUDES"}}}"#,
        );
        let o = FindOptions {
            q: Some("alpha".to_string()),
            sort: Some("title".to_string()),
            ..Default::default()
        };
        let result = find_ids(&pool, &f, &o, &QueryConfig::default())
            .await
            .unwrap();
        assert_eq!(result.count, 2);
        assert_eq!(result.ids[0], a);
    }
}
