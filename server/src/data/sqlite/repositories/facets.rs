//! Facet counts over a filtered result set
//!
//! The entity's compiled filter is embedded once as `filtered_<entity>` and
//! every cheap dimension is one `UNION ALL` member of a single batched
//! statement sharing the row shape `(facet_type, id, label, enum_value,
//! count)`. Expensive scene dimensions run as separate tasks against the
//! same CTE and are skipped unless requested.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::task::{self, JoinSet};

use crate::core::config::FacetsConfig;
use crate::data::error::DataError;
use crate::data::sqlite::filters::types::{EnumValue, Resolution};
use crate::data::sqlite::filters::{
    CompiledFilter, EntityFilter, EntityKind, SqlArg, compile, to_arguments,
};

// =============================================================================
// Result types
// =============================================================================

/// Count for one related row (tag, performer, studio, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub id: i64,
    pub label: String,
    pub count: i64,
}

/// Count for one enum value (resolution, gender, caption language, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueFacetCount {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BooleanFacetCount {
    pub value: bool,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingFacetCount {
    pub rating: i64,
    pub count: i64,
}

/// Every dimension any entity can produce; unused ones stay empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetResult {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performers: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub studios: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performer_tags: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resolutions: Vec<ValueFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orientations: Vec<ValueFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genders: Vec<ValueFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<ValueFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub circumcised: Vec<ValueFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub captions: Vec<ValueFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub organized: Vec<BooleanFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interactive: Vec<BooleanFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub favorite: Vec<BooleanFacetCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ratings: Vec<RatingFacetCount>,
}

/// Expensive dimensions, off unless asked for. Scenes only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetOptions {
    pub include_performer_tags: bool,
    pub include_captions: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct FacetRow {
    facet_type: String,
    id: i64,
    label: Option<String>,
    enum_value: Option<String>,
    count: i64,
}

impl FacetResult {
    fn push(&mut self, row: FacetRow) {
        let FacetRow {
            facet_type,
            id,
            label,
            enum_value,
            count,
        } = row;
        let labeled = FacetCount {
            id,
            label: label.unwrap_or_default(),
            count,
        };
        match facet_type.as_str() {
            "tag" => self.tags.push(labeled),
            "performer" => self.performers.push(labeled),
            "studio" => self.studios.push(labeled),
            "group" => self.groups.push(labeled),
            "parent" => self.parents.push(labeled),
            "child" => self.children.push(labeled),
            "performer_tag" => self.performer_tags.push(labeled),
            kind => {
                let Some(value) = enum_value else { return };
                match kind {
                    "resolution" if Resolution::from_str_value(&value).is_some() => {
                        self.resolutions.push(ValueFacetCount { value, count })
                    }
                    "orientation" => self.orientations.push(ValueFacetCount { value, count }),
                    "gender" => self.genders.push(ValueFacetCount { value, count }),
                    "country" => self.countries.push(ValueFacetCount { value, count }),
                    "circumcised" => self.circumcised.push(ValueFacetCount { value, count }),
                    "caption" => self.captions.push(ValueFacetCount { value, count }),
                    "organized" => self.organized.push(BooleanFacetCount {
                        value: value == "true",
                        count,
                    }),
                    "interactive" => self.interactive.push(BooleanFacetCount {
                        value: value == "true",
                        count,
                    }),
                    "favorite" => self.favorite.push(BooleanFacetCount {
                        value: value == "true",
                        count,
                    }),
                    "rating" => {
                        if let Ok(rating) = value.parse() {
                            self.ratings.push(RatingFacetCount { rating, count });
                        }
                    }
                    other => tracing::warn!(facet_type = other, "Unknown facet row"),
                }
            }
        }
    }

    /// Count descending per dimension; stable, so ties keep backend order
    fn sort(&mut self) {
        for v in [
            &mut self.tags,
            &mut self.performers,
            &mut self.studios,
            &mut self.groups,
            &mut self.parents,
            &mut self.children,
            &mut self.performer_tags,
        ] {
            v.sort_by(|a, b| b.count.cmp(&a.count));
        }
        for v in [
            &mut self.resolutions,
            &mut self.orientations,
            &mut self.genders,
            &mut self.countries,
            &mut self.circumcised,
            &mut self.captions,
        ] {
            v.sort_by(|a, b| b.count.cmp(&a.count));
        }
        for v in [&mut self.organized, &mut self.interactive, &mut self.favorite] {
            v.sort_by(|a, b| b.count.cmp(&a.count));
        }
        self.ratings.sort_by(|a, b| b.count.cmp(&a.count));
    }
}

// =============================================================================
// Dimension SQL
// =============================================================================

/// One `UNION ALL` member; `limited` members take a `LIMIT ?`
struct Dimension {
    sql: String,
    limited: bool,
}

/// Rows linked through a join table, e.g. scene tags via `scenes_tags`
fn linked(
    facet: &str,
    src: &str,
    join_table: &str,
    entity_fk: &str,
    target: &str,
    target_fk: &str,
) -> Dimension {
    Dimension {
        sql: format!(
            "SELECT '{facet}' AS facet_type, x.id AS id, x.name AS label, NULL AS enum_value, \
             COUNT(DISTINCT j.{efk}) AS count \
             FROM {src} f INNER JOIN {jt} j ON j.{efk} = f.id \
             INNER JOIN {target} x ON x.id = j.{tfk} \
             GROUP BY x.id ORDER BY count DESC",
            facet = facet,
            src = src,
            jt = join_table,
            efk = entity_fk,
            target = target,
            tfk = target_fk
        ),
        limited: true,
    }
}

/// Rows referenced by a column of the entity itself, e.g. `scenes.studio_id`
fn owned(facet: &str, src: &str, table: &str, column: &str, target: &str) -> Dimension {
    Dimension {
        sql: format!(
            "SELECT '{facet}' AS facet_type, x.id AS id, x.name AS label, NULL AS enum_value, \
             COUNT(DISTINCT e.id) AS count \
             FROM {src} f INNER JOIN {table} e ON e.id = f.id \
             INNER JOIN {target} x ON x.id = e.{column} \
             GROUP BY x.id ORDER BY count DESC",
            facet = facet,
            src = src,
            table = table,
            target = target,
            column = column
        ),
        limited: true,
    }
}

/// Buckets of an expression over the entity row
fn valued(facet: &str, src: &str, table: &str, expr: &str, cond: Option<&str>) -> Dimension {
    let cond = cond.map(|c| format!(" WHERE {}", c)).unwrap_or_default();
    Dimension {
        sql: format!(
            "SELECT '{facet}' AS facet_type, 0 AS id, NULL AS label, {expr} AS enum_value, \
             COUNT(DISTINCT e.id) AS count \
             FROM {src} f INNER JOIN {table} e ON e.id = f.id{cond} \
             GROUP BY enum_value",
            facet = facet,
            src = src,
            table = table,
            expr = expr,
            cond = cond
        ),
        limited: false,
    }
}

fn boolean(facet: &str, src: &str, table: &str, column: &str) -> Dimension {
    valued(
        facet,
        src,
        table,
        &format!("CASE WHEN e.{} = 1 THEN 'true' ELSE 'false' END", column),
        None,
    )
}

fn rating(src: &str, table: &str) -> Dimension {
    valued(
        "rating",
        src,
        table,
        "CAST(e.rating AS TEXT)",
        Some("e.rating IS NOT NULL"),
    )
}

fn text_value(facet: &str, src: &str, table: &str, column: &str) -> Dimension {
    valued(
        facet,
        src,
        table,
        &format!("e.{}", column),
        Some(&format!("e.{c} IS NOT NULL AND e.{c} != ''", c = column)),
    )
}

/// Buckets of an expression over the primary file's media row
fn primary_file(
    facet: &str,
    src: &str,
    files_table: &str,
    entity_fk: &str,
    media_table: &str,
    expr: &str,
) -> Dimension {
    Dimension {
        sql: format!(
            "SELECT '{facet}' AS facet_type, 0 AS id, NULL AS label, {expr} AS enum_value, \
             COUNT(DISTINCT j.{efk}) AS count \
             FROM {src} f INNER JOIN {ft} j ON j.{efk} = f.id AND j.\"primary\" = 1 \
             INNER JOIN {mt} m ON m.file_id = j.file_id \
             GROUP BY enum_value HAVING enum_value IS NOT NULL",
            facet = facet,
            src = src,
            ft = files_table,
            efk = entity_fk,
            mt = media_table,
            expr = expr
        ),
        limited: false,
    }
}

/// Resolution bucket of the shorter side, matching the resolution criterion
fn resolution_case() -> String {
    let whens: Vec<String> = Resolution::ALL
        .iter()
        .rev()
        .map(|r| {
            format!(
                "WHEN MIN(m.width, m.height) >= {} THEN '{}'",
                r.min(),
                r.as_str()
            )
        })
        .collect();
    format!("CASE {} ELSE NULL END", whens.join(" "))
}

const ORIENTATION_CASE: &str = "CASE WHEN m.width > m.height THEN 'LANDSCAPE' \
     WHEN m.width < m.height THEN 'PORTRAIT' ELSE 'SQUARE' END";

fn dimensions(kind: EntityKind, src: &str) -> Vec<Dimension> {
    let t = kind.table();
    match kind {
        EntityKind::Scenes => vec![
            linked("tag", src, "scenes_tags", "scene_id", "tags", "tag_id"),
            linked("performer", src, "performers_scenes", "scene_id", "performers", "performer_id"),
            owned("studio", src, t, "studio_id", "studios"),
            linked("group", src, "groups_scenes", "scene_id", "groups", "group_id"),
            primary_file("resolution", src, "scenes_files", "scene_id", "video_files", &resolution_case()),
            primary_file("orientation", src, "scenes_files", "scene_id", "video_files", ORIENTATION_CASE),
            boolean("organized", src, t, "organized"),
            primary_file(
                "interactive",
                src,
                "scenes_files",
                "scene_id",
                "video_files",
                "CASE WHEN m.interactive = 1 THEN 'true' ELSE 'false' END",
            ),
            rating(src, t),
        ],
        EntityKind::Images => vec![
            linked("tag", src, "images_tags", "image_id", "tags", "tag_id"),
            linked("performer", src, "performers_images", "image_id", "performers", "performer_id"),
            owned("studio", src, t, "studio_id", "studios"),
            primary_file("resolution", src, "images_files", "image_id", "image_files", &resolution_case()),
            primary_file("orientation", src, "images_files", "image_id", "image_files", ORIENTATION_CASE),
            boolean("organized", src, t, "organized"),
            rating(src, t),
        ],
        EntityKind::Galleries => vec![
            linked("tag", src, "galleries_tags", "gallery_id", "tags", "tag_id"),
            linked("performer", src, "performers_galleries", "gallery_id", "performers", "performer_id"),
            owned("studio", src, t, "studio_id", "studios"),
            boolean("organized", src, t, "organized"),
            rating(src, t),
        ],
        EntityKind::Performers => vec![
            linked("tag", src, "performers_tags", "performer_id", "tags", "tag_id"),
            // studios of the performer's scenes
            Dimension {
                sql: format!(
                    "SELECT 'studio' AS facet_type, x.id AS id, x.name AS label, NULL AS enum_value, \
                     COUNT(DISTINCT j.performer_id) AS count \
                     FROM {src} f INNER JOIN performers_scenes j ON j.performer_id = f.id \
                     INNER JOIN scenes s ON s.id = j.scene_id \
                     INNER JOIN studios x ON x.id = s.studio_id \
                     GROUP BY x.id ORDER BY count DESC",
                    src = src
                ),
                limited: true,
            },
            text_value("gender", src, t, "gender"),
            text_value("country", src, t, "country"),
            text_value("circumcised", src, t, "circumcised"),
            boolean("favorite", src, t, "favorite"),
            rating(src, t),
        ],
        EntityKind::Groups => vec![
            linked("tag", src, "groups_tags", "group_id", "tags", "tag_id"),
            // performers of the group's scenes
            Dimension {
                sql: format!(
                    "SELECT 'performer' AS facet_type, x.id AS id, x.name AS label, NULL AS enum_value, \
                     COUNT(DISTINCT gs.group_id) AS count \
                     FROM {src} f INNER JOIN groups_scenes gs ON gs.group_id = f.id \
                     INNER JOIN performers_scenes ps ON ps.scene_id = gs.scene_id \
                     INNER JOIN performers x ON x.id = ps.performer_id \
                     GROUP BY x.id ORDER BY count DESC",
                    src = src
                ),
                limited: true,
            },
            owned("studio", src, t, "studio_id", "studios"),
            rating(src, t),
        ],
        EntityKind::Studios => vec![
            linked("tag", src, "studios_tags", "studio_id", "tags", "tag_id"),
            owned("parent", src, t, "parent_id", "studios"),
            boolean("favorite", src, t, "favorite"),
            rating(src, t),
        ],
        EntityKind::Tags => vec![
            linked("parent", src, "tags_relations", "child_id", "tags", "parent_id"),
            linked("child", src, "tags_relations", "parent_id", "tags", "child_id"),
            boolean("favorite", src, t, "favorite"),
        ],
    }
}

fn performer_tags_sql(src: &str) -> String {
    format!(
        "SELECT 'performer_tag' AS facet_type, x.id AS id, x.name AS label, NULL AS enum_value, \
         COUNT(DISTINCT f.id) AS count \
         FROM {src} f INNER JOIN performers_scenes ps ON ps.scene_id = f.id \
         INNER JOIN performers_tags pt ON pt.performer_id = ps.performer_id \
         INNER JOIN tags x ON x.id = pt.tag_id \
         GROUP BY x.id ORDER BY count DESC LIMIT ?",
        src = src
    )
}

fn captions_sql(src: &str) -> String {
    format!(
        "SELECT 'caption' AS facet_type, 0 AS id, NULL AS label, vc.language_code AS enum_value, \
         COUNT(DISTINCT sf.scene_id) AS count \
         FROM {src} f INNER JOIN scenes_files sf ON sf.scene_id = f.id AND sf.\"primary\" = 1 \
         INNER JOIN video_captions vc ON vc.file_id = sf.file_id \
         WHERE vc.language_code IS NOT NULL AND vc.language_code != '' \
         GROUP BY vc.language_code ORDER BY count DESC",
        src = src
    )
}

/// `WITH [RECURSIVE] <filter ctes>, filtered_<entity> AS (<filter body>) `
fn filtered_prefix(compiled: &CompiledFilter, name: &str) -> String {
    let mut ctes: Vec<String> = compiled.with.iter().map(|c| c.sql.clone()).collect();
    ctes.push(format!("{} AS ({})", name, compiled.body().sql));
    format!(
        "WITH {}{} ",
        if compiled.recursive { "RECURSIVE " } else { "" },
        ctes.join(", ")
    )
}

// =============================================================================
// Execution
// =============================================================================

/// The facet tasks of one `get_facets` call.
///
/// Dropping the set aborts every task still running, so a cancelled caller
/// leaves no query holding a pool connection.
struct FacetTasks {
    set: JoinSet<Result<(), DataError>>,
    names: Vec<&'static str>,
    order: FxHashMap<task::Id, usize>,
}

impl FacetTasks {
    fn new() -> Self {
        Self {
            set: JoinSet::new(),
            names: Vec::new(),
            order: FxHashMap::default(),
        }
    }

    fn spawn<Fut>(&mut self, name: &'static str, fut: Fut)
    where
        Fut: Future<Output = Result<(), DataError>> + Send + 'static,
    {
        let handle = self.set.spawn(fut);
        self.order.insert(handle.id(), self.names.len());
        self.names.push(name);
    }

    /// Await every task; the first failure in spawn order wins
    async fn join(mut self) -> Result<(), DataError> {
        let mut failures: Vec<Option<DataError>> = self.names.iter().map(|_| None).collect();

        while let Some(outcome) = self.set.join_next_with_id().await {
            let (id, err) = match outcome {
                Ok((_, Ok(()))) => continue,
                Ok((id, Err(e))) => (id, e),
                Err(join) => {
                    let id = join.id();
                    let name = self.order.get(&id).map_or("facet", |&i| self.names[i]);
                    let err = DataError::execution(
                        format!("facets: {}", name),
                        sqlx::Error::Protocol(format!("facet task failed: {}", join)),
                    );
                    (id, err)
                }
            };
            if let Some(&index) = self.order.get(&id) {
                tracing::warn!(facet = self.names[index], error = %err, "Facet task failed");
                failures[index] = Some(err);
            }
        }

        match failures.into_iter().flatten().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_facet_query(
    pool: SqlitePool,
    name: &'static str,
    sql: String,
    args: Vec<SqlArg>,
    result: Arc<Mutex<FacetResult>>,
) -> Result<(), DataError> {
    tracing::trace!(facet = name, sql = %sql, "Running facet query");
    let arguments =
        to_arguments(&args).map_err(|e| DataError::execution(format!("facets: {}", name), e))?;
    let rows: Vec<FacetRow> = sqlx::query_as_with(&sql, arguments)
        .fetch_all(&pool)
        .await
        .map_err(|e| DataError::execution(format!("facets: {}", name), e))?;

    let mut result = result.lock();
    for row in rows {
        result.push(row);
    }
    Ok(())
}

/// Facet counts for everything `filter` matches.
///
/// `limit <= 0` uses the configured default. Every spawned task is awaited
/// before returning, even when one of them fails; the first failure is
/// returned and partial results are dropped. Dropping the returned future
/// aborts the tasks still in flight.
pub async fn get_facets<F: EntityFilter>(
    pool: &SqlitePool,
    filter: &F,
    limit: i64,
    options: FacetOptions,
    config: &FacetsConfig,
) -> Result<FacetResult, DataError> {
    let kind = F::KIND;
    let limit = if limit > 0 { limit } else { config.default_limit };
    let compiled = compile(filter)?;

    let src = format!("filtered_{}", kind.table());
    let prefix = filtered_prefix(&compiled, &src);
    let base_args = compiled.args();

    let dims = dimensions(kind, &src);
    let mut core_args = base_args.clone();
    let members: Vec<String> = dims
        .iter()
        .map(|d| {
            if d.limited {
                core_args.push(SqlArg::Int(limit));
                format!("SELECT * FROM ({} LIMIT ?)", d.sql)
            } else {
                format!("SELECT * FROM ({})", d.sql)
            }
        })
        .collect();
    let core_sql = format!("{}{}", prefix, members.join(" UNION ALL "));

    let result = Arc::new(Mutex::new(FacetResult::default()));
    let mut tasks = FacetTasks::new();
    tasks.spawn(
        "core",
        run_facet_query(pool.clone(), "core", core_sql, core_args, result.clone()),
    );

    if kind == EntityKind::Scenes && options.include_performer_tags {
        let mut args = base_args.clone();
        args.push(SqlArg::Int(limit));
        tasks.spawn(
            "performer_tags",
            run_facet_query(
                pool.clone(),
                "performer_tags",
                format!("{}{}", prefix, performer_tags_sql(&src)),
                args,
                result.clone(),
            ),
        );
    }
    if kind == EntityKind::Scenes && options.include_captions {
        tasks.spawn(
            "captions",
            run_facet_query(
                pool.clone(),
                "captions",
                format!("{}{}", prefix, captions_sql(&src)),
                base_args.clone(),
                result.clone(),
            ),
        );
    }

    if let Err(err) = tasks.join().await {
        tracing::warn!(entity = %kind, error = %err, "Facets failed");
        return Err(err);
    }

    let mut facets = std::mem::take(&mut *result.lock());
    facets.sort();
    tracing::debug!(entity = %kind, limit, "Facets computed");
    Ok(facets)
}
