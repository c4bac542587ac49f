//! Entity filter compilation
//!
//! A filter tree is deserialized into one of the per-entity filter structs,
//! validated as a whole, then walked into a `FilterBuilder`:
//!
//! ```no_run
//! use mediashelf_server::data::sqlite::filters::{compile, SceneFilter};
//!
//! let filter: SceneFilter =
//!     serde_json::from_str(r#"{"tags": {"value": [1], "depth": -1}}"#).unwrap();
//! let compiled = compile(&filter).unwrap();
//! println!("{}", compiled.to_sql());
//! ```
//!
//! Each node may carry one of `and` / `or` / `not`; the child is compiled
//! into its own builder and attached as the node's sub-filter. Filters over
//! other entities (`performers_filter`, `studios_filter`, ...) are compiled
//! either into the same statement through a direct join, or into an
//! `id IN (SELECT ...)` subquery through the link table.

pub mod builder;
pub mod criterion;
mod gallery;
mod group;
pub mod hierarchy;
mod image;
mod performer;
mod scene;
mod studio;
mod tag;
pub mod types;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use builder::{CompiledFilter, FilterBuilder, SqlArg, SqlClause, to_arguments};
pub use gallery::GalleryFilter;
pub use group::GroupFilter;
pub use image::ImageFilter;
pub use performer::PerformerFilter;
pub use scene::SceneFilter;
pub use studio::StudioFilter;
pub use tag::TagFilter;

use crate::data::error::{DataError, FilterError};

/// The catalog entities that can be filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Scenes,
    Images,
    Galleries,
    Performers,
    Studios,
    Tags,
    Groups,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::Scenes,
        Self::Images,
        Self::Galleries,
        Self::Performers,
        Self::Studios,
        Self::Tags,
        Self::Groups,
    ];

    /// Primary table; also the plural name used on the command line
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Scenes => "scenes",
            Self::Images => "images",
            Self::Galleries => "galleries",
            Self::Performers => "performers",
            Self::Studios => "studios",
            Self::Tags => "tags",
            Self::Groups => "groups",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.table() == lower)
            .ok_or_else(|| {
                format!(
                    "Unknown entity '{}'. Valid options: scenes, images, galleries, performers, studios, tags, groups",
                    s
                )
            })
    }
}

/// A deserializable filter tree over one entity
pub trait EntityFilter: DeserializeOwned + Default + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// The node's `and`, `or` and `not` children
    fn combinators(&self) -> [Option<&Self>; 3];

    /// Checks on this node's own criteria, not its combinator children
    fn validate_node(&self, is_related: bool) -> Result<(), FilterError>;

    /// Add this node's own criteria to `f`
    fn handle_criteria(&self, f: &mut FilterBuilder);

    /// Reject malformed trees before anything is compiled.
    ///
    /// `is_related` is set while validating a filter reached through another
    /// entity's filter; such a filter may not carry related filters itself.
    fn validate(&self, is_related: bool) -> Result<(), FilterError> {
        let [and, or, not] = self.combinators();
        match (and.is_some(), or.is_some(), not.is_some()) {
            (true, true, _) => return Err(FilterError::IllegalCombination("AND", "OR")),
            (true, _, true) => return Err(FilterError::IllegalCombination("AND", "NOT")),
            (_, true, true) => return Err(FilterError::IllegalCombination("OR", "NOT")),
            _ => {}
        }

        self.validate_node(is_related)?;

        match and.or(or).or(not) {
            Some(child) => child.validate(is_related),
            None => Ok(()),
        }
    }

    /// Walk the tree into `f`
    fn handle(&self, f: &mut FilterBuilder) {
        let [and, or, not] = self.combinators();
        if let Some(child) = and {
            let mut sub = f.sub_builder();
            child.handle(&mut sub);
            f.and(sub);
        }
        if let Some(child) = or {
            let mut sub = f.sub_builder();
            child.handle(&mut sub);
            f.or(sub);
        }
        if let Some(child) = not {
            let mut sub = f.sub_builder();
            child.handle(&mut sub);
            f.not(sub);
        }
        self.handle_criteria(f);
    }
}

/// Validate then compile a filter tree
pub fn compile<F: EntityFilter>(filter: &F) -> Result<CompiledFilter, DataError> {
    filter.validate(false).map_err(DataError::Validation)?;
    let mut f = FilterBuilder::new(F::KIND.table());
    filter.handle(&mut f);
    let compiled = f.finish().map_err(DataError::Compile)?;
    tracing::trace!(
        entity = %F::KIND,
        sql = %compiled.to_sql(),
        args = ?compiled.args(),
        "Filter compiled"
    );
    Ok(compiled)
}

/// Parse a JSON filter for `F`; empty input is the empty filter
pub fn parse_filter<F: EntityFilter>(json: &str) -> Result<F, DataError> {
    if json.trim().is_empty() {
        return Ok(F::default());
    }
    serde_json::from_str(json).map_err(|e| {
        DataError::Validation(FilterError::invalid_value(
            F::KIND.table(),
            e.to_string(),
        ))
    })
}

/// Validate a related filter found on a node
pub(crate) fn check_related<R: EntityFilter>(
    name: &str,
    filter: Option<&R>,
    is_related: bool,
) -> Result<(), FilterError> {
    let Some(filter) = filter else {
        return Ok(());
    };
    if is_related {
        return Err(FilterError::NestedRelatedFilter(name.to_string()));
    }
    filter.validate(true)
}

/// How a related entity is linked to the primary one
#[derive(Debug, Clone, Copy)]
pub(crate) enum RelatedLink<'a> {
    /// Many-to-many through `join_table`
    Through {
        join_table: &'a str,
        /// Column naming the primary row
        primary_fk: &'a str,
        /// Column naming the related row
        foreign_fk: &'a str,
    },
    /// The related id sits on a column of the primary row
    Column(&'a str),
    /// The primary id sits on a column of the related row, e.g.
    /// `scenes.studio_id` seen from studios
    Reverse(&'a str),
}

/// Compile a related filter into an `id IN (SELECT ...)` subquery.
///
/// The related filter runs in its own builder over its own table; its CTEs
/// are hoisted into `f` so the statement keeps a single `WITH`. A related
/// filter that restricts nothing adds nothing.
pub(crate) fn related_subquery<R: EntityFilter>(
    f: &mut FilterBuilder,
    filter: Option<&R>,
    link: RelatedLink<'_>,
) {
    let Some(filter) = filter else { return };

    let mut related = f.related_builder(R::KIND.table());
    filter.handle(&mut related);
    let compiled = match related.finish() {
        Ok(c) => c,
        Err(e) => return f.set_error(e),
    };
    if compiled.is_empty() {
        return;
    }

    let primary = f.table().to_string();
    let body = f.embed(compiled);
    let sql = match link {
        RelatedLink::Through {
            join_table,
            primary_fk,
            foreign_fk,
        } => format!(
            "{p}.id IN (SELECT {j}.{pfk} FROM {j} WHERE {j}.{ffk} IN ({sub}))",
            p = primary,
            j = join_table,
            pfk = primary_fk,
            ffk = foreign_fk,
            sub = body.sql
        ),
        RelatedLink::Column(column) => {
            format!("{}.{} IN ({})", primary, column, body.sql)
        }
        RelatedLink::Reverse(column) => {
            let related_table = R::KIND.table();
            format!(
                "{p}.id IN (SELECT {r}.{col} FROM {r} WHERE {r}.id IN ({sub}))",
                p = primary,
                r = related_table,
                col = column,
                sub = body.sql
            )
        }
    };
    f.add_where(sql, body.args);
}

/// Compile a related filter into the same statement over a direct join.
///
/// Used for the one-row relations (an entity's studio): the related table
/// is joined under its own name and its criteria land in `f`.
pub(crate) fn related_join<R: EntityFilter>(f: &mut FilterBuilder, filter: Option<&R>, on: &str) {
    let Some(filter) = filter else { return };
    let table = R::KIND.table();
    let mut related = f.related_builder(table);
    filter.handle(&mut related);
    if related.has_error() {
        return f.absorb(related);
    }
    f.add_left_join(table, "", on);
    f.absorb(related);
}

/// Whitelisted `is_missing` key, or the reason it is rejected
pub(crate) fn missing_key<'a>(
    f: &mut FilterBuilder,
    value: Option<&'a str>,
    known: &[&str],
) -> Option<&'a str> {
    let key = value.filter(|v| !v.is_empty())?;
    if known.contains(&key) {
        Some(key)
    } else {
        f.set_error(FilterError::invalid_value(
            "is_missing",
            format!("unknown key '{}'", key),
        ));
        None
    }
}

/// `(col IS NULL OR TRIM(col) = '')`
pub(crate) fn missing_column(f: &mut FilterBuilder, column: &str) {
    f.add_where(
        format!("{} IS NULL OR TRIM({}) = ''", column, column),
        vec![],
    );
}

/// No row in `join_table` links to the primary row
pub(crate) fn missing_link(f: &mut FilterBuilder, join_table: &str, primary_fk: &str) {
    let alias = f.unique_alias(&format!("{}_missing", join_table));
    let primary = f.table().to_string();
    f.add_left_join(
        join_table,
        &alias,
        &format!("{}.{} = {}.id", alias, primary_fk, primary),
    );
    f.add_where(format!("{}.{} IS NULL", alias, primary_fk), vec![]);
}
