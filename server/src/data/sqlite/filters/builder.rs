//! Fragment accumulator for filter compilation
//!
//! A `FilterBuilder` collects joins, where/having clauses and CTEs while an
//! entity filter tree is walked. Clause text and its bound arguments are kept
//! together as `SqlClause` pairs so placeholder order can never drift from
//! argument order, however deep the composition goes.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sqlx::Arguments;
use sqlx::sqlite::SqliteArguments;

use crate::data::error::FilterError;

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlArg {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for SqlArg {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Build sqlx arguments from bound values, in order
pub fn to_arguments(args: &[SqlArg]) -> Result<SqliteArguments<'static>, sqlx::Error> {
    let mut out = SqliteArguments::default();
    for arg in args {
        match arg {
            SqlArg::Null => out.add(None::<i64>),
            SqlArg::Int(v) => out.add(*v),
            SqlArg::Float(v) => out.add(*v),
            SqlArg::Text(v) => out.add(v.clone()),
        }
        .map_err(sqlx::Error::Encode)?;
    }
    Ok(out)
}

/// SQL text paired with the arguments for its placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlClause {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl SqlClause {
    pub fn new(sql: impl Into<String>, args: Vec<SqlArg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// A clause without placeholders
    pub fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn not(self) -> Self {
        if self.is_empty() {
            return self;
        }
        Self::new(format!("NOT ({})", self.sql), self.args)
    }
}

fn combine(clauses: Vec<SqlClause>, op: &str) -> SqlClause {
    let clauses: Vec<SqlClause> = clauses.into_iter().filter(|c| !c.is_empty()).collect();
    if clauses.is_empty() {
        return SqlClause::default();
    }

    let many = clauses.len() > 1;
    let mut parts = Vec::with_capacity(clauses.len());
    let mut args = Vec::new();
    for c in clauses {
        parts.push(format!("({})", c.sql));
        args.extend(c.args);
    }

    let mut sql = parts.join(&format!(" {} ", op));
    if many {
        sql = format!("({})", sql);
    }
    SqlClause::new(sql, args)
}

/// `(a) AND (b)`, parenthesized again when more than one clause remains
pub fn and_clauses(clauses: Vec<SqlClause>) -> SqlClause {
    combine(clauses, "AND")
}

/// `(a) OR (b)`, parenthesized again when more than one clause remains
pub fn or_clauses(clauses: Vec<SqlClause>) -> SqlClause {
    combine(clauses, "OR")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Inner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: String,
    pub kind: JoinKind,
}

impl Join {
    /// Name the joined rows are referenced by; also the dedup key
    pub fn effective_alias(&self) -> &str {
        if self.alias.is_empty() {
            &self.table
        } else {
            &self.alias
        }
    }

    pub fn to_sql(&self) -> String {
        let kind = match self.kind {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Inner => "INNER JOIN",
        };
        if self.alias.is_empty() || self.alias == self.table {
            format!("{} {} ON {}", kind, self.table, self.on)
        } else {
            format!("{} {} AS {} ON {}", kind, self.table, self.alias, self.on)
        }
    }
}

fn push_join(joins: &mut Vec<Join>, join: Join) {
    if joins
        .iter()
        .any(|j| j.effective_alias() == join.effective_alias())
    {
        return;
    }
    joins.push(join);
}

/// How a sub-filter combines with its parent's own clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubFilterOp {
    And,
    Or,
    Not,
}

impl SubFilterOp {
    fn infix(&self) -> &'static str {
        match self {
            SubFilterOp::And => " AND ",
            SubFilterOp::Or => " OR ",
            SubFilterOp::Not => " AND NOT ",
        }
    }
}

/// Unique alias and CTE names for one compilation
#[derive(Debug, Clone, Default)]
pub struct AliasCounter(Arc<Mutex<FxHashMap<String, usize>>>);

impl AliasCounter {
    /// `base` the first time, then `base_2`, `base_3`, ...
    pub fn next(&self, base: &str) -> String {
        let mut seen = self.0.lock();
        let n = seen.entry(base.to_string()).or_insert(0);
        *n += 1;
        if *n == 1 {
            base.to_string()
        } else {
            format!("{}_{}", base, n)
        }
    }
}

/// Accumulates the fragments of one filtered `SELECT` over `table`
#[derive(Debug)]
pub struct FilterBuilder {
    table: String,
    joins: Vec<Join>,
    where_clauses: Vec<SqlClause>,
    having_clauses: Vec<SqlClause>,
    with_clauses: Vec<SqlClause>,
    recursive: bool,
    sub_filter: Option<(SubFilterOp, Box<FilterBuilder>)>,
    error: Option<FilterError>,
    aliases: AliasCounter,
}

impl FilterBuilder {
    pub fn new(table: &str) -> Self {
        Self::with_aliases(table, AliasCounter::default())
    }

    fn with_aliases(table: &str, aliases: AliasCounter) -> Self {
        Self {
            table: table.to_string(),
            joins: Vec::new(),
            where_clauses: Vec::new(),
            having_clauses: Vec::new(),
            with_clauses: Vec::new(),
            recursive: false,
            sub_filter: None,
            error: None,
            aliases,
        }
    }

    /// Fresh builder for a combinator child over the same table
    pub fn sub_builder(&self) -> Self {
        Self::with_aliases(&self.table, self.aliases.clone())
    }

    /// Fresh builder over another entity's table, sharing alias names
    pub fn related_builder(&self, table: &str) -> Self {
        Self::with_aliases(table, self.aliases.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn unique_alias(&self, base: &str) -> String {
        self.aliases.next(base)
    }

    pub fn add_join(&mut self, kind: JoinKind, table: &str, alias: &str, on: &str) {
        push_join(
            &mut self.joins,
            Join {
                table: table.to_string(),
                alias: alias.to_string(),
                on: on.to_string(),
                kind,
            },
        );
    }

    pub fn add_left_join(&mut self, table: &str, alias: &str, on: &str) {
        self.add_join(JoinKind::Left, table, alias, on);
    }

    pub fn add_inner_join(&mut self, table: &str, alias: &str, on: &str) {
        self.add_join(JoinKind::Inner, table, alias, on);
    }

    pub fn add_where(&mut self, sql: impl Into<String>, args: Vec<SqlArg>) {
        self.add_where_clause(SqlClause::new(sql, args));
    }

    pub fn add_where_clause(&mut self, clause: SqlClause) {
        if !clause.is_empty() {
            self.where_clauses.push(clause);
        }
    }

    pub fn add_having(&mut self, sql: impl Into<String>, args: Vec<SqlArg>) {
        self.add_having_clause(SqlClause::new(sql, args));
    }

    pub fn add_having_clause(&mut self, clause: SqlClause) {
        if !clause.is_empty() {
            self.having_clauses.push(clause);
        }
    }

    /// Append a CTE (`name AS (...)`)
    pub fn add_with(&mut self, sql: impl Into<String>, args: Vec<SqlArg>) {
        let clause = SqlClause::new(sql, args);
        if !clause.is_empty() {
            self.with_clauses.push(clause);
        }
    }

    /// Append a CTE that references itself
    pub fn add_recursive_with(&mut self, sql: impl Into<String>, args: Vec<SqlArg>) {
        self.add_with(sql, args);
        self.recursive = true;
    }

    /// Record a compile error; only the first one is kept
    pub fn set_error(&mut self, err: FilterError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn and(&mut self, sub: FilterBuilder) {
        self.sub_filter = Some((SubFilterOp::And, Box::new(sub)));
    }

    pub fn or(&mut self, sub: FilterBuilder) {
        self.sub_filter = Some((SubFilterOp::Or, Box::new(sub)));
    }

    pub fn not(&mut self, sub: FilterBuilder) {
        self.sub_filter = Some((SubFilterOp::Not, Box::new(sub)));
    }

    pub fn error(&self) -> Option<&FilterError> {
        self.error
            .as_ref()
            .or_else(|| self.sub_filter.as_ref().and_then(|(_, s)| s.error()))
    }

    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// Own joins followed by the sub-filter's, deduplicated by alias
    pub fn all_joins(&self) -> Vec<Join> {
        let mut joins = self.joins.clone();
        if let Some((_, sub)) = &self.sub_filter {
            for j in sub.all_joins() {
                push_join(&mut joins, j);
            }
        }
        joins
    }

    fn compose(&self, own: SqlClause, sub: Option<SqlClause>) -> SqlClause {
        let Some(sub) = sub.filter(|s| !s.is_empty()) else {
            return own;
        };
        let Some((op, _)) = &self.sub_filter else {
            return own;
        };

        let mut sql = own.sql;
        if sql.is_empty() {
            if *op == SubFilterOp::Not {
                sql.push_str("NOT ");
            }
        } else {
            sql.push_str(op.infix());
        }
        sql.push('(');
        sql.push_str(&sub.sql);
        sql.push(')');

        let mut args = own.args;
        args.extend(sub.args);
        SqlClause::new(sql, args)
    }

    pub fn where_clause(&self) -> SqlClause {
        let own = and_clauses(self.where_clauses.clone());
        let sub = self.sub_filter.as_ref().map(|(_, s)| s.where_clause());
        self.compose(own, sub)
    }

    pub fn having_clause(&self) -> SqlClause {
        let own = and_clauses(self.having_clauses.clone());
        let sub = self.sub_filter.as_ref().map(|(_, s)| s.having_clause());
        self.compose(own, sub)
    }

    /// Own CTEs followed by the sub-filter's
    pub fn with_clauses(&self) -> Vec<SqlClause> {
        let mut out = self.with_clauses.clone();
        if let Some((_, sub)) = &self.sub_filter {
            out.extend(sub.with_clauses());
        }
        out
    }

    fn is_recursive(&self) -> bool {
        self.recursive
            || self
                .sub_filter
                .as_ref()
                .is_some_and(|(_, s)| s.is_recursive())
    }

    /// Hoist another compilation's CTEs into this builder and return its
    /// `SELECT DISTINCT id` body for use as an `IN (...)` subquery.
    pub fn embed(&mut self, compiled: CompiledFilter) -> SqlClause {
        let body = compiled.body();
        self.with_clauses.extend(compiled.with);
        self.recursive |= compiled.recursive;
        body
    }

    /// Merge a builder over a directly joined table into this one.
    ///
    /// Its joins dedupe against ours and its where/having each land as a
    /// single clause, so the merged criteria keep their own grouping.
    pub fn absorb(&mut self, other: FilterBuilder) {
        if let Some(err) = other.error() {
            self.set_error(err.clone());
            return;
        }
        for j in other.all_joins() {
            push_join(&mut self.joins, j);
        }
        self.add_where_clause(other.where_clause());
        self.add_having_clause(other.having_clause());
        self.with_clauses.extend(other.with_clauses());
        self.recursive |= other.is_recursive();
    }

    /// Consume the builder. Fails with the first recorded error.
    pub fn finish(self) -> Result<CompiledFilter, FilterError> {
        if let Some(err) = self.error() {
            return Err(err.clone());
        }

        Ok(CompiledFilter {
            joins: self.all_joins(),
            where_clause: self.where_clause(),
            having_clause: self.having_clause(),
            with: self.with_clauses(),
            recursive: self.is_recursive(),
            table: self.table,
        })
    }
}

/// The finalized, read-only output of one compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub table: String,
    pub joins: Vec<Join>,
    pub where_clause: SqlClause,
    pub having_clause: SqlClause,
    pub with: Vec<SqlClause>,
    pub recursive: bool,
}

impl CompiledFilter {
    /// True when the filter restricts nothing
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
            && self.where_clause.is_empty()
            && self.having_clause.is_empty()
            && self.with.is_empty()
    }

    /// `WITH [RECURSIVE] a AS (...), b AS (...) ` or empty
    pub fn with_prefix(&self) -> String {
        if self.with.is_empty() {
            return String::new();
        }
        let ctes: Vec<&str> = self.with.iter().map(|c| c.sql.as_str()).collect();
        format!(
            "WITH {}{} ",
            if self.recursive { "RECURSIVE " } else { "" },
            ctes.join(", ")
        )
    }

    pub fn with_args(&self) -> Vec<SqlArg> {
        self.with.iter().flat_map(|c| c.args.clone()).collect()
    }

    pub fn join_sql(&self) -> String {
        self.joins
            .iter()
            .map(Join::to_sql)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `FROM t <joins> [WHERE ...] [GROUP BY t.id HAVING ...]` and its args
    pub fn from_clause(&self) -> SqlClause {
        let mut sql = format!("FROM {}", self.table);
        let joins = self.join_sql();
        if !joins.is_empty() {
            sql.push(' ');
            sql.push_str(&joins);
        }

        let mut args = Vec::new();
        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause.sql);
            args.extend(self.where_clause.args.iter().cloned());
        }
        if !self.having_clause.is_empty() {
            sql.push_str(&format!(" GROUP BY {}.id HAVING ", self.table));
            sql.push_str(&self.having_clause.sql);
            args.extend(self.having_clause.args.iter().cloned());
        }
        SqlClause::new(sql, args)
    }

    /// `SELECT DISTINCT t.id FROM ...` without the CTE prefix
    pub fn body(&self) -> SqlClause {
        let from = self.from_clause();
        SqlClause::new(
            format!("SELECT DISTINCT {}.id {}", self.table, from.sql),
            from.args,
        )
    }

    /// Every argument in statement order: CTEs, then where, then having
    pub fn args(&self) -> Vec<SqlArg> {
        let mut args = self.with_args();
        args.extend(self.where_clause.args.iter().cloned());
        args.extend(self.having_clause.args.iter().cloned());
        args
    }

    /// Complete statement selecting the matching ids
    pub fn to_sql(&self) -> String {
        format!("{}{}", self.with_prefix(), self.body().sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_clauses_single_and_many() {
        assert_eq!(
            and_clauses(vec![SqlClause::plain("a = 1")]).sql,
            "(a = 1)"
        );
        let c = and_clauses(vec![
            SqlClause::new("a = ?", vec![1.into()]),
            SqlClause::plain(""),
            SqlClause::new("b = ?", vec!["x".into()]),
        ]);
        assert_eq!(c.sql, "((a = ?) AND (b = ?))");
        assert_eq!(c.args, vec![SqlArg::Int(1), SqlArg::Text("x".into())]);
    }

    #[test]
    fn test_or_clauses_empty() {
        assert!(or_clauses(vec![]).is_empty());
        assert!(or_clauses(vec![SqlClause::plain("")]).is_empty());
    }

    #[test]
    fn test_join_dedup_by_alias() {
        let mut f = FilterBuilder::new("scenes");
        f.add_left_join("scenes_tags", "", "scenes_tags.scene_id = scenes.id");
        f.add_left_join("scenes_tags", "", "scenes_tags.scene_id = scenes.id");
        f.add_inner_join("scenes_tags", "", "something else");
        f.add_left_join("scenes_tags", "st2", "st2.scene_id = scenes.id");
        let joins = f.all_joins();
        assert_eq!(joins.len(), 2);
        assert_eq!(
            joins[0].to_sql(),
            "LEFT JOIN scenes_tags ON scenes_tags.scene_id = scenes.id"
        );
        assert_eq!(
            joins[1].to_sql(),
            "LEFT JOIN scenes_tags AS st2 ON st2.scene_id = scenes.id"
        );
    }

    #[test]
    fn test_sub_filter_joins_merge() {
        let mut f = FilterBuilder::new("scenes");
        f.add_left_join("studios", "", "studios.id = scenes.studio_id");
        let mut sub = f.sub_builder();
        sub.add_left_join("studios", "", "studios.id = scenes.studio_id");
        sub.add_inner_join("scenes_files", "", "scenes_files.scene_id = scenes.id");
        f.and(sub);
        let aliases: Vec<String> = f
            .all_joins()
            .iter()
            .map(|j| j.effective_alias().to_string())
            .collect();
        assert_eq!(aliases, vec!["studios", "scenes_files"]);
    }

    #[test]
    fn test_empty_clauses_are_noops() {
        let mut f = FilterBuilder::new("scenes");
        f.add_where("", vec![1.into()]);
        f.add_having("", vec![]);
        f.add_with("", vec![]);
        let compiled = f.finish().unwrap();
        assert!(compiled.where_clause.is_empty());
        assert!(compiled.having_clause.is_empty());
        assert!(compiled.args().is_empty());
        assert_eq!(compiled.to_sql(), "SELECT DISTINCT scenes.id FROM scenes");
    }

    #[test]
    fn test_sub_filter_composition() {
        let mut f = FilterBuilder::new("scenes");
        f.add_where("scenes.rating = ?", vec![80.into()]);
        let mut sub = f.sub_builder();
        sub.add_where("scenes.organized = 1", vec![]);
        f.or(sub);
        assert_eq!(
            f.where_clause().sql,
            "(scenes.rating = ?) OR ((scenes.organized = 1))"
        );

        let mut f = FilterBuilder::new("scenes");
        f.add_where("scenes.rating = ?", vec![80.into()]);
        let mut sub = f.sub_builder();
        sub.add_where("scenes.organized = 1", vec![]);
        f.not(sub);
        assert_eq!(
            f.where_clause().sql,
            "(scenes.rating = ?) AND NOT ((scenes.organized = 1))"
        );
    }

    #[test]
    fn test_sub_filter_without_own_clause() {
        let f = FilterBuilder::new("scenes");
        let mut sub = f.sub_builder();
        sub.add_where("scenes.organized = 1", vec![]);
        let mut f = f;
        f.not(sub);
        assert_eq!(f.where_clause().sql, "NOT ((scenes.organized = 1))");

        let f = FilterBuilder::new("scenes");
        let mut sub = f.sub_builder();
        sub.add_where("scenes.organized = 1", vec![]);
        let mut f = f;
        f.and(sub);
        assert_eq!(f.where_clause().sql, "((scenes.organized = 1))");
    }

    #[test]
    fn test_args_follow_clause_order_through_nesting() {
        let mut f = FilterBuilder::new("scenes");
        f.add_with("c AS (SELECT ?)", vec![SqlArg::Int(0)]);
        f.add_where("a = ?", vec![1.into()]);
        f.add_having("count(x) = ?", vec![2.into()]);

        let mut sub = f.sub_builder();
        sub.add_where("b = ?", vec![3.into()]);
        sub.add_having("count(y) = ?", vec![4.into()]);
        let mut inner = sub.sub_builder();
        inner.add_where("c = ?", vec![5.into()]);
        sub.and(inner);
        f.or(sub);

        let compiled = f.finish().unwrap();
        let ints: Vec<i64> = compiled
            .args()
            .into_iter()
            .map(|a| match a {
                SqlArg::Int(i) => i,
                other => panic!("unexpected arg {:?}", other),
            })
            .collect();
        assert_eq!(ints, vec![0, 1, 3, 5, 2, 4]);
    }

    #[test]
    fn test_first_error_wins() {
        let mut f = FilterBuilder::new("scenes");
        f.set_error(FilterError::IllegalCombination("AND", "OR"));
        f.set_error(FilterError::IllegalCombination("AND", "NOT"));
        assert_eq!(
            f.finish().unwrap_err(),
            FilterError::IllegalCombination("AND", "OR")
        );
    }

    #[test]
    fn test_sub_filter_error_surfaces() {
        let mut f = FilterBuilder::new("scenes");
        let mut sub = f.sub_builder();
        sub.set_error(FilterError::invalid_value("x", "bad"));
        f.and(sub);
        assert!(f.has_error());
        assert!(f.finish().is_err());
    }

    #[test]
    fn test_alias_counter_shared_with_sub_builders() {
        let f = FilterBuilder::new("scenes");
        let sub = f.sub_builder();
        let related = f.related_builder("performers");
        assert_eq!(f.unique_alias("tags_cte"), "tags_cte");
        assert_eq!(sub.unique_alias("tags_cte"), "tags_cte_2");
        assert_eq!(related.unique_alias("tags_cte"), "tags_cte_3");
        assert_eq!(related.unique_alias("other"), "other");
    }

    #[test]
    fn test_statement_shape() {
        let mut f = FilterBuilder::new("scenes");
        f.add_recursive_with("t AS (SELECT ? AS id)", vec![7.into()]);
        f.add_left_join("scenes_tags", "", "scenes_tags.scene_id = scenes.id");
        f.add_where("scenes_tags.tag_id IN (SELECT id FROM t)", vec![]);
        f.add_having("count(distinct scenes_tags.tag_id) = ?", vec![1.into()]);
        let compiled = f.finish().unwrap();
        assert_eq!(
            compiled.to_sql(),
            "WITH RECURSIVE t AS (SELECT ? AS id) SELECT DISTINCT scenes.id FROM scenes \
             LEFT JOIN scenes_tags ON scenes_tags.scene_id = scenes.id \
             WHERE (scenes_tags.tag_id IN (SELECT id FROM t)) \
             GROUP BY scenes.id HAVING (count(distinct scenes_tags.tag_id) = ?)"
        );
        assert_eq!(compiled.args(), vec![SqlArg::Int(7), SqlArg::Int(1)]);
    }

    #[test]
    fn test_embed_hoists_ctes() {
        let mut parent = FilterBuilder::new("scenes");
        let mut related = parent.related_builder("performers");
        related.add_recursive_with("x AS (SELECT ?)", vec![1.into()]);
        related.add_where("performers.favorite = 1", vec![]);
        let body = parent.embed(related.finish().unwrap());
        assert_eq!(
            body.sql,
            "SELECT DISTINCT performers.id FROM performers WHERE (performers.favorite = 1)"
        );
        let compiled = parent.finish().unwrap();
        assert!(compiled.recursive);
        assert_eq!(compiled.with.len(), 1);
    }

    #[test]
    fn test_absorb_merges_direct_join() {
        let mut f = FilterBuilder::new("scenes");
        f.add_where("scenes.organized = 1", vec![]);
        f.add_left_join("studios", "", "studios.id = scenes.studio_id");

        let mut studio = f.sub_builder();
        studio.add_where("studios.favorite = 1", vec![]);
        studio.add_where("studios.rating > ?", vec![50.into()]);
        f.absorb(studio);

        let compiled = f.finish().unwrap();
        assert_eq!(compiled.joins.len(), 1);
        assert_eq!(
            compiled.where_clause.sql,
            "((scenes.organized = 1) AND (((studios.favorite = 1) AND (studios.rating > ?))))"
        );
        assert_eq!(compiled.args(), vec![SqlArg::Int(50)]);
    }

    #[test]
    fn test_absorb_propagates_error() {
        let mut f = FilterBuilder::new("scenes");
        let mut studio = f.sub_builder();
        studio.set_error(FilterError::invalid_value("name", "bad"));
        f.absorb(studio);
        assert!(f.finish().is_err());
    }

    #[test]
    fn test_to_arguments_counts() {
        let args = to_arguments(&[
            SqlArg::Int(1),
            SqlArg::Float(2.5),
            SqlArg::Text("x".into()),
        ])
        .unwrap();
        assert_eq!(args.len(), 3);
    }
}
