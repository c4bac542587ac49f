//! Hierarchical relationship criteria
//!
//! Tags, studios and groups form self-referencing forests. A criterion over
//! them names root ids and a depth; the roots are expanded into
//! `(root_id, item_id)` pairs with a recursive CTE and the primary table is
//! matched against `item_id`.
//!
//! Depth 0 is the roots themselves, N adds up to N levels below them and -1
//! walks the whole subtree. The unbounded walk carries a constant depth so
//! `UNION` collapses revisited pairs and cycles terminate.

use super::builder::{FilterBuilder, SqlArg, SqlClause};
use super::criterion::RelationCount;
use super::types::{CriterionModifier, HierarchicalMultiCriterion, IntCriterion};
use crate::data::error::FilterError;
use crate::utils::sql::placeholders;

use CriterionModifier as M;

/// One self-referencing relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hierarchy {
    /// Table holding the items
    pub table: &'static str,
    /// Table holding the edges (may be `table` itself)
    pub relation: &'static str,
    pub parent_col: &'static str,
    pub child_col: &'static str,
}

pub const TAGS: Hierarchy = Hierarchy {
    table: "tags",
    relation: "tags_relations",
    parent_col: "parent_id",
    child_col: "child_id",
};

/// Studios keep their parent on the row itself
pub const STUDIOS: Hierarchy = Hierarchy {
    table: "studios",
    relation: "studios",
    parent_col: "parent_id",
    child_col: "id",
};

pub const GROUPS: Hierarchy = Hierarchy {
    table: "groups",
    relation: "groups_relations",
    parent_col: "containing_id",
    child_col: "sub_id",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a node towards its children
    Descendants,
    /// From a node towards its parents
    Ancestors,
}

impl Hierarchy {
    /// Edge columns as (from, to) for a walk in `direction`
    fn edge(&self, direction: Direction) -> (&'static str, &'static str) {
        match direction {
            Direction::Descendants => (self.parent_col, self.child_col),
            Direction::Ancestors => (self.child_col, self.parent_col),
        }
    }

    fn recursive_term(&self, name: &str, depth: i64, direction: Direction) -> String {
        let (from, to) = self.edge(direction);
        let (next_depth, bound) = if depth < 0 {
            ("0".to_string(), String::new())
        } else {
            ("p.depth + 1".to_string(), format!(" AND p.depth < {}", depth))
        };
        format!(
            " UNION SELECT p.root_id, c.{to}, {next_depth} FROM {rel} AS c \
             INNER JOIN {name} AS p ON c.{from} = p.item_id \
             WHERE c.{to} IS NOT NULL{bound}",
            to = to,
            next_depth = next_depth,
            rel = self.relation,
            name = name,
            from = from,
            bound = bound
        )
    }

    /// Roots plus everything within `depth` hops, each paired with its root.
    pub fn expansion_cte(
        &self,
        name: &str,
        roots: &[i64],
        depth: i64,
        direction: Direction,
    ) -> SqlClause {
        let mut sql = format!(
            "{name} AS (SELECT id AS root_id, id AS item_id, 0 AS depth FROM {table} WHERE id IN ({ph})",
            name = name,
            table = self.table,
            ph = placeholders(roots.len())
        );
        if depth != 0 {
            sql.push_str(&self.recursive_term(name, depth, direction));
        }
        sql.push(')');
        SqlClause::new(sql, roots.iter().map(|r| SqlArg::Int(*r)).collect())
    }

    /// Like `expansion_cte` but excluding the roots: depth 0 is the direct
    /// neighbours.
    pub fn relation_cte(
        &self,
        name: &str,
        roots: &[i64],
        depth: i64,
        direction: Direction,
    ) -> SqlClause {
        let (from, to) = self.edge(direction);
        let mut sql = format!(
            "{name} AS (SELECT c.{from} AS root_id, c.{to} AS item_id, 0 AS depth FROM {rel} AS c \
             WHERE c.{from} IN ({ph}) AND c.{to} IS NOT NULL",
            name = name,
            from = from,
            to = to,
            rel = self.relation,
            ph = placeholders(roots.len())
        );
        if depth != 0 {
            sql.push_str(&self.recursive_term(name, depth, direction));
        }
        sql.push(')');
        SqlClause::new(sql, roots.iter().map(|r| SqlArg::Int(*r)).collect())
    }
}

pub(crate) fn check_depth(
    field: &str,
    modifier: CriterionModifier,
    depth: i64,
) -> Result<(), FilterError> {
    if depth < -1 {
        return Err(FilterError::UnsupportedDepth {
            field: field.to_string(),
            modifier: modifier.to_string(),
            depth,
        });
    }
    Ok(())
}

/// A hierarchy referenced through a foreign key column on the primary row,
/// e.g. `scenes.studio_id`.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKeyHierarchy<'a> {
    pub field: &'a str,
    pub hierarchy: Hierarchy,
    /// Qualified column, e.g. `scenes.studio_id`
    pub fk_column: &'a str,
}

impl ForeignKeyHierarchy<'_> {
    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&HierarchicalMultiCriterion>) {
        let Some(c) = c else { return };
        let fk = self.fk_column;

        let mut c = c.clone();
        match c.modifier() {
            M::IsNull => return f.add_where(format!("{} IS NULL", fk), vec![]),
            M::NotNull => return f.add_where(format!("{} IS NOT NULL", fk), vec![]),
            M::Equals => c.modifier = Some(M::IncludesAll),
            M::NotEquals => c.modifier = Some(M::Excludes),
            M::Includes
            | M::Excludes
            | M::IncludesAll
            | M::GreaterThan
            | M::LessThan
            | M::MatchesRegex
            | M::NotMatchesRegex
            | M::Between
            | M::NotBetween => {}
        }

        let depth = c.depth();
        if let Err(e) = check_depth(self.field, c.modifier(), depth) {
            return f.set_error(e);
        }

        let c = c.combine_excludes();
        if c.value.is_empty() && c.excludes.is_empty() {
            return;
        }

        if !c.value.is_empty() {
            let modifier = c.modifier();
            if !matches!(modifier, M::Includes | M::IncludesAll) {
                return f.set_error(FilterError::unsupported_modifier(self.field, modifier));
            }

            if c.value.len() == 1 && c.excludes.is_empty() && depth == 0 {
                f.add_where(format!("{} = ?", fk), vec![SqlArg::Int(c.value[0])]);
                return;
            }

            let name = f.unique_alias(&format!("{}_items", self.field));
            let cte = self
                .hierarchy
                .expansion_cte(&name, &c.value, depth, Direction::Descendants);
            f.add_recursive_with(cte.sql, cte.args);

            if modifier == M::IncludesAll {
                f.add_where(
                    format!(
                        "(SELECT COUNT(DISTINCT root_id) FROM {} WHERE item_id = {}) = ?",
                        name, fk
                    ),
                    vec![SqlArg::Int(c.value.len() as i64)],
                );
            } else {
                f.add_where(format!("{} IN (SELECT item_id FROM {})", fk, name), vec![]);
            }
        }

        if !c.excludes.is_empty() {
            let name = f.unique_alias(&format!("{}_excluded", self.field));
            let cte = self
                .hierarchy
                .expansion_cte(&name, &c.excludes, depth, Direction::Descendants);
            f.add_recursive_with(cte.sql, cte.args);
            f.add_where(
                format!("{fk} NOT IN (SELECT item_id FROM {name}) OR {fk} IS NULL", fk = fk, name = name),
                vec![],
            );
        }
    }
}

/// A hierarchy reached through a join table, e.g. `scenes_tags`
#[derive(Debug, Clone, Copy)]
pub struct JoinedHierarchy<'a> {
    pub field: &'a str,
    pub hierarchy: Hierarchy,
    pub primary_table: &'a str,
    pub join_table: &'a str,
    /// Join-table column pointing at the primary row
    pub primary_fk: &'a str,
    /// Join-table column pointing at the hierarchy item
    pub foreign_fk: &'a str,
}

impl JoinedHierarchy<'_> {
    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&HierarchicalMultiCriterion>) {
        self.apply_with(f, c, true);
    }

    fn expanded_join(&self, f: &mut FilterBuilder, cte: &str) -> String {
        let alias = f.unique_alias(self.join_table);
        let table = format!(
            "(SELECT j.*, d.root_id, d.item_id FROM {jt} AS j INNER JOIN {cte} AS d ON j.{ffk} = d.item_id)",
            jt = self.join_table,
            cte = cte,
            ffk = self.foreign_fk
        );
        f.add_left_join(
            &table,
            &alias,
            &format!("{}.{} = {}.id", alias, self.primary_fk, self.primary_table),
        );
        alias
    }

    pub(crate) fn apply_with(
        &self,
        f: &mut FilterBuilder,
        c: Option<&HierarchicalMultiCriterion>,
        allow_fast_path: bool,
    ) {
        let Some(c) = c else { return };
        let depth = c.depth();
        let modifier = c.modifier();

        if matches!(modifier, M::IsNull | M::NotNull) {
            let alias = f.unique_alias(self.join_table);
            f.add_left_join(
                self.join_table,
                &alias,
                &format!("{}.{} = {}.id", alias, self.primary_fk, self.primary_table),
            );
            let not = if modifier == M::NotNull { "NOT " } else { "" };
            f.add_where(format!("{}.{} IS {}NULL", alias, self.foreign_fk, not), vec![]);
            return;
        }

        if let Err(e) = check_depth(self.field, modifier, depth) {
            return f.set_error(e);
        }
        if modifier == M::Equals && depth != 0 {
            return f.set_error(FilterError::UnsupportedDepth {
                field: self.field.to_string(),
                modifier: modifier.to_string(),
                depth,
            });
        }

        let c = c.combine_excludes();
        let modifier = c.modifier();
        if c.value.is_empty() && c.excludes.is_empty() {
            return;
        }

        if !c.value.is_empty() {
            match modifier {
                M::Includes | M::IncludesAll | M::Equals => {}
                M::NotEquals
                | M::Excludes
                | M::GreaterThan
                | M::LessThan
                | M::IsNull
                | M::NotNull
                | M::MatchesRegex
                | M::NotMatchesRegex
                | M::Between
                | M::NotBetween => {
                    return f.set_error(FilterError::unsupported_modifier(self.field, modifier));
                }
            }

            let fast = allow_fast_path
                && c.value.len() == 1
                && c.excludes.is_empty()
                && depth == 0
                && modifier != M::Equals;

            if fast {
                let alias = f.unique_alias(self.join_table);
                f.add_left_join(
                    self.join_table,
                    &alias,
                    &format!("{}.{} = {}.id", alias, self.primary_fk, self.primary_table),
                );
                f.add_where(
                    format!("{}.{} = ?", alias, self.foreign_fk),
                    vec![SqlArg::Int(c.value[0])],
                );
            } else {
                let name = f.unique_alias(&format!("{}_items", self.field));
                let cte = self
                    .hierarchy
                    .expansion_cte(&name, &c.value, depth, Direction::Descendants);
                f.add_recursive_with(cte.sql, cte.args);
                let alias = self.expanded_join(f, &name);
                let n = SqlArg::Int(c.value.len() as i64);

                f.add_where(format!("{}.root_id IS NOT NULL", alias), vec![]);
                if matches!(modifier, M::IncludesAll | M::Equals) {
                    f.add_having(format!("count(distinct {}.root_id) = ?", alias), vec![n.clone()]);
                }
                if modifier == M::Equals {
                    f.add_where(
                        format!(
                            "(SELECT COUNT(*) FROM {jt} s WHERE s.{pfk} = {p}.id) = ?",
                            jt = self.join_table,
                            pfk = self.primary_fk,
                            p = self.primary_table
                        ),
                        vec![n],
                    );
                }
            }
        }

        if !c.excludes.is_empty() {
            let name = f.unique_alias(&format!("{}_excluded", self.field));
            let cte = self
                .hierarchy
                .expansion_cte(&name, &c.excludes, depth, Direction::Descendants);
            f.add_recursive_with(cte.sql, cte.args);
            let alias = self.expanded_join(f, &name);
            f.add_where(format!("{}.root_id IS NULL", alias), vec![]);
        }
    }
}

/// Parent or child criteria on the hierarchy's own table
#[derive(Debug, Clone, Copy)]
pub struct HierarchyRelation<'a> {
    pub field: &'a str,
    pub hierarchy: Hierarchy,
    /// `Descendants` matches items below the given ids (a `parents`
    /// criterion); `Ancestors` matches items above them (`children`).
    pub direction: Direction,
}

impl HierarchyRelation<'_> {
    /// Join-table columns as (column naming the primary row, column naming
    /// the related row)
    fn columns(&self) -> (&'static str, &'static str) {
        let h = self.hierarchy;
        match self.direction {
            Direction::Descendants => (h.child_col, h.parent_col),
            Direction::Ancestors => (h.parent_col, h.child_col),
        }
    }

    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&HierarchicalMultiCriterion>) {
        let Some(c) = c else { return };
        let table = self.hierarchy.table;
        let (own_col, other_col) = self.columns();
        let modifier = c.modifier();

        if matches!(modifier, M::IsNull | M::NotNull) {
            let alias = f.unique_alias(&format!("{}_rel", self.field));
            f.add_left_join(
                self.hierarchy.relation,
                &alias,
                &format!("{}.{} = {}.id", alias, own_col, table),
            );
            let not = if modifier == M::NotNull { "NOT " } else { "" };
            f.add_where(format!("{}.{} IS {}NULL", alias, other_col, not), vec![]);
            return;
        }

        let depth = c.depth();
        if let Err(e) = check_depth(self.field, modifier, depth) {
            return f.set_error(e);
        }

        let c = c.combine_excludes();
        let modifier = c.modifier();
        if c.value.is_empty() && c.excludes.is_empty() {
            return;
        }

        if !c.value.is_empty() {
            if !matches!(modifier, M::Includes | M::IncludesAll) {
                return f.set_error(FilterError::unsupported_modifier(self.field, modifier));
            }
            let name = f.unique_alias(self.field);
            let cte = self
                .hierarchy
                .relation_cte(&name, &c.value, depth, self.direction);
            f.add_recursive_with(cte.sql, cte.args);
            f.add_left_join(&name, "", &format!("{}.item_id = {}.id", name, table));
            f.add_where(format!("{}.root_id IS NOT NULL", name), vec![]);
            if modifier == M::IncludesAll {
                f.add_having(
                    format!("count(distinct {}.root_id) = ?", name),
                    vec![SqlArg::Int(c.value.len() as i64)],
                );
            }
        }

        if !c.excludes.is_empty() {
            let name = f.unique_alias(&format!("{}2", self.field));
            let cte = self
                .hierarchy
                .relation_cte(&name, &c.excludes, depth, self.direction);
            f.add_recursive_with(cte.sql, cte.args);
            f.add_left_join(&name, "", &format!("{}.item_id = {}.id", name, table));
            f.add_where(format!("{}.item_id IS NULL", name), vec![]);
        }
    }

    /// Direct relations only, never the transitive closure
    pub fn count(&self, f: &mut FilterBuilder, field: &str, c: Option<&IntCriterion>) {
        let (own_col, other_col) = self.columns();
        RelationCount {
            field,
            primary_table: self.hierarchy.table,
            join_table: self.hierarchy.relation,
            primary_fk: own_col,
            counted: other_col,
        }
        .apply(f, c);
    }
}

/// Tags of the performers linked to a scene, image or gallery
#[derive(Debug, Clone, Copy)]
pub struct PerformerTags<'a> {
    pub primary_table: &'a str,
    /// e.g. `performers_scenes`
    pub join_table: &'a str,
    /// e.g. `scene_id`
    pub primary_fk: &'a str,
}

impl PerformerTags<'_> {
    const FIELD: &'static str = "performer_tags";

    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&HierarchicalMultiCriterion>) {
        let Some(c) = c else { return };
        let c = c.combine_excludes();
        let modifier = c.modifier();

        match modifier {
            M::Includes | M::IncludesAll | M::Excludes | M::IsNull | M::NotNull => {}
            M::Equals
            | M::NotEquals
            | M::GreaterThan
            | M::LessThan
            | M::MatchesRegex
            | M::NotMatchesRegex
            | M::Between
            | M::NotBetween => {
                return f.set_error(FilterError::unsupported_modifier(Self::FIELD, modifier));
            }
        }

        if matches!(modifier, M::IsNull | M::NotNull) {
            let jt = f.unique_alias(self.join_table);
            let pt = f.unique_alias("performers_tags");
            f.add_left_join(
                self.join_table,
                &jt,
                &format!("{}.{} = {}.id", jt, self.primary_fk, self.primary_table),
            );
            f.add_left_join(
                "performers_tags",
                &pt,
                &format!("{}.performer_id = {}.performer_id", pt, jt),
            );
            let not = if modifier == M::NotNull { "NOT " } else { "" };
            f.add_where(format!("{}.tag_id IS {}NULL", pt, not), vec![]);
            return;
        }

        let depth = c.depth();
        if let Err(e) = check_depth(Self::FIELD, modifier, depth) {
            return f.set_error(e);
        }
        if c.value.is_empty() && c.excludes.is_empty() {
            return;
        }

        if !c.value.is_empty() {
            let tags = f.unique_alias("performer_tags_items");
            let cte = TAGS.expansion_cte(&tags, &c.value, depth, Direction::Descendants);
            f.add_recursive_with(cte.sql, cte.args);

            let alias = f.unique_alias(Self::FIELD);
            f.add_with(
                format!(
                    "{alias} AS (SELECT ps.{pfk} AS primary_id, t.root_id AS root_tag_id FROM {jt} ps \
                     INNER JOIN performers_tags pt ON pt.performer_id = ps.performer_id \
                     INNER JOIN {tags} t ON t.item_id = pt.tag_id)",
                    alias = alias,
                    pfk = self.primary_fk,
                    jt = self.join_table,
                    tags = tags
                ),
                vec![],
            );
            f.add_left_join(
                &alias,
                "",
                &format!("{}.primary_id = {}.id", alias, self.primary_table),
            );
            f.add_where(format!("{}.root_tag_id IS NOT NULL", alias), vec![]);
            if modifier == M::IncludesAll {
                f.add_having(
                    format!("count(distinct {}.root_tag_id) = ?", alias),
                    vec![SqlArg::Int(c.value.len() as i64)],
                );
            }
        }

        if !c.excludes.is_empty() {
            let tags = f.unique_alias("performer_tags_excluded");
            let cte = TAGS.expansion_cte(&tags, &c.excludes, depth, Direction::Descendants);
            f.add_recursive_with(cte.sql, cte.args);
            f.add_where(
                format!(
                    "{p}.id NOT IN (SELECT {jt}.{pfk} FROM {jt} \
                     INNER JOIN performers_tags ON {jt}.performer_id = performers_tags.performer_id \
                     WHERE performers_tags.tag_id IN (SELECT item_id FROM {tags}))",
                    p = self.primary_table,
                    jt = self.join_table,
                    pfk = self.primary_fk,
                    tags = tags
                ),
                vec![],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use sqlx::SqlitePool;

    use super::*;
    use crate::data::sqlite::filters::builder::to_arguments;
    use crate::data::sqlite::fixtures;

    fn scene_tags() -> JoinedHierarchy<'static> {
        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: "scenes",
            join_table: "scenes_tags",
            primary_fk: "scene_id",
            foreign_fk: "tag_id",
        }
    }

    fn crit(
        value: Vec<i64>,
        excludes: Vec<i64>,
        depth: i64,
        modifier: CriterionModifier,
    ) -> HierarchicalMultiCriterion {
        HierarchicalMultiCriterion {
            value,
            excludes,
            depth: Some(depth),
            modifier: Some(modifier),
        }
    }

    async fn run(pool: &SqlitePool, f: FilterBuilder) -> Vec<i64> {
        let compiled = f.finish().unwrap();
        let sql = format!("{} ORDER BY 1", compiled.to_sql());
        let args = to_arguments(&compiled.args()).unwrap();
        sqlx::query_scalar_with(&sql, args)
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_expansion_cte_depths() {
        let cte = TAGS.expansion_cte("t", &[1, 2], 0, Direction::Descendants);
        assert_eq!(
            cte.sql,
            "t AS (SELECT id AS root_id, id AS item_id, 0 AS depth FROM tags WHERE id IN (?, ?))"
        );
        assert_eq!(cte.args, vec![SqlArg::Int(1), SqlArg::Int(2)]);

        let cte = TAGS.expansion_cte("t", &[1], 2, Direction::Descendants);
        assert!(cte.sql.contains("UNION SELECT p.root_id, c.child_id, p.depth + 1"));
        assert!(cte.sql.contains("ON c.parent_id = p.item_id"));
        assert!(cte.sql.ends_with("AND p.depth < 2)"));

        let cte = TAGS.expansion_cte("t", &[1], -1, Direction::Descendants);
        assert!(cte.sql.contains("UNION SELECT p.root_id, c.child_id, 0 FROM"));
        assert!(!cte.sql.contains("p.depth <"));
    }

    #[test]
    fn test_studio_edges_live_on_the_table() {
        let cte = STUDIOS.relation_cte("s", &[3], 0, Direction::Descendants);
        assert_eq!(
            cte.sql,
            "s AS (SELECT c.parent_id AS root_id, c.id AS item_id, 0 AS depth FROM studios AS c \
             WHERE c.parent_id IN (?) AND c.id IS NOT NULL)"
        );
    }

    #[test]
    fn test_joined_fast_path_shape() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![7], vec![], 0, M::Includes)));
        let compiled = f.finish().unwrap();
        assert!(compiled.with.is_empty());
        assert_eq!(
            compiled.join_sql(),
            "LEFT JOIN scenes_tags ON scenes_tags.scene_id = scenes.id"
        );
        assert_eq!(compiled.where_clause.sql, "(scenes_tags.tag_id = ?)");
    }

    #[test]
    fn test_joined_validation_errors() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![1], vec![], 1, M::Equals)));
        assert!(matches!(
            f.finish().unwrap_err(),
            FilterError::UnsupportedDepth { depth: 1, .. }
        ));

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![1], vec![], 0, M::NotEquals)));
        assert_eq!(
            f.finish().unwrap_err(),
            FilterError::unsupported_modifier("tags", "NOT_EQUALS")
        );

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![1], vec![], -2, M::Includes)));
        assert!(matches!(
            f.finish().unwrap_err(),
            FilterError::UnsupportedDepth { depth: -2, .. }
        ));
    }

    #[test]
    fn test_empty_values_are_noops() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![], vec![], -1, M::Includes)));
        scene_tags().apply(&mut f, Some(&crit(vec![], vec![], -1, M::Excludes)));
        let compiled = f.finish().unwrap();
        assert!(compiled.joins.is_empty());
        assert!(compiled.where_clause.is_empty());
        assert!(compiled.with.is_empty());
    }

    #[test]
    fn test_fk_fast_path_and_null() {
        let studio = ForeignKeyHierarchy {
            field: "studios",
            hierarchy: STUDIOS,
            fk_column: "scenes.studio_id",
        };
        let mut f = FilterBuilder::new("scenes");
        studio.apply(&mut f, Some(&crit(vec![4], vec![], 0, M::Includes)));
        studio.apply(&mut f, Some(&crit(vec![], vec![], 0, M::NotNull)));
        let compiled = f.finish().unwrap();
        assert_eq!(
            compiled.where_clause.sql,
            "((scenes.studio_id = ?) AND (scenes.studio_id IS NOT NULL))"
        );
    }

    #[tokio::test]
    async fn test_tag_chain_depth_scenarios() {
        let pool = fixtures::pool().await;
        // T1 -> T2 -> T3
        let t1 = fixtures::tag(&pool, "T1").await;
        let t2 = fixtures::tag(&pool, "T2").await;
        let t3 = fixtures::tag(&pool, "T3").await;
        fixtures::tag_parent(&pool, t1, t2).await;
        fixtures::tag_parent(&pool, t2, t3).await;

        let a = fixtures::scene(&pool, "A").await;
        let b = fixtures::scene(&pool, "B").await;
        let c = fixtures::scene(&pool, "C").await;
        let none = fixtures::scene(&pool, "untagged").await;
        fixtures::tag_scene(&pool, a, t1).await;
        fixtures::tag_scene(&pool, b, t2).await;
        fixtures::tag_scene(&pool, c, t3).await;

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![t1], vec![], -1, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![a, b, c]);

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![t1], vec![], 1, M::Excludes)));
        assert_eq!(run(&pool, f).await, vec![c, none]);

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![t1], vec![], 0, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![a]);
    }

    #[tokio::test]
    async fn test_unbounded_excludes_deep_chain() {
        let pool = fixtures::pool().await;
        let mut chain = Vec::new();
        for i in 0..6 {
            chain.push(fixtures::tag(&pool, &format!("level {}", i)).await);
        }
        for pair in chain.windows(2) {
            fixtures::tag_parent(&pool, pair[0], pair[1]).await;
        }
        // a cycle back to the root must not hang the walk
        fixtures::tag_parent(&pool, chain[5], chain[0]).await;

        let other = fixtures::tag(&pool, "other").await;
        let mut tagged = Vec::new();
        for t in &chain {
            let s = fixtures::scene(&pool, "chain").await;
            fixtures::tag_scene(&pool, s, *t).await;
            tagged.push(s);
        }
        let keep = fixtures::scene(&pool, "other").await;
        fixtures::tag_scene(&pool, keep, other).await;

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![chain[0]], vec![], -1, M::Excludes)));
        assert_eq!(run(&pool, f).await, vec![keep]);
    }

    #[tokio::test]
    async fn test_includes_all_requires_every_value() {
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

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![t1, t2], vec![], 0, M::IncludesAll)));
        assert_eq!(run(&pool, f).await, vec![s2]);

        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&crit(vec![t1], vec![], 0, M::Equals)));
        assert_eq!(run(&pool, f).await, vec![s1]);
    }

    #[tokio::test]
    async fn test_fast_path_matches_general_path() {
        let pool = fixtures::pool().await;
        let mut rng = StdRng::seed_from_u64(0x5eed);

        let mut tags = Vec::new();
        for i in 0..12 {
            let id = fixtures::tag(&pool, &format!("tag {}", i)).await;
            if i > 0 && rng.gen_bool(0.7) {
                let parent = tags[rng.gen_range(0..tags.len())];
                fixtures::tag_parent(&pool, parent, id).await;
            }
            tags.push(id);
        }
        for i in 0..30 {
            let s = fixtures::scene(&pool, &format!("scene {}", i)).await;
            for t in &tags {
                if rng.gen_bool(0.2) {
                    fixtures::tag_scene(&pool, s, *t).await;
                }
            }
        }

        for t in &tags {
            for modifier in [M::Includes, M::IncludesAll] {
                let c = crit(vec![*t], vec![], 0, modifier);

                let mut fast = FilterBuilder::new("scenes");
                scene_tags().apply_with(&mut fast, Some(&c), true);
                let mut general = FilterBuilder::new("scenes");
                scene_tags().apply_with(&mut general, Some(&c), false);

                assert_eq!(run(&pool, fast).await, run(&pool, general).await, "tag {}", t);
            }
        }
    }

    #[tokio::test]
    async fn test_tag_parents_and_children() {
        let pool = fixtures::pool().await;
        let root = fixtures::tag(&pool, "root").await;
        let mid = fixtures::tag(&pool, "mid").await;
        let leaf = fixtures::tag(&pool, "leaf").await;
        fixtures::tag_parent(&pool, root, mid).await;
        fixtures::tag_parent(&pool, mid, leaf).await;

        let parents = HierarchyRelation {
            field: "parents",
            hierarchy: TAGS,
            direction: Direction::Descendants,
        };
        let mut f = FilterBuilder::new("tags");
        parents.apply(&mut f, Some(&crit(vec![root], vec![], 0, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![mid]);

        let mut f = FilterBuilder::new("tags");
        parents.apply(&mut f, Some(&crit(vec![root], vec![], -1, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![mid, leaf]);

        let children = HierarchyRelation {
            field: "children",
            hierarchy: TAGS,
            direction: Direction::Ancestors,
        };
        let mut f = FilterBuilder::new("tags");
        children.apply(&mut f, Some(&crit(vec![leaf], vec![], -1, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![root, mid]);

        let mut f = FilterBuilder::new("tags");
        children.apply(&mut f, Some(&crit(vec![], vec![], 0, M::IsNull)));
        assert_eq!(run(&pool, f).await, vec![leaf]);

        let mut f = FilterBuilder::new("tags");
        parents.count(
            &mut f,
            "parent_count",
            Some(&IntCriterion {
                value: 0,
                value2: None,
                modifier: M::Equals,
            }),
        );
        assert_eq!(run(&pool, f).await, vec![root]);
    }

    #[tokio::test]
    async fn test_studio_hierarchy_on_foreign_key() {
        let pool = fixtures::pool().await;
        let network = fixtures::studio(&pool, "Network", None).await;
        let label = fixtures::studio(&pool, "Label", Some(network)).await;
        let other = fixtures::studio(&pool, "Other", None).await;

        let s1 = fixtures::scene_with_studio(&pool, "s1", Some(network)).await;
        let s2 = fixtures::scene_with_studio(&pool, "s2", Some(label)).await;
        let s3 = fixtures::scene_with_studio(&pool, "s3", Some(other)).await;
        let s4 = fixtures::scene_with_studio(&pool, "s4", None).await;

        let studio = ForeignKeyHierarchy {
            field: "studios",
            hierarchy: STUDIOS,
            fk_column: "scenes.studio_id",
        };

        let mut f = FilterBuilder::new("scenes");
        studio.apply(&mut f, Some(&crit(vec![network], vec![], -1, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![s1, s2]);

        let mut f = FilterBuilder::new("scenes");
        studio.apply(&mut f, Some(&crit(vec![network], vec![], -1, M::Excludes)));
        assert_eq!(run(&pool, f).await, vec![s3, s4]);

        let mut f = FilterBuilder::new("scenes");
        studio.apply(&mut f, Some(&crit(vec![network, label], vec![], -1, M::Equals)));
        assert_eq!(run(&pool, f).await, vec![s2]);
    }

    #[tokio::test]
    async fn test_performer_tags() {
        let pool = fixtures::pool().await;
        let parent = fixtures::tag(&pool, "parent").await;
        let child = fixtures::tag(&pool, "child").await;
        fixtures::tag_parent(&pool, parent, child).await;

        let p1 = fixtures::performer(&pool, "P1").await;
        let p2 = fixtures::performer(&pool, "P2").await;
        fixtures::tag_performer(&pool, p1, child).await;

        let s1 = fixtures::scene(&pool, "s1").await;
        let s2 = fixtures::scene(&pool, "s2").await;
        let s3 = fixtures::scene(&pool, "s3").await;
        fixtures::performer_scene(&pool, p1, s1).await;
        fixtures::performer_scene(&pool, p2, s2).await;

        let handler = PerformerTags {
            primary_table: "scenes",
            join_table: "performers_scenes",
            primary_fk: "scene_id",
        };

        let mut f = FilterBuilder::new("scenes");
        handler.apply(&mut f, Some(&crit(vec![parent], vec![], -1, M::Includes)));
        assert_eq!(run(&pool, f).await, vec![s1]);

        let mut f = FilterBuilder::new("scenes");
        handler.apply(&mut f, Some(&crit(vec![parent], vec![], -1, M::Excludes)));
        assert_eq!(run(&pool, f).await, vec![s2, s3]);

        let mut f = FilterBuilder::new("scenes");
        handler.apply(&mut f, Some(&crit(vec![], vec![], 0, M::IsNull)));
        assert_eq!(run(&pool, f).await, vec![s2, s3]);
    }
}
