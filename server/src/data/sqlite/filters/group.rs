//! Group filter
//!
//! Groups reach performers only through their scenes, so the performer
//! criterion goes through `groups_scenes` and `performers_scenes`.

use serde::{Deserialize, Serialize};

use super::builder::{FilterBuilder, SqlArg};
use super::criterion::{
    RelationCount, StringList, date_criterion, int_criterion, string_criterion,
    timestamp_criterion,
};
use super::hierarchy::{
    Direction, ForeignKeyHierarchy, GROUPS, HierarchyRelation, JoinedHierarchy, STUDIOS, TAGS,
};
use super::types::{
    CriterionModifier, DateCriterion, HierarchicalMultiCriterion, IntCriterion, MultiCriterion,
    StringCriterion, TimestampCriterion,
};
use super::{
    EntityFilter, EntityKind, RelatedLink, SceneFilter, StudioFilter, check_related,
    missing_column, missing_key, missing_link, related_join, related_subquery,
};
use crate::data::error::FilterError;
use crate::utils::sql::placeholders;

use CriterionModifier as M;

const MISSING_KEYS: &[&str] = &[
    "front_image",
    "back_image",
    "scenes",
    "url",
    "studio",
    "tags",
    "date",
    "director",
    "synopsis",
];

const O_COUNTER_EXPR: &str = "(SELECT COALESCE(SUM(s.o_counter), 0) FROM groups_scenes gs \
     INNER JOIN scenes s ON s.id = gs.scene_id WHERE gs.group_id = groups.id)";

const CONTAINING: HierarchyRelation<'static> = HierarchyRelation {
    field: "containing_groups",
    hierarchy: GROUPS,
    direction: Direction::Descendants,
};

const SUB_GROUPS: HierarchyRelation<'static> = HierarchyRelation {
    field: "sub_groups",
    hierarchy: GROUPS,
    direction: Direction::Ancestors,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<GroupFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<GroupFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<GroupFilter>>,

    pub name: Option<StringCriterion>,
    pub director: Option<StringCriterion>,
    pub synopsis: Option<StringCriterion>,
    /// Seconds
    pub duration: Option<IntCriterion>,
    pub rating100: Option<IntCriterion>,
    pub date: Option<DateCriterion>,
    pub url: Option<StringCriterion>,
    pub is_missing: Option<String>,
    pub studios: Option<HierarchicalMultiCriterion>,
    pub performers: Option<MultiCriterion>,
    pub tags: Option<HierarchicalMultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub containing_groups: Option<HierarchicalMultiCriterion>,
    pub sub_groups: Option<HierarchicalMultiCriterion>,
    pub containing_group_count: Option<IntCriterion>,
    pub sub_group_count: Option<IntCriterion>,
    pub o_counter: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub scenes_filter: Option<Box<SceneFilter>>,
    pub studios_filter: Option<Box<StudioFilter>>,
}

/// `SELECT group_id` of groups with a scene featuring a performer matching
/// `condition`
fn performer_groups(condition: &str) -> String {
    format!(
        "SELECT gs.group_id FROM groups_scenes gs \
         INNER JOIN performers_scenes ps ON ps.scene_id = gs.scene_id WHERE {}",
        condition
    )
}

fn performers_criterion(f: &mut FilterBuilder, c: Option<&MultiCriterion>) {
    const FIELD: &str = "performers";
    let Some(c) = c else { return };
    let mut modifier = c.modifier();

    if matches!(modifier, M::IsNull | M::NotNull) {
        let op = if modifier == M::NotNull { "IN" } else { "NOT IN" };
        f.add_where(
            format!("groups.id {} ({})", op, performer_groups("1 = 1")),
            vec![],
        );
        return;
    }

    let mut values = c.value.clone();
    let mut excludes = c.excludes.clone();
    if modifier == M::Excludes {
        modifier = M::Includes;
        excludes.append(&mut values);
    }
    let ids = |ids: &[i64]| ids.iter().map(|id| SqlArg::Int(*id)).collect::<Vec<_>>();

    if !values.is_empty() {
        let condition = format!("ps.performer_id IN ({})", placeholders(values.len()));
        match modifier {
            M::Includes => f.add_where(
                format!("groups.id IN ({})", performer_groups(&condition)),
                ids(&values),
            ),
            M::IncludesAll => {
                let mut args = ids(&values);
                args.push(SqlArg::Int(values.len() as i64));
                f.add_where(
                    format!(
                        "groups.id IN ({} GROUP BY gs.group_id HAVING COUNT(DISTINCT ps.performer_id) = ?)",
                        performer_groups(&condition)
                    ),
                    args,
                );
            }
            M::Equals
            | M::NotEquals
            | M::GreaterThan
            | M::LessThan
            | M::IsNull
            | M::NotNull
            | M::Excludes
            | M::MatchesRegex
            | M::NotMatchesRegex
            | M::Between
            | M::NotBetween => {
                return f.set_error(FilterError::unsupported_modifier(FIELD, modifier));
            }
        }
    }

    if !excludes.is_empty() {
        let condition = format!("ps.performer_id IN ({})", placeholders(excludes.len()));
        f.add_where(
            format!("groups.id NOT IN ({})", performer_groups(&condition)),
            ids(&excludes),
        );
    }
}

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "front_image" => f.add_where("groups.front_image_blob IS NULL", vec![]),
        "back_image" => f.add_where("groups.back_image_blob IS NULL", vec![]),
        "studio" => f.add_where("groups.studio_id IS NULL", vec![]),
        "scenes" => missing_link(f, "groups_scenes", "group_id"),
        "url" => missing_link(f, "group_urls", "group_id"),
        "tags" => missing_link(f, "groups_tags", "group_id"),
        column => missing_column(f, &format!("groups.{}", column)),
    }
}

impl EntityFilter for GroupFilter {
    const KIND: EntityKind = EntityKind::Groups;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("scenes_filter", self.scenes_filter.as_deref(), is_related)?;
        check_related("studios_filter", self.studios_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        string_criterion(f, "name", "groups.name", self.name.as_ref());
        string_criterion(f, "director", "groups.director", self.director.as_ref());
        string_criterion(f, "synopsis", "groups.synopsis", self.synopsis.as_ref());
        int_criterion(f, "duration", "groups.duration", self.duration.as_ref());
        int_criterion(f, "rating100", "groups.rating", self.rating100.as_ref());
        date_criterion(f, "date", "groups.date", self.date.as_ref());
        StringList {
            field: "url",
            primary_table: "groups",
            join_table: "group_urls",
            primary_fk: "group_id",
            column: "url",
        }
        .apply(f, self.url.as_ref());
        is_missing_criterion(f, self.is_missing.as_deref());

        ForeignKeyHierarchy {
            field: "studios",
            hierarchy: STUDIOS,
            fk_column: "groups.studio_id",
        }
        .apply(f, self.studios.as_ref());
        performers_criterion(f, self.performers.as_ref());
        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: "groups",
            join_table: "groups_tags",
            primary_fk: "group_id",
            foreign_fk: "tag_id",
        }
        .apply(f, self.tags.as_ref());
        RelationCount {
            field: "tag_count",
            primary_table: "groups",
            join_table: "groups_tags",
            primary_fk: "group_id",
            counted: "tag_id",
        }
        .apply(f, self.tag_count.as_ref());
        RelationCount {
            field: "scene_count",
            primary_table: "groups",
            join_table: "groups_scenes",
            primary_fk: "group_id",
            counted: "scene_id",
        }
        .apply(f, self.scene_count.as_ref());

        CONTAINING.apply(f, self.containing_groups.as_ref());
        SUB_GROUPS.apply(f, self.sub_groups.as_ref());
        CONTAINING.count(
            f,
            "containing_group_count",
            self.containing_group_count.as_ref(),
        );
        SUB_GROUPS.count(f, "sub_group_count", self.sub_group_count.as_ref());

        int_criterion(f, "o_counter", O_COUNTER_EXPR, self.o_counter.as_ref());
        timestamp_criterion(f, "created_at", "groups.created_at", self.created_at.as_ref());
        timestamp_criterion(f, "updated_at", "groups.updated_at", self.updated_at.as_ref());

        related_subquery(
            f,
            self.scenes_filter.as_deref(),
            RelatedLink::Through {
                join_table: "groups_scenes",
                primary_fk: "group_id",
                foreign_fk: "scene_id",
            },
        );
        related_join(
            f,
            self.studios_filter.as_deref(),
            "studios.id = groups.studio_id",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::fixtures::{self, filter, ids};

    async fn contain(pool: &sqlx::SqlitePool, containing: i64, sub: i64) {
        fixtures::exec(
            pool,
            &format!(
                "INSERT INTO groups_relations (containing_id, sub_id) VALUES ({}, {})",
                containing, sub
            ),
        )
        .await;
    }

    #[tokio::test]
    async fn test_containing_and_sub_groups() {
        let pool = fixtures::pool().await;
        let box_set = fixtures::group(&pool, "Box set").await;
        let volume = fixtures::group(&pool, "Volume 1").await;
        let disc = fixtures::group(&pool, "Disc A").await;
        contain(&pool, box_set, volume).await;
        contain(&pool, volume, disc).await;

        let f: GroupFilter = filter(&format!(
            r#"{{"containing_groups": {{"value": [{}], "depth": -1, "modifier": "INCLUDES"}}}}"#,
            box_set
        ));
        assert_eq!(ids(&pool, &f).await, vec![volume, disc]);

        let f: GroupFilter = filter(&format!(
            r#"{{"sub_groups": {{"value": [{}], "modifier": "INCLUDES"}}}}"#,
            disc
        ));
        assert_eq!(ids(&pool, &f).await, vec![volume]);

        let f: GroupFilter =
            filter(r#"{"sub_group_count": {"value": 0, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![disc]);

        let f: GroupFilter = filter(r#"{"containing_groups": {"modifier": "IS_NULL"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![box_set]);
    }

    #[tokio::test]
    async fn test_performers_through_scenes() {
        let pool = fixtures::pool().await;
        let g1 = fixtures::group(&pool, "G1").await;
        let g2 = fixtures::group(&pool, "G2").await;
        let g3 = fixtures::group(&pool, "G3").await;
        let p1 = fixtures::performer(&pool, "P1").await;
        let p2 = fixtures::performer(&pool, "P2").await;
        let s1 = fixtures::scene(&pool, "S1").await;
        let s2 = fixtures::scene(&pool, "S2").await;
        fixtures::performer_scene(&pool, p1, s1).await;
        fixtures::performer_scene(&pool, p2, s1).await;
        fixtures::performer_scene(&pool, p1, s2).await;
        fixtures::group_scene(&pool, g1, s1).await;
        fixtures::group_scene(&pool, g2, s2).await;

        let f: GroupFilter = filter(&format!(
            r#"{{"performers": {{"value": [{}, {}], "modifier": "INCLUDES_ALL"}}}}"#,
            p1, p2
        ));
        assert_eq!(ids(&pool, &f).await, vec![g1]);

        let f: GroupFilter = filter(&format!(
            r#"{{"performers": {{"value": [{}], "modifier": "EXCLUDES"}}}}"#,
            p2
        ));
        assert_eq!(ids(&pool, &f).await, vec![g2, g3]);

        let f: GroupFilter = filter(r#"{"performers": {"modifier": "IS_NULL"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![g3]);

        let f: GroupFilter = filter(r#"{"is_missing": "scenes"}"#);
        assert_eq!(ids(&pool, &f).await, vec![g3]);
    }

    #[tokio::test]
    async fn test_o_counter_and_related_scenes() {
        let pool = fixtures::pool().await;
        let g1 = fixtures::group(&pool, "G1").await;
        let g2 = fixtures::group(&pool, "G2").await;
        let s1 = fixtures::scene(&pool, "watched").await;
        let s2 = fixtures::scene(&pool, "also watched").await;
        fixtures::exec(&pool, "UPDATE scenes SET o_counter = 2").await;
        fixtures::group_scene(&pool, g1, s1).await;
        fixtures::group_scene(&pool, g1, s2).await;

        let f: GroupFilter = filter(r#"{"o_counter": {"value": 4, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![g1]);

        let f: GroupFilter = filter(r#"{"o_counter": {"value": 0, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![g2]);

        let f: GroupFilter =
            filter(r#"{"scenes_filter": {"title": {"value": "also", "modifier": "INCLUDES"}}}"#);
        assert_eq!(ids(&pool, &f).await, vec![g1]);
    }
}
