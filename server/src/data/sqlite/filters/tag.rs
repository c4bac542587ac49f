//! Tag filter

use serde::{Deserialize, Serialize};

use super::builder::FilterBuilder;
use super::criterion::{
    RelationCount, StringList, bool_criterion, push_where, string_clause, string_criterion,
    timestamp_criterion,
};
use super::hierarchy::{Direction, HierarchyRelation, TAGS};
use super::types::{HierarchicalMultiCriterion, IntCriterion, StringCriterion, TimestampCriterion};
use super::{
    EntityFilter, EntityKind, GalleryFilter, ImageFilter, RelatedLink, SceneFilter,
    check_related, missing_column, missing_key, missing_link, related_subquery,
};
use crate::data::error::FilterError;

const MISSING_KEYS: &[&str] = &["image", "aliases", "description"];

const PARENTS: HierarchyRelation<'static> = HierarchyRelation {
    field: "parents",
    hierarchy: TAGS,
    direction: Direction::Descendants,
};

const CHILDREN: HierarchyRelation<'static> = HierarchyRelation {
    field: "children",
    hierarchy: TAGS,
    direction: Direction::Ancestors,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<TagFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<TagFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<TagFilter>>,

    pub name: Option<StringCriterion>,
    pub aliases: Option<StringCriterion>,
    pub favorite: Option<bool>,
    pub description: Option<StringCriterion>,
    pub ignore_auto_tag: Option<bool>,
    pub is_missing: Option<String>,
    pub scene_count: Option<IntCriterion>,
    pub image_count: Option<IntCriterion>,
    pub gallery_count: Option<IntCriterion>,
    pub performer_count: Option<IntCriterion>,
    pub studio_count: Option<IntCriterion>,
    pub group_count: Option<IntCriterion>,
    pub marker_count: Option<IntCriterion>,
    pub parents: Option<HierarchicalMultiCriterion>,
    pub children: Option<HierarchicalMultiCriterion>,
    pub parent_count: Option<IntCriterion>,
    pub child_count: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub scenes_filter: Option<Box<SceneFilter>>,
    pub images_filter: Option<Box<ImageFilter>>,
    pub galleries_filter: Option<Box<GalleryFilter>>,
}

/// Usage counts as (field, join table, counted column)
const USAGE_COUNTS: [(&str, &str, &str); 6] = [
    ("scene_count", "scenes_tags", "scene_id"),
    ("image_count", "images_tags", "image_id"),
    ("gallery_count", "galleries_tags", "gallery_id"),
    ("performer_count", "performers_tags", "performer_id"),
    ("studio_count", "studios_tags", "studio_id"),
    ("group_count", "groups_tags", "group_id"),
];

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "image" => f.add_where("tags.image_blob IS NULL", vec![]),
        "aliases" => missing_link(f, "tag_aliases", "tag_id"),
        column => missing_column(f, &format!("tags.{}", column)),
    }
}

impl TagFilter {
    fn usage_criteria(&self) -> [Option<&IntCriterion>; 6] {
        [
            self.scene_count.as_ref(),
            self.image_count.as_ref(),
            self.gallery_count.as_ref(),
            self.performer_count.as_ref(),
            self.studio_count.as_ref(),
            self.group_count.as_ref(),
        ]
    }
}

impl EntityFilter for TagFilter {
    const KIND: EntityKind = EntityKind::Tags;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("scenes_filter", self.scenes_filter.as_deref(), is_related)?;
        check_related("images_filter", self.images_filter.as_deref(), is_related)?;
        check_related("galleries_filter", self.galleries_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        if let Some(c) = &self.name {
            let alias = f.unique_alias("tag_aliases");
            f.add_left_join("tag_aliases", &alias, &format!("{}.tag_id = tags.id", alias));
            let alias_column = format!("{}.alias", alias);
            push_where(
                f,
                string_clause("name", &["tags.name", alias_column.as_str()], c),
            );
        }
        StringList {
            field: "aliases",
            primary_table: "tags",
            join_table: "tag_aliases",
            primary_fk: "tag_id",
            column: "alias",
        }
        .apply(f, self.aliases.as_ref());
        bool_criterion(f, "tags.favorite", self.favorite);
        string_criterion(f, "description", "tags.description", self.description.as_ref());
        bool_criterion(f, "tags.ignore_auto_tag", self.ignore_auto_tag);
        is_missing_criterion(f, self.is_missing.as_deref());

        let usage = USAGE_COUNTS.into_iter().zip(self.usage_criteria());
        for ((field, join_table, counted), c) in usage {
            RelationCount {
                field,
                primary_table: "tags",
                join_table,
                primary_fk: "tag_id",
                counted,
            }
            .apply(f, c);
        }
        RelationCount {
            field: "marker_count",
            primary_table: "tags",
            join_table: "scene_markers",
            primary_fk: "primary_tag_id",
            counted: "id",
        }
        .apply(f, self.marker_count.as_ref());

        PARENTS.apply(f, self.parents.as_ref());
        CHILDREN.apply(f, self.children.as_ref());
        PARENTS.count(f, "parent_count", self.parent_count.as_ref());
        CHILDREN.count(f, "child_count", self.child_count.as_ref());

        timestamp_criterion(f, "created_at", "tags.created_at", self.created_at.as_ref());
        timestamp_criterion(f, "updated_at", "tags.updated_at", self.updated_at.as_ref());

        related_subquery(
            f,
            self.scenes_filter.as_deref(),
            RelatedLink::Through {
                join_table: "scenes_tags",
                primary_fk: "tag_id",
                foreign_fk: "scene_id",
            },
        );
        related_subquery(
            f,
            self.images_filter.as_deref(),
            RelatedLink::Through {
                join_table: "images_tags",
                primary_fk: "tag_id",
                foreign_fk: "image_id",
            },
        );
        related_subquery(
            f,
            self.galleries_filter.as_deref(),
            RelatedLink::Through {
                join_table: "galleries_tags",
                primary_fk: "tag_id",
                foreign_fk: "gallery_id",
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::fixtures::{self, filter, ids};

    #[tokio::test]
    async fn test_chain_parents_and_children() {
        let pool = fixtures::pool().await;
        let t1 = fixtures::tag(&pool, "T1").await;
        let t2 = fixtures::tag(&pool, "T2").await;
        let t3 = fixtures::tag(&pool, "T3").await;
        fixtures::tag_parent(&pool, t1, t2).await;
        fixtures::tag_parent(&pool, t2, t3).await;

        let f: TagFilter = filter(&format!(
            r#"{{"parents": {{"value": [{}], "depth": -1, "modifier": "INCLUDES"}}}}"#,
            t1
        ));
        assert_eq!(ids(&pool, &f).await, vec![t2, t3]);

        let f: TagFilter = filter(&format!(
            r#"{{"children": {{"value": [{}], "modifier": "INCLUDES"}}}}"#,
            t3
        ));
        assert_eq!(ids(&pool, &f).await, vec![t2]);

        let f: TagFilter = filter(r#"{"children": {"modifier": "IS_NULL"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![t3]);

        let f: TagFilter = filter(r#"{"parent_count": {"value": 1, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![t2, t3]);

        let f: TagFilter = filter(&format!(
            r#"{{"parents": {{"value": [{}], "depth": -2, "modifier": "INCLUDES"}}}}"#,
            t1
        ));
        let err = crate::data::sqlite::filters::compile(&f).unwrap_err();
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_name_aliases_and_usage() {
        let pool = fixtures::pool().await;
        let used = fixtures::tag(&pool, "Outdoor").await;
        let unused = fixtures::tag(&pool, "Indoor").await;
        fixtures::exec(
            &pool,
            &format!(
                "INSERT INTO tag_aliases (tag_id, alias) VALUES ({}, 'Outside')",
                used
            ),
        )
        .await;
        let scene = fixtures::scene(&pool, "picnic").await;
        fixtures::tag_scene(&pool, scene, used).await;

        let f: TagFilter = filter(r#"{"name": {"value": "outside", "modifier": "INCLUDES"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![used]);

        let f: TagFilter = filter(r#"{"scene_count": {"value": 0, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![unused]);

        let f: TagFilter = filter(r#"{"is_missing": "aliases"}"#);
        assert_eq!(ids(&pool, &f).await, vec![unused]);

        let f: TagFilter =
            filter(r#"{"scenes_filter": {"title": {"value": "picnic", "modifier": "EQUALS"}}}"#);
        assert_eq!(ids(&pool, &f).await, vec![used]);
    }

    #[tokio::test]
    async fn test_marker_count() {
        let pool = fixtures::pool().await;
        let primary = fixtures::tag(&pool, "Primary").await;
        let other = fixtures::tag(&pool, "Other").await;
        let scene = fixtures::scene(&pool, "s").await;
        for seconds in [1, 2] {
            fixtures::exec(
                &pool,
                &format!(
                    "INSERT INTO scene_markers (scene_id, title, seconds, primary_tag_id) VALUES ({}, 'm', {}, {})",
                    scene, seconds, primary
                ),
            )
            .await;
        }

        let f: TagFilter = filter(r#"{"marker_count": {"value": 1, "modifier": "GREATER_THAN"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![primary]);

        let f: TagFilter = filter(r#"{"marker_count": {"value": 0, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![other]);
    }
}
