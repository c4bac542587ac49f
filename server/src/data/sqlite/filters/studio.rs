//! Studio filter

use serde::{Deserialize, Serialize};

use super::builder::FilterBuilder;
use super::criterion::{
    RelationCount, StashIds, StringList, bool_criterion, int_criterion, push_where,
    string_clause, string_criterion, timestamp_criterion,
};
use super::hierarchy::{Direction, HierarchyRelation, JoinedHierarchy, STUDIOS, TAGS};
use super::types::{
    HierarchicalMultiCriterion, IntCriterion, StashIdCriterion, StringCriterion,
    TimestampCriterion,
};
use super::{
    EntityFilter, EntityKind, GalleryFilter, ImageFilter, RelatedLink, SceneFilter,
    check_related, missing_column, missing_key, missing_link, related_subquery,
};
use crate::data::error::FilterError;

const MISSING_KEYS: &[&str] = &["image", "stash_id", "aliases", "tags", "details", "url"];

const PARENTS: HierarchyRelation<'static> = HierarchyRelation {
    field: "parents",
    hierarchy: STUDIOS,
    direction: Direction::Descendants,
};

const CHILDREN: HierarchyRelation<'static> = HierarchyRelation {
    field: "children",
    hierarchy: STUDIOS,
    direction: Direction::Ancestors,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudioFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<StudioFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<StudioFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<StudioFilter>>,

    pub name: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub url: Option<StringCriterion>,
    pub rating100: Option<IntCriterion>,
    pub favorite: Option<bool>,
    pub ignore_auto_tag: Option<bool>,
    pub is_missing: Option<String>,
    pub aliases: Option<StringCriterion>,
    pub stash_id_endpoint: Option<StashIdCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub image_count: Option<IntCriterion>,
    pub gallery_count: Option<IntCriterion>,
    pub parents: Option<HierarchicalMultiCriterion>,
    pub children: Option<HierarchicalMultiCriterion>,
    pub parent_count: Option<IntCriterion>,
    pub child_count: Option<IntCriterion>,
    pub tags: Option<HierarchicalMultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub scenes_filter: Option<Box<SceneFilter>>,
    pub images_filter: Option<Box<ImageFilter>>,
    pub galleries_filter: Option<Box<GalleryFilter>>,
}

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "image" => f.add_where("studios.image_blob IS NULL", vec![]),
        "stash_id" => missing_link(f, "studio_stash_ids", "studio_id"),
        "aliases" => missing_link(f, "studio_aliases", "studio_id"),
        "tags" => missing_link(f, "studios_tags", "studio_id"),
        column => missing_column(f, &format!("studios.{}", column)),
    }
}

fn count(field: &'static str, join_table: &'static str) -> RelationCount<'static> {
    RelationCount {
        field,
        primary_table: "studios",
        join_table,
        primary_fk: "studio_id",
        counted: "id",
    }
}

impl EntityFilter for StudioFilter {
    const KIND: EntityKind = EntityKind::Studios;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("scenes_filter", self.scenes_filter.as_deref(), is_related)?;
        check_related("images_filter", self.images_filter.as_deref(), is_related)?;
        check_related("galleries_filter", self.galleries_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        // aliases count as names
        if let Some(c) = &self.name {
            let alias = f.unique_alias("studio_aliases");
            f.add_left_join(
                "studio_aliases",
                &alias,
                &format!("{}.studio_id = studios.id", alias),
            );
            let alias_column = format!("{}.alias", alias);
            push_where(
                f,
                string_clause("name", &["studios.name", alias_column.as_str()], c),
            );
        }
        string_criterion(f, "details", "studios.details", self.details.as_ref());
        string_criterion(f, "url", "studios.url", self.url.as_ref());
        int_criterion(f, "rating100", "studios.rating", self.rating100.as_ref());
        bool_criterion(f, "studios.favorite", self.favorite);
        bool_criterion(f, "studios.ignore_auto_tag", self.ignore_auto_tag);
        is_missing_criterion(f, self.is_missing.as_deref());
        StringList {
            field: "aliases",
            primary_table: "studios",
            join_table: "studio_aliases",
            primary_fk: "studio_id",
            column: "alias",
        }
        .apply(f, self.aliases.as_ref());
        StashIds {
            primary_table: "studios",
            table: "studio_stash_ids",
            primary_fk: "studio_id",
        }
        .apply(f, self.stash_id_endpoint.as_ref());

        count("scene_count", "scenes").apply(f, self.scene_count.as_ref());
        count("image_count", "images").apply(f, self.image_count.as_ref());
        count("gallery_count", "galleries").apply(f, self.gallery_count.as_ref());

        PARENTS.apply(f, self.parents.as_ref());
        CHILDREN.apply(f, self.children.as_ref());
        PARENTS.count(f, "parent_count", self.parent_count.as_ref());
        CHILDREN.count(f, "child_count", self.child_count.as_ref());

        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: "studios",
            join_table: "studios_tags",
            primary_fk: "studio_id",
            foreign_fk: "tag_id",
        }
        .apply(f, self.tags.as_ref());
        RelationCount {
            field: "tag_count",
            primary_table: "studios",
            join_table: "studios_tags",
            primary_fk: "studio_id",
            counted: "tag_id",
        }
        .apply(f, self.tag_count.as_ref());

        timestamp_criterion(f, "created_at", "studios.created_at", self.created_at.as_ref());
        timestamp_criterion(f, "updated_at", "studios.updated_at", self.updated_at.as_ref());

        related_subquery(
            f,
            self.scenes_filter.as_deref(),
            RelatedLink::Reverse("studio_id"),
        );
        related_subquery(
            f,
            self.images_filter.as_deref(),
            RelatedLink::Reverse("studio_id"),
        );
        related_subquery(
            f,
            self.galleries_filter.as_deref(),
            RelatedLink::Reverse("studio_id"),
        );
    }
}
