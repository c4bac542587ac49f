//! Image filter

use serde::{Deserialize, Serialize};

use super::builder::FilterBuilder;
use super::criterion::{
    JoinedMulti, PerformerLink, RelationCount, StringList, bool_criterion, date_criterion,
    int_criterion, orientation_clause, path_clause, push_where, resolution_clause,
    string_clause, string_criterion, timestamp_criterion,
};
use super::hierarchy::{ForeignKeyHierarchy, JoinedHierarchy, PerformerTags, STUDIOS, TAGS};
use super::types::{
    DateCriterion, HierarchicalMultiCriterion, IntCriterion, MultiCriterion,
    OrientationCriterion, ResolutionCriterion, StringCriterion, TimestampCriterion,
};
use super::{
    EntityFilter, EntityKind, GalleryFilter, PerformerFilter, RelatedLink, StudioFilter,
    TagFilter, check_related, missing_column, missing_key, missing_link, related_join,
    related_subquery,
};
use crate::data::error::FilterError;

const MISSING_KEYS: &[&str] = &[
    "studio",
    "performers",
    "galleries",
    "tags",
    "url",
    "date",
    "title",
    "code",
    "details",
    "photographer",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<ImageFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<ImageFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<ImageFilter>>,

    pub id: Option<IntCriterion>,
    pub checksum: Option<StringCriterion>,
    pub title: Option<StringCriterion>,
    pub code: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub photographer: Option<StringCriterion>,
    pub path: Option<StringCriterion>,
    pub file_count: Option<IntCriterion>,
    pub rating100: Option<IntCriterion>,
    pub o_counter: Option<IntCriterion>,
    pub organized: Option<bool>,
    pub date: Option<DateCriterion>,
    pub url: Option<StringCriterion>,
    pub resolution: Option<ResolutionCriterion>,
    pub orientation: Option<OrientationCriterion>,
    pub is_missing: Option<String>,
    pub tags: Option<HierarchicalMultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub galleries: Option<MultiCriterion>,
    pub performers: Option<MultiCriterion>,
    pub performer_count: Option<IntCriterion>,
    pub studios: Option<HierarchicalMultiCriterion>,
    pub performer_tags: Option<HierarchicalMultiCriterion>,
    pub performer_favorite: Option<bool>,
    pub performer_age: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub galleries_filter: Option<Box<GalleryFilter>>,
    pub performers_filter: Option<Box<PerformerFilter>>,
    pub studios_filter: Option<Box<StudioFilter>>,
    pub tags_filter: Option<Box<TagFilter>>,
}

fn join_files(f: &mut FilterBuilder) {
    f.add_left_join("images_files", "", "images_files.image_id = images.id");
    f.add_left_join("files", "", "images_files.file_id = files.id");
}

fn join_image_files(f: &mut FilterBuilder) {
    join_files(f);
    f.add_left_join("image_files", "", "image_files.file_id = images_files.file_id");
}

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "studio" => f.add_where("images.studio_id IS NULL", vec![]),
        "performers" => missing_link(f, "performers_images", "image_id"),
        "galleries" => missing_link(f, "galleries_images", "image_id"),
        "tags" => missing_link(f, "images_tags", "image_id"),
        "url" => missing_link(f, "image_urls", "image_id"),
        column => missing_column(f, &format!("images.{}", column)),
    }
}

impl EntityFilter for ImageFilter {
    const KIND: EntityKind = EntityKind::Images;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("galleries_filter", self.galleries_filter.as_deref(), is_related)?;
        check_related("performers_filter", self.performers_filter.as_deref(), is_related)?;
        check_related("studios_filter", self.studios_filter.as_deref(), is_related)?;
        check_related("tags_filter", self.tags_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        const T: &str = "images";

        int_criterion(f, "id", "images.id", self.id.as_ref());
        if let Some(c) = &self.checksum {
            join_files(f);
            f.add_left_join(
                "files_fingerprints",
                "fingerprints_md5",
                "fingerprints_md5.file_id = images_files.file_id AND fingerprints_md5.type = 'md5'",
            );
            push_where(
                f,
                string_clause("checksum", &["fingerprints_md5.fingerprint"], c),
            );
        }
        string_criterion(f, "title", "images.title", self.title.as_ref());
        string_criterion(f, "code", "images.code", self.code.as_ref());
        string_criterion(f, "details", "images.details", self.details.as_ref());
        string_criterion(
            f,
            "photographer",
            "images.photographer",
            self.photographer.as_ref(),
        );
        if let Some(c) = &self.path {
            join_files(f);
            f.add_left_join("folders", "", "files.parent_folder_id = folders.id");
            push_where(f, path_clause("path", "folders.path", "files.basename", c));
        }
        RelationCount {
            field: "file_count",
            primary_table: T,
            join_table: "images_files",
            primary_fk: "image_id",
            counted: "file_id",
        }
        .apply(f, self.file_count.as_ref());
        int_criterion(f, "rating100", "images.rating", self.rating100.as_ref());
        int_criterion(f, "o_counter", "images.o_counter", self.o_counter.as_ref());
        bool_criterion(f, "images.organized", self.organized);
        date_criterion(f, "date", "images.date", self.date.as_ref());
        StringList {
            field: "url",
            primary_table: T,
            join_table: "image_urls",
            primary_fk: "image_id",
            column: "url",
        }
        .apply(f, self.url.as_ref());
        if let Some(c) = &self.resolution {
            join_image_files(f);
            push_where(
                f,
                resolution_clause("resolution", "image_files.width", "image_files.height", c),
            );
        }
        if let Some(c) = &self.orientation {
            join_image_files(f);
            f.add_where_clause(orientation_clause("image_files.width", "image_files.height", c));
        }
        is_missing_criterion(f, self.is_missing.as_deref());

        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: T,
            join_table: "images_tags",
            primary_fk: "image_id",
            foreign_fk: "tag_id",
        }
        .apply(f, self.tags.as_ref());
        RelationCount {
            field: "tag_count",
            primary_table: T,
            join_table: "images_tags",
            primary_fk: "image_id",
            counted: "tag_id",
        }
        .apply(f, self.tag_count.as_ref());
        JoinedMulti {
            field: "galleries",
            primary_table: T,
            join_table: "galleries_images",
            primary_fk: "image_id",
            foreign_fk: "gallery_id",
        }
        .apply(f, self.galleries.as_ref());
        JoinedMulti {
            field: "performers",
            primary_table: T,
            join_table: "performers_images",
            primary_fk: "image_id",
            foreign_fk: "performer_id",
        }
        .apply(f, self.performers.as_ref());
        RelationCount {
            field: "performer_count",
            primary_table: T,
            join_table: "performers_images",
            primary_fk: "image_id",
            counted: "performer_id",
        }
        .apply(f, self.performer_count.as_ref());
        ForeignKeyHierarchy {
            field: "studios",
            hierarchy: STUDIOS,
            fk_column: "images.studio_id",
        }
        .apply(f, self.studios.as_ref());
        PerformerTags {
            primary_table: T,
            join_table: "performers_images",
            primary_fk: "image_id",
        }
        .apply(f, self.performer_tags.as_ref());
        let performers = PerformerLink {
            primary_table: T,
            join_table: "performers_images",
            primary_fk: "image_id",
        };
        performers.favorite(f, self.performer_favorite);
        performers.age(f, self.performer_age.as_ref());

        timestamp_criterion(f, "created_at", "images.created_at", self.created_at.as_ref());
        timestamp_criterion(f, "updated_at", "images.updated_at", self.updated_at.as_ref());

        related_subquery(
            f,
            self.galleries_filter.as_deref(),
            RelatedLink::Through {
                join_table: "galleries_images",
                primary_fk: "image_id",
                foreign_fk: "gallery_id",
            },
        );
        related_subquery(
            f,
            self.performers_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_images",
                primary_fk: "image_id",
                foreign_fk: "performer_id",
            },
        );
        related_join(
            f,
            self.studios_filter.as_deref(),
            "studios.id = images.studio_id",
        );
        related_subquery(
            f,
            self.tags_filter.as_deref(),
            RelatedLink::Through {
                join_table: "images_tags",
                primary_fk: "image_id",
                foreign_fk: "tag_id",
            },
        );
    }
}
