//! Gallery filter
//!
//! A gallery is backed either by a folder (`galleries.folder_id`) or by a zip
//! file linked through `galleries_files`. Path criteria consider both.

use serde::{Deserialize, Serialize};

use super::builder::{FilterBuilder, SqlClause, and_clauses, or_clauses};
use super::criterion::{
    JoinedMulti, PerformerLink, RelationCount, StringList, bool_criterion, date_criterion,
    int_criterion, path_clause, push_where, string_clause, string_criterion,
    timestamp_criterion,
};
use super::hierarchy::{ForeignKeyHierarchy, JoinedHierarchy, PerformerTags, STUDIOS, TAGS};
use super::types::{
    CriterionModifier, DateCriterion, HierarchicalMultiCriterion, IntCriterion, MultiCriterion,
    ResolutionCriterion, StringCriterion, TimestampCriterion,
};
use super::{
    EntityFilter, EntityKind, ImageFilter, PerformerFilter, RelatedLink, SceneFilter,
    StudioFilter, TagFilter, check_related, missing_column, missing_key, missing_link,
    related_join, related_subquery,
};
use crate::data::error::FilterError;

use CriterionModifier as M;

const MISSING_KEYS: &[&str] = &[
    "url",
    "scenes",
    "studio",
    "performers",
    "tags",
    "date",
    "title",
    "code",
    "details",
    "photographer",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<GalleryFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<GalleryFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<GalleryFilter>>,

    pub id: Option<IntCriterion>,
    pub title: Option<StringCriterion>,
    pub code: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub photographer: Option<StringCriterion>,
    pub checksum: Option<StringCriterion>,
    pub is_zip: Option<bool>,
    pub path: Option<StringCriterion>,
    pub file_count: Option<IntCriterion>,
    pub rating100: Option<IntCriterion>,
    pub url: Option<StringCriterion>,
    pub organized: Option<bool>,
    pub is_missing: Option<String>,
    pub tags: Option<HierarchicalMultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub performers: Option<MultiCriterion>,
    pub performer_count: Option<IntCriterion>,
    pub scenes: Option<MultiCriterion>,
    pub has_chapters: Option<bool>,
    pub studios: Option<HierarchicalMultiCriterion>,
    pub performer_tags: Option<HierarchicalMultiCriterion>,
    pub average_resolution: Option<ResolutionCriterion>,
    pub image_count: Option<IntCriterion>,
    pub performer_favorite: Option<bool>,
    pub performer_age: Option<IntCriterion>,
    pub date: Option<DateCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub scenes_filter: Option<Box<SceneFilter>>,
    pub images_filter: Option<Box<ImageFilter>>,
    pub performers_filter: Option<Box<PerformerFilter>>,
    pub studios_filter: Option<Box<StudioFilter>>,
    pub tags_filter: Option<Box<TagFilter>>,
}

fn join_files(f: &mut FilterBuilder) {
    f.add_left_join("galleries_files", "", "galleries_files.gallery_id = galleries.id");
    f.add_left_join("files", "", "galleries_files.file_id = files.id");
}

/// Matches the zip file path or the backing folder path.
fn path_criterion(f: &mut FilterBuilder, c: &StringCriterion) {
    join_files(f);
    f.add_left_join("folders", "", "files.parent_folder_id = folders.id");
    f.add_left_join("folders", "gallery_folder", "galleries.folder_id = gallery_folder.id");

    let clause = path_clause("path", "folders.path", "files.basename", c).and_then(|zip| {
        let folder = string_clause("path", &["gallery_folder.path"], c)?;
        // negative forms must miss on both sources
        Ok(match c.modifier {
            M::NotEquals | M::Excludes | M::NotMatchesRegex | M::IsNull => {
                and_clauses(vec![zip, folder])
            }
            _ => or_clauses(vec![zip, folder]),
        })
    });
    push_where(f, clause);
}

/// Average short side of the gallery's images, bucketed like `resolution`.
fn average_resolution_clause(c: &ResolutionCriterion) -> Result<SqlClause, FilterError> {
    let (min, max) = (c.value.min(), c.value.max());
    let having = match c.modifier {
        M::Equals => format!("BETWEEN {} AND {}", min, max),
        M::NotEquals => format!("NOT BETWEEN {} AND {}", min, max),
        M::LessThan => format!("< {}", min),
        M::GreaterThan => format!("> {}", max),
        M::IsNull
        | M::NotNull
        | M::Includes
        | M::Excludes
        | M::IncludesAll
        | M::MatchesRegex
        | M::NotMatchesRegex
        | M::Between
        | M::NotBetween => {
            return Err(FilterError::unsupported_modifier(
                "average_resolution",
                c.modifier,
            ));
        }
    };
    Ok(SqlClause::plain(format!(
        "galleries.id IN (SELECT gi.gallery_id FROM galleries_images AS gi \
         INNER JOIN images_files AS imf ON imf.image_id = gi.image_id \
         INNER JOIN image_files AS img ON img.file_id = imf.file_id \
         GROUP BY gi.gallery_id HAVING AVG(MIN(img.width, img.height)) {})",
        having
    )))
}

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "url" => missing_link(f, "gallery_urls", "gallery_id"),
        "scenes" => missing_link(f, "scenes_galleries", "gallery_id"),
        "performers" => missing_link(f, "performers_galleries", "gallery_id"),
        "tags" => missing_link(f, "galleries_tags", "gallery_id"),
        "studio" => f.add_where("galleries.studio_id IS NULL", vec![]),
        column => missing_column(f, &format!("galleries.{}", column)),
    }
}

impl EntityFilter for GalleryFilter {
    const KIND: EntityKind = EntityKind::Galleries;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("scenes_filter", self.scenes_filter.as_deref(), is_related)?;
        check_related("images_filter", self.images_filter.as_deref(), is_related)?;
        check_related("performers_filter", self.performers_filter.as_deref(), is_related)?;
        check_related("studios_filter", self.studios_filter.as_deref(), is_related)?;
        check_related("tags_filter", self.tags_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        const T: &str = "galleries";

        int_criterion(f, "id", "galleries.id", self.id.as_ref());
        string_criterion(f, "title", "galleries.title", self.title.as_ref());
        string_criterion(f, "code", "galleries.code", self.code.as_ref());
        string_criterion(f, "details", "galleries.details", self.details.as_ref());
        string_criterion(
            f,
            "photographer",
            "galleries.photographer",
            self.photographer.as_ref(),
        );
        if let Some(c) = &self.checksum {
            join_files(f);
            f.add_left_join(
                "files_fingerprints",
                "fingerprints_md5",
                "fingerprints_md5.file_id = galleries_files.file_id AND fingerprints_md5.type = 'md5'",
            );
            push_where(
                f,
                string_clause("checksum", &["fingerprints_md5.fingerprint"], c),
            );
        }
        if let Some(zip) = self.is_zip {
            let not = if zip { "" } else { "NOT " };
            f.add_where(
                format!(
                    "{}EXISTS (SELECT 1 FROM galleries_files AS gf WHERE gf.gallery_id = galleries.id)",
                    not
                ),
                vec![],
            );
        }
        if let Some(c) = &self.path {
            path_criterion(f, c);
        }
        RelationCount {
            field: "file_count",
            primary_table: T,
            join_table: "galleries_files",
            primary_fk: "gallery_id",
            counted: "file_id",
        }
        .apply(f, self.file_count.as_ref());
        int_criterion(f, "rating100", "galleries.rating", self.rating100.as_ref());
        StringList {
            field: "url",
            primary_table: T,
            join_table: "gallery_urls",
            primary_fk: "gallery_id",
            column: "url",
        }
        .apply(f, self.url.as_ref());
        bool_criterion(f, "galleries.organized", self.organized);
        is_missing_criterion(f, self.is_missing.as_deref());

        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: T,
            join_table: "galleries_tags",
            primary_fk: "gallery_id",
            foreign_fk: "tag_id",
        }
        .apply(f, self.tags.as_ref());
        RelationCount {
            field: "tag_count",
            primary_table: T,
            join_table: "galleries_tags",
            primary_fk: "gallery_id",
            counted: "tag_id",
        }
        .apply(f, self.tag_count.as_ref());
        JoinedMulti {
            field: "performers",
            primary_table: T,
            join_table: "performers_galleries",
            primary_fk: "gallery_id",
            foreign_fk: "performer_id",
        }
        .apply(f, self.performers.as_ref());
        RelationCount {
            field: "performer_count",
            primary_table: T,
            join_table: "performers_galleries",
            primary_fk: "gallery_id",
            counted: "performer_id",
        }
        .apply(f, self.performer_count.as_ref());
        JoinedMulti {
            field: "scenes",
            primary_table: T,
            join_table: "scenes_galleries",
            primary_fk: "gallery_id",
            foreign_fk: "scene_id",
        }
        .apply(f, self.scenes.as_ref());
        if let Some(has) = self.has_chapters {
            let op = if has { "IN" } else { "NOT IN" };
            f.add_where(
                format!(
                    "galleries.id {} (SELECT gallery_id FROM galleries_chapters)",
                    op
                ),
                vec![],
            );
        }
        ForeignKeyHierarchy {
            field: "studios",
            hierarchy: STUDIOS,
            fk_column: "galleries.studio_id",
        }
        .apply(f, self.studios.as_ref());
        PerformerTags {
            primary_table: T,
            join_table: "performers_galleries",
            primary_fk: "gallery_id",
        }
        .apply(f, self.performer_tags.as_ref());
        if let Some(c) = &self.average_resolution {
            push_where(f, average_resolution_clause(c));
        }
        RelationCount {
            field: "image_count",
            primary_table: T,
            join_table: "galleries_images",
            primary_fk: "gallery_id",
            counted: "image_id",
        }
        .apply(f, self.image_count.as_ref());
        let performers = PerformerLink {
            primary_table: T,
            join_table: "performers_galleries",
            primary_fk: "gallery_id",
        };
        performers.favorite(f, self.performer_favorite);
        performers.age(f, self.performer_age.as_ref());

        date_criterion(f, "date", "galleries.date", self.date.as_ref());
        timestamp_criterion(f, "created_at", "galleries.created_at", self.created_at.as_ref());
        timestamp_criterion(f, "updated_at", "galleries.updated_at", self.updated_at.as_ref());

        related_subquery(
            f,
            self.scenes_filter.as_deref(),
            RelatedLink::Through {
                join_table: "scenes_galleries",
                primary_fk: "gallery_id",
                foreign_fk: "scene_id",
            },
        );
        related_subquery(
            f,
            self.images_filter.as_deref(),
            RelatedLink::Through {
                join_table: "galleries_images",
                primary_fk: "gallery_id",
                foreign_fk: "image_id",
            },
        );
        related_subquery(
            f,
            self.performers_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_galleries",
                primary_fk: "gallery_id",
                foreign_fk: "performer_id",
            },
        );
        related_join(
            f,
            self.studios_filter.as_deref(),
            "studios.id = galleries.studio_id",
        );
        related_subquery(
            f,
            self.tags_filter.as_deref(),
            RelatedLink::Through {
                join_table: "galleries_tags",
                primary_fk: "gallery_id",
                foreign_fk: "tag_id",
            },
        );
    }
}
