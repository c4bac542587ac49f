//! Scene filter

use serde::{Deserialize, Serialize};

use super::builder::FilterBuilder;
use super::criterion::{
    JoinedMulti, PerformerLink, RelationCount, StashIds, StringList, bool_criterion,
    date_criterion, float_criterion, float_int_criterion, int_criterion, orientation_clause,
    path_clause, push_where, resolution_clause, string_clause, string_criterion,
    timestamp_criterion,
};
use super::hierarchy::{
    ForeignKeyHierarchy, GROUPS, JoinedHierarchy, PerformerTags, STUDIOS, TAGS,
};
use super::types::{
    DateCriterion, FloatCriterion, HierarchicalMultiCriterion, IntCriterion, MultiCriterion,
    OrientationCriterion, PhashDuplicationCriterion, ResolutionCriterion, StashIdCriterion,
    StringCriterion, TimestampCriterion,
};
use super::{
    EntityFilter, EntityKind, GalleryFilter, GroupFilter, PerformerFilter, RelatedLink,
    StudioFilter, TagFilter, check_related, missing_column, missing_key, missing_link,
    related_join, related_subquery,
};
use crate::data::error::FilterError;

const MISSING_KEYS: &[&str] = &[
    "url",
    "galleries",
    "studio",
    "groups",
    "performers",
    "date",
    "tags",
    "stash_id",
    "phash",
    "cover",
    "title",
    "code",
    "details",
    "director",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<SceneFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<SceneFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<SceneFilter>>,

    pub id: Option<IntCriterion>,
    pub title: Option<StringCriterion>,
    pub code: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub director: Option<StringCriterion>,
    pub url: Option<StringCriterion>,
    pub path: Option<StringCriterion>,
    pub file_count: Option<IntCriterion>,
    /// MD5 of any file
    pub checksum: Option<StringCriterion>,
    pub oshash: Option<StringCriterion>,
    pub rating100: Option<IntCriterion>,
    pub o_counter: Option<IntCriterion>,
    pub organized: Option<bool>,
    /// Whole seconds
    pub duration: Option<IntCriterion>,
    pub resolution: Option<ResolutionCriterion>,
    pub orientation: Option<OrientationCriterion>,
    pub has_markers: Option<bool>,
    pub is_missing: Option<String>,
    pub stash_id_endpoint: Option<StashIdCriterion>,
    pub interactive: Option<bool>,
    pub interactive_speed: Option<IntCriterion>,
    /// Caption language code
    pub captions: Option<StringCriterion>,
    pub resume_time: Option<FloatCriterion>,
    pub play_duration: Option<FloatCriterion>,
    pub play_count: Option<IntCriterion>,
    pub tags: Option<HierarchicalMultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub performers: Option<MultiCriterion>,
    pub performer_count: Option<IntCriterion>,
    pub studios: Option<HierarchicalMultiCriterion>,
    pub groups: Option<HierarchicalMultiCriterion>,
    pub galleries: Option<MultiCriterion>,
    pub performer_tags: Option<HierarchicalMultiCriterion>,
    pub performer_favorite: Option<bool>,
    pub performer_age: Option<IntCriterion>,
    pub duplicated: Option<PhashDuplicationCriterion>,
    pub date: Option<DateCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub galleries_filter: Option<Box<GalleryFilter>>,
    pub performers_filter: Option<Box<PerformerFilter>>,
    pub studios_filter: Option<Box<StudioFilter>>,
    pub tags_filter: Option<Box<TagFilter>>,
    pub groups_filter: Option<Box<GroupFilter>>,
}

/// Files of the scene; every file criterion shares these joins
fn join_files(f: &mut FilterBuilder) {
    f.add_left_join("scenes_files", "", "scenes_files.scene_id = scenes.id");
    f.add_left_join("files", "", "scenes_files.file_id = files.id");
}

fn join_video_files(f: &mut FilterBuilder) {
    join_files(f);
    f.add_left_join("video_files", "", "video_files.file_id = scenes_files.file_id");
}

fn path_criterion(f: &mut FilterBuilder, c: Option<&StringCriterion>) {
    let Some(c) = c else { return };
    join_files(f);
    f.add_left_join("folders", "", "files.parent_folder_id = folders.id");
    push_where(f, path_clause("path", "folders.path", "files.basename", c));
}

fn fingerprint_criterion(
    f: &mut FilterBuilder,
    field: &str,
    kind: &str,
    c: Option<&StringCriterion>,
) {
    let Some(c) = c else { return };
    join_files(f);
    let alias = format!("fingerprints_{}", kind);
    f.add_left_join(
        "files_fingerprints",
        &alias,
        &format!(
            "{a}.file_id = scenes_files.file_id AND {a}.type = '{kind}'",
            a = alias,
            kind = kind
        ),
    );
    push_where(f, string_clause(field, &[&format!("{}.fingerprint", alias)], c));
}

fn captions_criterion(f: &mut FilterBuilder, c: Option<&StringCriterion>) {
    let Some(c) = c else { return };
    join_files(f);
    f.add_left_join(
        "video_captions",
        "",
        "video_captions.file_id = scenes_files.file_id",
    );
    push_where(
        f,
        string_clause("captions", &["video_captions.language_code"], c),
    );
}

fn has_markers_criterion(f: &mut FilterBuilder, value: Option<bool>) {
    let Some(v) = value else { return };
    let op = if v { "IN" } else { "NOT IN" };
    f.add_where(
        format!("scenes.id {} (SELECT scene_markers.scene_id FROM scene_markers)", op),
        vec![],
    );
}

/// Scenes sharing a perceptual hash with another scene
fn duplicated_criterion(f: &mut FilterBuilder, c: Option<&PhashDuplicationCriterion>) {
    let Some(v) = c.and_then(|c| c.duplicated) else {
        return;
    };
    let op = if v { "IN" } else { "NOT IN" };
    f.add_where(
        format!(
            "scenes.id {} (SELECT sf.scene_id FROM scenes_files sf \
             INNER JOIN files_fingerprints fp ON fp.file_id = sf.file_id AND fp.type = 'phash' \
             WHERE fp.fingerprint IN (SELECT fp2.fingerprint FROM files_fingerprints fp2 \
             INNER JOIN scenes_files sf2 ON sf2.file_id = fp2.file_id \
             WHERE fp2.type = 'phash' GROUP BY fp2.fingerprint \
             HAVING COUNT(DISTINCT sf2.scene_id) > 1))",
            op
        ),
        vec![],
    );
}

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "url" => missing_link(f, "scene_urls", "scene_id"),
        "galleries" => missing_link(f, "scenes_galleries", "scene_id"),
        "groups" => missing_link(f, "groups_scenes", "scene_id"),
        "performers" => missing_link(f, "performers_scenes", "scene_id"),
        "tags" => missing_link(f, "scenes_tags", "scene_id"),
        "stash_id" => missing_link(f, "scene_stash_ids", "scene_id"),
        "studio" => f.add_where("scenes.studio_id IS NULL", vec![]),
        "cover" => f.add_where("scenes.cover_blob IS NULL", vec![]),
        "phash" => f.add_where(
            "scenes.id NOT IN (SELECT sf.scene_id FROM scenes_files sf \
             INNER JOIN files_fingerprints fp ON fp.file_id = sf.file_id AND fp.type = 'phash')",
            vec![],
        ),
        column => missing_column(f, &format!("scenes.{}", column)),
    }
}

impl EntityFilter for SceneFilter {
    const KIND: EntityKind = EntityKind::Scenes;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("galleries_filter", self.galleries_filter.as_deref(), is_related)?;
        check_related("performers_filter", self.performers_filter.as_deref(), is_related)?;
        check_related("studios_filter", self.studios_filter.as_deref(), is_related)?;
        check_related("tags_filter", self.tags_filter.as_deref(), is_related)?;
        check_related("groups_filter", self.groups_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        const T: &str = "scenes";

        int_criterion(f, "id", "scenes.id", self.id.as_ref());
        string_criterion(f, "title", "scenes.title", self.title.as_ref());
        string_criterion(f, "code", "scenes.code", self.code.as_ref());
        string_criterion(f, "details", "scenes.details", self.details.as_ref());
        string_criterion(f, "director", "scenes.director", self.director.as_ref());
        StringList {
            field: "url",
            primary_table: T,
            join_table: "scene_urls",
            primary_fk: "scene_id",
            column: "url",
        }
        .apply(f, self.url.as_ref());
        path_criterion(f, self.path.as_ref());
        RelationCount {
            field: "file_count",
            primary_table: T,
            join_table: "scenes_files",
            primary_fk: "scene_id",
            counted: "file_id",
        }
        .apply(f, self.file_count.as_ref());
        fingerprint_criterion(f, "checksum", "md5", self.checksum.as_ref());
        fingerprint_criterion(f, "oshash", "oshash", self.oshash.as_ref());
        int_criterion(f, "rating100", "scenes.rating", self.rating100.as_ref());
        int_criterion(f, "o_counter", "scenes.o_counter", self.o_counter.as_ref());
        bool_criterion(f, "scenes.organized", self.organized);

        if self.duration.is_some() {
            join_video_files(f);
            float_int_criterion(f, "duration", "video_files.duration", self.duration.as_ref());
        }
        if let Some(c) = &self.resolution {
            join_video_files(f);
            push_where(
                f,
                resolution_clause("resolution", "video_files.width", "video_files.height", c),
            );
        }
        if let Some(c) = &self.orientation {
            join_video_files(f);
            f.add_where_clause(orientation_clause("video_files.width", "video_files.height", c));
        }
        if self.interactive.is_some() {
            join_video_files(f);
            bool_criterion(f, "video_files.interactive", self.interactive);
        }
        if self.interactive_speed.is_some() {
            join_video_files(f);
            int_criterion(
                f,
                "interactive_speed",
                "video_files.interactive_speed",
                self.interactive_speed.as_ref(),
            );
        }
        captions_criterion(f, self.captions.as_ref());

        has_markers_criterion(f, self.has_markers);
        is_missing_criterion(f, self.is_missing.as_deref());
        StashIds {
            primary_table: T,
            table: "scene_stash_ids",
            primary_fk: "scene_id",
        }
        .apply(f, self.stash_id_endpoint.as_ref());

        float_criterion(f, "resume_time", "scenes.resume_time", self.resume_time.as_ref());
        float_criterion(
            f,
            "play_duration",
            "scenes.play_duration",
            self.play_duration.as_ref(),
        );
        int_criterion(f, "play_count", "scenes.play_count", self.play_count.as_ref());

        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: T,
            join_table: "scenes_tags",
            primary_fk: "scene_id",
            foreign_fk: "tag_id",
        }
        .apply(f, self.tags.as_ref());
        RelationCount {
            field: "tag_count",
            primary_table: T,
            join_table: "scenes_tags",
            primary_fk: "scene_id",
            counted: "tag_id",
        }
        .apply(f, self.tag_count.as_ref());
        JoinedMulti {
            field: "performers",
            primary_table: T,
            join_table: "performers_scenes",
            primary_fk: "scene_id",
            foreign_fk: "performer_id",
        }
        .apply(f, self.performers.as_ref());
        RelationCount {
            field: "performer_count",
            primary_table: T,
            join_table: "performers_scenes",
            primary_fk: "scene_id",
            counted: "performer_id",
        }
        .apply(f, self.performer_count.as_ref());
        ForeignKeyHierarchy {
            field: "studios",
            hierarchy: STUDIOS,
            fk_column: "scenes.studio_id",
        }
        .apply(f, self.studios.as_ref());
        JoinedHierarchy {
            field: "groups",
            hierarchy: GROUPS,
            primary_table: T,
            join_table: "groups_scenes",
            primary_fk: "scene_id",
            foreign_fk: "group_id",
        }
        .apply(f, self.groups.as_ref());
        JoinedMulti {
            field: "galleries",
            primary_table: T,
            join_table: "scenes_galleries",
            primary_fk: "scene_id",
            foreign_fk: "gallery_id",
        }
        .apply(f, self.galleries.as_ref());

        PerformerTags {
            primary_table: T,
            join_table: "performers_scenes",
            primary_fk: "scene_id",
        }
        .apply(f, self.performer_tags.as_ref());
        let performers = PerformerLink {
            primary_table: T,
            join_table: "performers_scenes",
            primary_fk: "scene_id",
        };
        performers.favorite(f, self.performer_favorite);
        performers.age(f, self.performer_age.as_ref());
        duplicated_criterion(f, self.duplicated.as_ref());

        date_criterion(f, "date", "scenes.date", self.date.as_ref());
        timestamp_criterion(f, "created_at", "scenes.created_at", self.created_at.as_ref());
        timestamp_criterion(f, "updated_at", "scenes.updated_at", self.updated_at.as_ref());

        related_subquery(
            f,
            self.galleries_filter.as_deref(),
            RelatedLink::Through {
                join_table: "scenes_galleries",
                primary_fk: "scene_id",
                foreign_fk: "gallery_id",
            },
        );
        related_subquery(
            f,
            self.performers_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_scenes",
                primary_fk: "scene_id",
                foreign_fk: "performer_id",
            },
        );
        related_join(
            f,
            self.studios_filter.as_deref(),
            "studios.id = scenes.studio_id",
        );
        related_subquery(
            f,
            self.tags_filter.as_deref(),
            RelatedLink::Through {
                join_table: "scenes_tags",
                primary_fk: "scene_id",
                foreign_fk: "tag_id",
            },
        );
        related_subquery(
            f,
            self.groups_filter.as_deref(),
            RelatedLink::Through {
                join_table: "groups_scenes",
                primary_fk: "scene_id",
                foreign_fk: "group_id",
            },
        );
    }
}
