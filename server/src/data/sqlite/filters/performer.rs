//! Performer filter
//!
//! Performers carry no studio of their own: the `studios` criterion looks
//! through the scenes, images and galleries they appear in, and the
//! `performers` criterion matches co-appearances in any of the three.

use serde::{Deserialize, Serialize};

use super::builder::{FilterBuilder, SqlArg};
use super::criterion::{
    RelationCount, StashIds, StringList, age_expr, bool_criterion, date_criterion, enum_clause,
    float_criterion, int_criterion, push_where, string_criterion, timestamp_criterion,
    year_criterion,
};
use super::hierarchy::{Direction, JoinedHierarchy, STUDIOS, TAGS, check_depth};
use super::types::{
    Circumcised, CriterionModifier, DateCriterion, EnumCriterion, FloatCriterion, Gender,
    HierarchicalMultiCriterion, IntCriterion, MultiCriterion, StashIdCriterion, StringCriterion,
    TimestampCriterion,
};
use super::{
    EntityFilter, EntityKind, GalleryFilter, ImageFilter, RelatedLink, SceneFilter, TagFilter,
    check_related, missing_column, missing_key, missing_link, related_subquery,
};
use crate::data::error::FilterError;
use crate::utils::sql::placeholders;

use CriterionModifier as M;

/// Media a performer appears in: (link table, media table, media fk)
const APPEARANCES: [(&str, &str, &str); 3] = [
    ("performers_scenes", "scenes", "scene_id"),
    ("performers_images", "images", "image_id"),
    ("performers_galleries", "galleries", "gallery_id"),
];

const MISSING_KEYS: &[&str] = &[
    "scenes",
    "image",
    "stash_id",
    "aliases",
    "url",
    "disambiguation",
    "details",
    "gender",
    "birthdate",
    "death_date",
    "ethnicity",
    "country",
    "eye_color",
    "hair_color",
    "height",
    "weight",
    "measurements",
    "fake_tits",
    "career_length",
    "tattoos",
    "piercings",
];

const O_COUNTER_EXPR: &str = "((SELECT COALESCE(SUM(s.o_counter), 0) FROM performers_scenes ps \
     INNER JOIN scenes s ON s.id = ps.scene_id WHERE ps.performer_id = performers.id) + \
     (SELECT COALESCE(SUM(i.o_counter), 0) FROM performers_images pi \
     INNER JOIN images i ON i.id = pi.image_id WHERE pi.performer_id = performers.id))";

const PLAY_COUNT_EXPR: &str = "(SELECT COALESCE(SUM(s.play_count), 0) FROM performers_scenes ps \
     INNER JOIN scenes s ON s.id = ps.scene_id WHERE ps.performer_id = performers.id)";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformerFilter {
    #[serde(alias = "AND")]
    pub and: Option<Box<PerformerFilter>>,
    #[serde(alias = "OR")]
    pub or: Option<Box<PerformerFilter>>,
    #[serde(alias = "NOT")]
    pub not: Option<Box<PerformerFilter>>,

    pub name: Option<StringCriterion>,
    pub disambiguation: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    #[serde(alias = "filter_favorites")]
    pub favorite: Option<bool>,
    pub ignore_auto_tag: Option<bool>,
    pub birth_year: Option<IntCriterion>,
    pub death_year: Option<IntCriterion>,
    /// Age today, or at death
    pub age: Option<IntCriterion>,
    pub gender: Option<EnumCriterion<Gender>>,
    pub ethnicity: Option<StringCriterion>,
    pub country: Option<StringCriterion>,
    pub eye_color: Option<StringCriterion>,
    pub height_cm: Option<IntCriterion>,
    pub measurements: Option<StringCriterion>,
    pub fake_tits: Option<StringCriterion>,
    pub penis_length: Option<FloatCriterion>,
    pub circumcised: Option<EnumCriterion<Circumcised>>,
    pub career_length: Option<StringCriterion>,
    pub tattoos: Option<StringCriterion>,
    pub piercings: Option<StringCriterion>,
    pub aliases: Option<StringCriterion>,
    pub hair_color: Option<StringCriterion>,
    pub weight: Option<IntCriterion>,
    pub rating100: Option<IntCriterion>,
    pub url: Option<StringCriterion>,
    pub stash_id_endpoint: Option<StashIdCriterion>,
    pub is_missing: Option<String>,
    pub tags: Option<HierarchicalMultiCriterion>,
    pub studios: Option<HierarchicalMultiCriterion>,
    /// Appears with
    pub performers: Option<MultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub image_count: Option<IntCriterion>,
    pub gallery_count: Option<IntCriterion>,
    pub play_count: Option<IntCriterion>,
    pub o_counter: Option<IntCriterion>,
    pub birthdate: Option<DateCriterion>,
    pub death_date: Option<DateCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,

    pub scenes_filter: Option<Box<SceneFilter>>,
    pub images_filter: Option<Box<ImageFilter>>,
    pub galleries_filter: Option<Box<GalleryFilter>>,
    pub tags_filter: Option<Box<TagFilter>>,
}

/// `SELECT performer_id` of every appearance in media matching `condition`
/// (written over the media alias `m`), once per media kind.
fn appearances_where(condition: &str) -> String {
    APPEARANCES
        .iter()
        .map(|(link, media, fk)| {
            format!(
                "SELECT l.performer_id FROM {link} l INNER JOIN {media} m ON m.id = l.{fk} WHERE {cond}",
                link = link,
                media = media,
                fk = fk,
                cond = condition
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ")
}

fn studios_criterion(f: &mut FilterBuilder, c: Option<&HierarchicalMultiCriterion>) {
    const FIELD: &str = "studios";
    let Some(c) = c else { return };
    let modifier = c.modifier();

    if matches!(modifier, M::IsNull | M::NotNull) {
        let op = if modifier == M::NotNull { "IN" } else { "NOT IN" };
        f.add_where(
            format!(
                "performers.id {} ({})",
                op,
                appearances_where("m.studio_id IS NOT NULL")
            ),
            vec![],
        );
        return;
    }

    if let Err(e) = check_depth(FIELD, modifier, c.depth()) {
        return f.set_error(e);
    }
    let c = c.combine_excludes();
    if !c.value.is_empty() && c.modifier() != M::Includes {
        return f.set_error(FilterError::unsupported_modifier(FIELD, modifier));
    }

    for (ids, op) in [(&c.value, "IN"), (&c.excludes, "NOT IN")] {
        if ids.is_empty() {
            continue;
        }
        let name = f.unique_alias("performer_studios");
        let cte = STUDIOS.expansion_cte(&name, ids, c.depth(), Direction::Descendants);
        f.add_recursive_with(cte.sql, cte.args);
        f.add_where(
            format!(
                "performers.id {} ({})",
                op,
                appearances_where(&format!("m.studio_id IN (SELECT item_id FROM {})", name))
            ),
            vec![],
        );
    }
}

/// Co-appearance pairs `(performer_id, partner)` over scenes, images and
/// galleries, restricted to partners in `partners` when given.
fn co_appearances(partners: Option<&[i64]>) -> (String, Vec<SqlArg>) {
    let mut args = Vec::new();
    let selects: Vec<String> = APPEARANCES
        .iter()
        .map(|(link, _, fk)| {
            let restrict = match partners {
                Some(ids) => {
                    args.extend(ids.iter().map(|id| SqlArg::Int(*id)));
                    format!(" WHERE a.performer_id IN ({})", placeholders(ids.len()))
                }
                None => String::new(),
            };
            format!(
                "SELECT b.performer_id, a.performer_id AS partner FROM {link} a \
                 INNER JOIN {link} b ON a.{fk} = b.{fk} AND b.performer_id != a.performer_id{restrict}",
                link = link,
                fk = fk,
                restrict = restrict
            )
        })
        .collect();
    (selects.join(" UNION "), args)
}

fn appears_with_criterion(f: &mut FilterBuilder, c: Option<&MultiCriterion>) {
    const FIELD: &str = "performers";
    let Some(c) = c else { return };
    let mut modifier = c.modifier();

    if matches!(modifier, M::IsNull | M::NotNull) {
        let (pairs, args) = co_appearances(None);
        let op = if modifier == M::NotNull { "IN" } else { "NOT IN" };
        f.add_where(
            format!("performers.id {} (SELECT co.performer_id FROM ({}) co)", op, pairs),
            args,
        );
        return;
    }

    let mut values = c.value.clone();
    let mut excludes = c.excludes.clone();
    if modifier == M::Excludes {
        modifier = M::Includes;
        excludes.append(&mut values);
    }

    if !values.is_empty() {
        let (pairs, mut args) = co_appearances(Some(&values));
        match modifier {
            M::Includes => f.add_where(
                format!("performers.id IN (SELECT co.performer_id FROM ({}) co)", pairs),
                args,
            ),
            M::IncludesAll => {
                args.push(SqlArg::Int(values.len() as i64));
                f.add_where(
                    format!(
                        "performers.id IN (SELECT co.performer_id FROM ({}) co \
                         GROUP BY co.performer_id HAVING COUNT(DISTINCT co.partner) = ?)",
                        pairs
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
        let (pairs, args) = co_appearances(Some(&excludes));
        f.add_where(
            format!("performers.id NOT IN (SELECT co.performer_id FROM ({}) co)", pairs),
            args,
        );
    }
}

fn is_missing_criterion(f: &mut FilterBuilder, value: Option<&str>) {
    let Some(key) = missing_key(f, value, MISSING_KEYS) else {
        return;
    };
    match key {
        "scenes" => missing_link(f, "performers_scenes", "performer_id"),
        "stash_id" => missing_link(f, "performer_stash_ids", "performer_id"),
        "aliases" => missing_link(f, "performer_aliases", "performer_id"),
        "image" => f.add_where("performers.image_blob IS NULL", vec![]),
        column => missing_column(f, &format!("performers.{}", column)),
    }
}

impl EntityFilter for PerformerFilter {
    const KIND: EntityKind = EntityKind::Performers;

    fn combinators(&self) -> [Option<&Self>; 3] {
        [self.and.as_deref(), self.or.as_deref(), self.not.as_deref()]
    }

    fn validate_node(&self, is_related: bool) -> Result<(), FilterError> {
        check_related("scenes_filter", self.scenes_filter.as_deref(), is_related)?;
        check_related("images_filter", self.images_filter.as_deref(), is_related)?;
        check_related("galleries_filter", self.galleries_filter.as_deref(), is_related)?;
        check_related("tags_filter", self.tags_filter.as_deref(), is_related)
    }

    fn handle_criteria(&self, f: &mut FilterBuilder) {
        const T: &str = "performers";

        string_criterion(f, "name", "performers.name", self.name.as_ref());
        string_criterion(
            f,
            "disambiguation",
            "performers.disambiguation",
            self.disambiguation.as_ref(),
        );
        string_criterion(f, "details", "performers.details", self.details.as_ref());
        bool_criterion(f, "performers.favorite", self.favorite);
        bool_criterion(f, "performers.ignore_auto_tag", self.ignore_auto_tag);
        year_criterion(f, "birth_year", "performers.birthdate", self.birth_year.as_ref());
        year_criterion(f, "death_year", "performers.death_date", self.death_year.as_ref());
        int_criterion(
            f,
            "age",
            &age_expr(
                "performers.birthdate",
                "IFNULL(performers.death_date, 'now')",
            ),
            self.age.as_ref(),
        );
        if let Some(c) = &self.gender {
            push_where(f, enum_clause("gender", "performers.gender", c));
        }
        string_criterion(f, "ethnicity", "performers.ethnicity", self.ethnicity.as_ref());
        string_criterion(f, "country", "performers.country", self.country.as_ref());
        string_criterion(f, "eye_color", "performers.eye_color", self.eye_color.as_ref());
        int_criterion(f, "height_cm", "performers.height", self.height_cm.as_ref());
        string_criterion(
            f,
            "measurements",
            "performers.measurements",
            self.measurements.as_ref(),
        );
        string_criterion(f, "fake_tits", "performers.fake_tits", self.fake_tits.as_ref());
        float_criterion(
            f,
            "penis_length",
            "performers.penis_length",
            self.penis_length.as_ref(),
        );
        if let Some(c) = &self.circumcised {
            push_where(f, enum_clause("circumcised", "performers.circumcised", c));
        }
        string_criterion(
            f,
            "career_length",
            "performers.career_length",
            self.career_length.as_ref(),
        );
        string_criterion(f, "tattoos", "performers.tattoos", self.tattoos.as_ref());
        string_criterion(f, "piercings", "performers.piercings", self.piercings.as_ref());
        StringList {
            field: "aliases",
            primary_table: T,
            join_table: "performer_aliases",
            primary_fk: "performer_id",
            column: "alias",
        }
        .apply(f, self.aliases.as_ref());
        string_criterion(f, "hair_color", "performers.hair_color", self.hair_color.as_ref());
        int_criterion(f, "weight", "performers.weight", self.weight.as_ref());
        int_criterion(f, "rating100", "performers.rating", self.rating100.as_ref());
        string_criterion(f, "url", "performers.url", self.url.as_ref());
        StashIds {
            primary_table: T,
            table: "performer_stash_ids",
            primary_fk: "performer_id",
        }
        .apply(f, self.stash_id_endpoint.as_ref());
        is_missing_criterion(f, self.is_missing.as_deref());

        JoinedHierarchy {
            field: "tags",
            hierarchy: TAGS,
            primary_table: T,
            join_table: "performers_tags",
            primary_fk: "performer_id",
            foreign_fk: "tag_id",
        }
        .apply(f, self.tags.as_ref());
        studios_criterion(f, self.studios.as_ref());
        appears_with_criterion(f, self.performers.as_ref());

        for (field, join_table, counted, c) in [
            ("tag_count", "performers_tags", "tag_id", &self.tag_count),
            ("scene_count", "performers_scenes", "scene_id", &self.scene_count),
            ("image_count", "performers_images", "image_id", &self.image_count),
            (
                "gallery_count",
                "performers_galleries",
                "gallery_id",
                &self.gallery_count,
            ),
        ] {
            RelationCount {
                field,
                primary_table: T,
                join_table,
                primary_fk: "performer_id",
                counted,
            }
            .apply(f, c.as_ref());
        }
        int_criterion(f, "play_count", PLAY_COUNT_EXPR, self.play_count.as_ref());
        int_criterion(f, "o_counter", O_COUNTER_EXPR, self.o_counter.as_ref());

        date_criterion(f, "birthdate", "performers.birthdate", self.birthdate.as_ref());
        date_criterion(f, "death_date", "performers.death_date", self.death_date.as_ref());
        timestamp_criterion(
            f,
            "created_at",
            "performers.created_at",
            self.created_at.as_ref(),
        );
        timestamp_criterion(
            f,
            "updated_at",
            "performers.updated_at",
            self.updated_at.as_ref(),
        );

        related_subquery(
            f,
            self.scenes_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_scenes",
                primary_fk: "performer_id",
                foreign_fk: "scene_id",
            },
        );
        related_subquery(
            f,
            self.images_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_images",
                primary_fk: "performer_id",
                foreign_fk: "image_id",
            },
        );
        related_subquery(
            f,
            self.galleries_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_galleries",
                primary_fk: "performer_id",
                foreign_fk: "gallery_id",
            },
        );
        related_subquery(
            f,
            self.tags_filter.as_deref(),
            RelatedLink::Through {
                join_table: "performers_tags",
                primary_fk: "performer_id",
                foreign_fk: "tag_id",
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::fixtures::{self, filter, ids};

    #[tokio::test]
    async fn test_gender_and_age() {
        let pool = fixtures::pool().await;
        let a = fixtures::performer(&pool, "A").await;
        let b = fixtures::performer(&pool, "B").await;
        fixtures::exec(
            &pool,
            &format!(
                "UPDATE performers SET gender = 'FEMALE', birthdate = '1980-06-15', death_date = '2000-06-14' WHERE id = {}",
                a
            ),
        )
        .await;
        fixtures::exec(
            &pool,
            &format!("UPDATE performers SET gender = 'MALE' WHERE id = {}", b),
        )
        .await;

        let f: PerformerFilter =
            filter(r#"{"gender": {"value": ["FEMALE"], "modifier": "INCLUDES"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![a]);

        let f: PerformerFilter = filter(r#"{"age": {"value": 19, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![a]);

        let f: PerformerFilter =
            filter(r#"{"birth_year": {"value": 1980, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![a]);
    }

    #[tokio::test]
    async fn test_studios_through_appearances() {
        let pool = fixtures::pool().await;
        let parent = fixtures::studio(&pool, "Parent", None).await;
        let child = fixtures::studio(&pool, "Child", Some(parent)).await;
        let p1 = fixtures::performer(&pool, "P1").await;
        let p2 = fixtures::performer(&pool, "P2").await;
        let p3 = fixtures::performer(&pool, "P3").await;
        let s1 = fixtures::scene_with_studio(&pool, "s1", Some(child)).await;
        let s2 = fixtures::scene(&pool, "s2").await;
        fixtures::performer_scene(&pool, p1, s1).await;
        fixtures::performer_scene(&pool, p2, s2).await;
        let _ = p3;

        let f: PerformerFilter = filter(&format!(
            r#"{{"studios": {{"value": [{}], "depth": -1, "modifier": "INCLUDES"}}}}"#,
            parent
        ));
        assert_eq!(ids(&pool, &f).await, vec![p1]);

        let f: PerformerFilter = filter(&format!(
            r#"{{"studios": {{"value": [{}], "depth": 0, "modifier": "INCLUDES"}}}}"#,
            parent
        ));
        assert!(ids(&pool, &f).await.is_empty());

        let f: PerformerFilter = filter(&format!(
            r#"{{"studios": {{"value": [{}], "depth": -1, "modifier": "EXCLUDES"}}}}"#,
            parent
        ));
        assert_eq!(ids(&pool, &f).await, vec![p2, p3]);

        let f: PerformerFilter = filter(r#"{"studios": {"modifier": "IS_NULL"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![p2, p3]);
    }

    #[tokio::test]
    async fn test_appears_with() {
        let pool = fixtures::pool().await;
        let a = fixtures::performer(&pool, "A").await;
        let b = fixtures::performer(&pool, "B").await;
        let c = fixtures::performer(&pool, "C").await;
        let d = fixtures::performer(&pool, "D").await;
        let s1 = fixtures::scene(&pool, "s1").await;
        let s2 = fixtures::scene(&pool, "s2").await;
        fixtures::performer_scene(&pool, a, s1).await;
        fixtures::performer_scene(&pool, b, s1).await;
        fixtures::performer_scene(&pool, b, s2).await;
        fixtures::performer_scene(&pool, c, s2).await;
        let _ = d;

        let f: PerformerFilter = filter(&format!(
            r#"{{"performers": {{"value": [{}], "modifier": "INCLUDES"}}}}"#,
            b
        ));
        assert_eq!(ids(&pool, &f).await, vec![a, c]);

        let f: PerformerFilter = filter(&format!(
            r#"{{"performers": {{"value": [{}, {}], "modifier": "INCLUDES_ALL"}}}}"#,
            a, c
        ));
        assert_eq!(ids(&pool, &f).await, vec![b]);

        let f: PerformerFilter = filter(r#"{"performers": {"modifier": "IS_NULL"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![d]);
    }

    #[tokio::test]
    async fn test_counts_and_aggregates() {
        let pool = fixtures::pool().await;
        let a = fixtures::performer(&pool, "A").await;
        let b = fixtures::performer(&pool, "B").await;
        let s1 = fixtures::scene(&pool, "s1").await;
        let s2 = fixtures::scene(&pool, "s2").await;
        fixtures::exec(
            &pool,
            &format!("UPDATE scenes SET o_counter = 2, play_count = 3 WHERE id IN ({}, {})", s1, s2),
        )
        .await;
        fixtures::performer_scene(&pool, a, s1).await;
        fixtures::performer_scene(&pool, a, s2).await;

        let f: PerformerFilter =
            filter(r#"{"scene_count": {"value": 2, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![a]);

        let f: PerformerFilter = filter(r#"{"o_counter": {"value": 4, "modifier": "EQUALS"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![a]);

        let f: PerformerFilter =
            filter(r#"{"play_count": {"value": 1, "modifier": "LESS_THAN"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![b]);
    }

    #[tokio::test]
    async fn test_aliases_and_missing() {
        let pool = fixtures::pool().await;
        let a = fixtures::performer(&pool, "A").await;
        let b = fixtures::performer(&pool, "B").await;
        fixtures::exec(
            &pool,
            &format!(
                "INSERT INTO performer_aliases (performer_id, alias) VALUES ({}, 'Stage Name')",
                a
            ),
        )
        .await;

        let f: PerformerFilter =
            filter(r#"{"aliases": {"value": "stage", "modifier": "INCLUDES"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![a]);

        let f: PerformerFilter =
            filter(r#"{"aliases": {"value": "stage", "modifier": "EXCLUDES"}}"#);
        assert_eq!(ids(&pool, &f).await, vec![b]);

        let f: PerformerFilter = filter(r#"{"is_missing": "aliases"}"#);
        assert_eq!(ids(&pool, &f).await, vec![b]);
    }

    #[tokio::test]
    async fn test_related_scenes_filter() {
        let pool = fixtures::pool().await;
        let t = fixtures::tag(&pool, "T").await;
        let a = fixtures::performer(&pool, "A").await;
        let b = fixtures::performer(&pool, "B").await;
        let s1 = fixtures::scene(&pool, "s1").await;
        let s2 = fixtures::scene(&pool, "s2").await;
        fixtures::tag_scene(&pool, s1, t).await;
        fixtures::performer_scene(&pool, a, s1).await;
        fixtures::performer_scene(&pool, b, s2).await;

        let f: PerformerFilter = filter(&format!(
            r#"{{"scenes_filter": {{"tags": {{"value": [{}], "depth": -1}}}}}}"#,
            t
        ));
        assert_eq!(ids(&pool, &f).await, vec![a]);
    }
}
