//! Criterion input types
//!
//! These mirror the JSON payloads accepted by the CLI and library callers.
//! Every criterion carries a `CriterionModifier`; which modifiers are legal
//! depends on the criterion kind and is enforced by the handlers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionModifier {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    IsNull,
    NotNull,
    IncludesAll,
    Includes,
    Excludes,
    MatchesRegex,
    NotMatchesRegex,
    Between,
    NotBetween,
}

impl CriterionModifier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
            Self::IsNull => "IS_NULL",
            Self::NotNull => "NOT_NULL",
            Self::IncludesAll => "INCLUDES_ALL",
            Self::Includes => "INCLUDES",
            Self::Excludes => "EXCLUDES",
            Self::MatchesRegex => "MATCHES_REGEX",
            Self::NotMatchesRegex => "NOT_MATCHES_REGEX",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT_BETWEEN",
        }
    }
}

impl fmt::Display for CriterionModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringCriterion {
    #[serde(default)]
    pub value: String,
    pub modifier: CriterionModifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntCriterion {
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub value2: Option<i64>,
    pub modifier: CriterionModifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatCriterion {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub value2: Option<f64>,
    pub modifier: CriterionModifier,
}

/// Calendar date criterion, `YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCriterion {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub value2: Option<String>,
    pub modifier: CriterionModifier,
}

/// Timestamp criterion; RFC 3339 or `YYYY-MM-DD[ HH:MM[:SS]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampCriterion {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub value2: Option<String>,
    pub modifier: CriterionModifier,
}

/// Set criterion over ids reachable through a join table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiCriterion {
    #[serde(default)]
    pub value: Vec<i64>,
    #[serde(default)]
    pub excludes: Vec<i64>,
    pub modifier: Option<CriterionModifier>,
}

impl MultiCriterion {
    pub fn modifier(&self) -> CriterionModifier {
        self.modifier.unwrap_or(CriterionModifier::Includes)
    }
}

/// Set criterion over a self-referencing hierarchy (tags, studios, groups)
///
/// `depth` is 0 for the listed ids only, N for N levels of descendants and
/// -1 for the whole subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HierarchicalMultiCriterion {
    #[serde(default)]
    pub value: Vec<i64>,
    #[serde(default)]
    pub excludes: Vec<i64>,
    #[serde(default)]
    pub depth: Option<i64>,
    pub modifier: Option<CriterionModifier>,
}

impl HierarchicalMultiCriterion {
    pub fn modifier(&self) -> CriterionModifier {
        self.modifier.unwrap_or(CriterionModifier::Includes)
    }

    pub fn depth(&self) -> i64 {
        self.depth.unwrap_or(0)
    }

    /// Fold an EXCLUDES modifier into the excludes list.
    ///
    /// The values move to `excludes` and the modifier becomes INCLUDES_ALL,
    /// which is a no-op once no include values remain.
    pub fn combine_excludes(&self) -> Self {
        let mut out = self.clone();
        if out.modifier() == CriterionModifier::Excludes {
            out.modifier = Some(CriterionModifier::IncludesAll);
            out.excludes.append(&mut out.value);
        }
        out
    }
}

/// Shared by the enum-valued criteria
pub trait EnumValue: Copy {
    fn as_str(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumCriterion<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    pub modifier: CriterionModifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    TransgenderMale,
    TransgenderFemale,
    Intersex,
    NonBinary,
}

impl EnumValue for Gender {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
            Self::TransgenderMale => "TRANSGENDER_MALE",
            Self::TransgenderFemale => "TRANSGENDER_FEMALE",
            Self::Intersex => "INTERSEX",
            Self::NonBinary => "NON_BINARY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Circumcised {
    Cut,
    Uncut,
}

impl EnumValue for Circumcised {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Cut => "CUT",
            Self::Uncut => "UNCUT",
        }
    }
}

/// Video/image size bucket over the shorter side, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    VeryLow,
    Low,
    #[serde(rename = "R360P")]
    R360p,
    Standard,
    WebHd,
    StandardHd,
    FullHd,
    QuadHd,
    VrHd,
    FourK,
    FiveK,
    SixK,
    SevenK,
    EightK,
    Huge,
}

impl Resolution {
    pub const ALL: [Resolution; 15] = [
        Self::VeryLow,
        Self::Low,
        Self::R360p,
        Self::Standard,
        Self::WebHd,
        Self::StandardHd,
        Self::FullHd,
        Self::QuadHd,
        Self::VrHd,
        Self::FourK,
        Self::FiveK,
        Self::SixK,
        Self::SevenK,
        Self::EightK,
        Self::Huge,
    ];

    pub const fn min(&self) -> i64 {
        match self {
            Self::VeryLow => 144,
            Self::Low => 240,
            Self::R360p => 360,
            Self::Standard => 480,
            Self::WebHd => 540,
            Self::StandardHd => 720,
            Self::FullHd => 1080,
            Self::QuadHd => 1440,
            Self::VrHd => 1920,
            Self::FourK => 2160,
            Self::FiveK => 2560,
            Self::SixK => 3000,
            Self::SevenK => 3584,
            Self::EightK => 3840,
            Self::Huge => 6144,
        }
    }

    /// Inclusive upper bound: one below the next bucket's minimum
    pub fn max(&self) -> i64 {
        let idx = Self::ALL.iter().position(|r| r == self).unwrap_or(0);
        match Self::ALL.get(idx + 1) {
            Some(next) => next.min() - 1,
            None => i64::from(i32::MAX),
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl EnumValue for Resolution {
    fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "VERY_LOW",
            Self::Low => "LOW",
            Self::R360p => "R360P",
            Self::Standard => "STANDARD",
            Self::WebHd => "WEB_HD",
            Self::StandardHd => "STANDARD_HD",
            Self::FullHd => "FULL_HD",
            Self::QuadHd => "QUAD_HD",
            Self::VrHd => "VR_HD",
            Self::FourK => "FOUR_K",
            Self::FiveK => "FIVE_K",
            Self::SixK => "SIX_K",
            Self::SevenK => "SEVEN_K",
            Self::EightK => "EIGHT_K",
            Self::Huge => "HUGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCriterion {
    pub value: Resolution,
    pub modifier: CriterionModifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl EnumValue for Orientation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "LANDSCAPE",
            Self::Portrait => "PORTRAIT",
            Self::Square => "SQUARE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrientationCriterion {
    #[serde(default)]
    pub value: Vec<Orientation>,
}

/// Match against the perceptual-hash duplicate groups
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhashDuplicationCriterion {
    #[serde(default)]
    pub duplicated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashIdCriterion {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub stash_id: Option<String>,
    pub modifier: CriterionModifier,
}
