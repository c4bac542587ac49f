//! Criterion handlers
//!
//! Each handler renders one typed criterion into a paired clause. The
//! `*_clause` functions are pure and return the clause or the reason it
//! cannot be built; the handler structs attach joins and push the result
//! into a `FilterBuilder`, recording errors rather than returning them so
//! sibling criteria keep compiling.
//!
//! Modifier matches are written out in full (no wildcard arms) so that a new
//! modifier fails to compile until every handler decides what it means.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use super::builder::{FilterBuilder, SqlArg, SqlClause, and_clauses, or_clauses};
use super::types::{
    CriterionModifier, DateCriterion, EnumCriterion, EnumValue, FloatCriterion, IntCriterion,
    MultiCriterion, Orientation, OrientationCriterion, ResolutionCriterion, StashIdCriterion,
    StringCriterion, TimestampCriterion,
};
use crate::data::error::FilterError;
use crate::utils::sql::{placeholders, search_words};

use CriterionModifier as M;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Push a clause, or record why it could not be built
pub fn push_where(f: &mut FilterBuilder, clause: Result<SqlClause, FilterError>) {
    match clause {
        Ok(c) => f.add_where_clause(c),
        Err(e) => f.set_error(e),
    }
}

pub fn push_having(f: &mut FilterBuilder, clause: Result<SqlClause, FilterError>) {
    match clause {
        Ok(c) => f.add_having_clause(c),
        Err(e) => f.set_error(e),
    }
}

fn validate_regex(field: &str, pattern: &str) -> Result<(), FilterError> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| FilterError::InvalidRegex {
            field: field.to_string(),
            error: e.to_string(),
        })
}

fn int_args(values: &[i64]) -> Vec<SqlArg> {
    values.iter().map(|v| SqlArg::Int(*v)).collect()
}

// =============================================================================
// Strings
// =============================================================================

/// String criterion over one or more columns.
///
/// With several columns, positive forms match when any column matches and
/// negative forms require every column to miss.
pub fn string_clause(
    field: &str,
    columns: &[&str],
    c: &StringCriterion,
) -> Result<SqlClause, FilterError> {
    let per_column = |render: &dyn Fn(&str) -> SqlClause| -> Vec<SqlClause> {
        columns.iter().map(|col| render(col)).collect()
    };

    match c.modifier {
        M::Equals => Ok(or_clauses(per_column(&|col| {
            SqlClause::new(format!("{} LIKE ?", col), vec![c.value.clone().into()])
        }))),
        M::NotEquals => Ok(and_clauses(per_column(&|col| {
            SqlClause::new(format!("{} NOT LIKE ?", col), vec![c.value.clone().into()])
        }))),
        M::Includes => {
            let words = search_words(&c.value);
            Ok(and_clauses(
                words
                    .iter()
                    .map(|w| {
                        or_clauses(per_column(&|col| {
                            SqlClause::new(format!("{} LIKE ?", col), vec![format!("%{}%", w).into()])
                        }))
                    })
                    .collect(),
            ))
        }
        M::Excludes => {
            let words = search_words(&c.value);
            Ok(and_clauses(
                words
                    .iter()
                    .flat_map(|w| {
                        per_column(&|col| {
                            SqlClause::new(
                                format!("{} NOT LIKE ? OR {} IS NULL", col, col),
                                vec![format!("%{}%", w).into()],
                            )
                        })
                    })
                    .collect(),
            ))
        }
        M::MatchesRegex => {
            validate_regex(field, &c.value)?;
            Ok(or_clauses(per_column(&|col| {
                SqlClause::new(
                    format!("{} IS NOT NULL AND {} regexp ?", col, col),
                    vec![c.value.clone().into()],
                )
            })))
        }
        M::NotMatchesRegex => {
            validate_regex(field, &c.value)?;
            Ok(and_clauses(per_column(&|col| {
                SqlClause::new(
                    format!("{} IS NULL OR {} NOT regexp ?", col, col),
                    vec![c.value.clone().into()],
                )
            })))
        }
        M::IsNull => Ok(and_clauses(per_column(&|col| {
            SqlClause::plain(format!("{} IS NULL OR TRIM({}) = ''", col, col))
        }))),
        M::NotNull => Ok(or_clauses(per_column(&|col| {
            SqlClause::plain(format!("{} IS NOT NULL AND TRIM({}) != ''", col, col))
        }))),
        M::GreaterThan
        | M::LessThan
        | M::IncludesAll
        | M::Between
        | M::NotBetween => Err(FilterError::unsupported_modifier(field, c.modifier)),
    }
}

pub fn string_criterion(
    f: &mut FilterBuilder,
    field: &str,
    column: &str,
    c: Option<&StringCriterion>,
) {
    if let Some(c) = c {
        push_where(f, string_clause(field, &[column], c));
    }
}

/// `folder path + '/' + basename` matching for file-backed entities
pub fn path_clause(
    field: &str,
    path_column: &str,
    basename_column: &str,
    c: &StringCriterion,
) -> Result<SqlClause, FilterError> {
    let full = format!("{} || '/' || {}", path_column, basename_column);
    let like = |p: String| SqlClause::new(format!("{} LIKE ?", full), vec![p.into()]);

    match c.modifier {
        M::Equals => Ok(like(c.value.clone())),
        M::NotEquals => Ok(like(c.value.clone()).not()),
        M::Includes => Ok(or_clauses(
            search_words(&c.value)
                .into_iter()
                .map(|w| like(format!("%{}%", w)))
                .collect(),
        )),
        M::Excludes => Ok(and_clauses(
            search_words(&c.value)
                .into_iter()
                .map(|w| like(format!("%{}%", w)).not())
                .collect(),
        )),
        M::MatchesRegex => {
            validate_regex(field, &c.value)?;
            Ok(SqlClause::new(
                format!(
                    "{} IS NOT NULL AND {} IS NOT NULL AND {} regexp ?",
                    path_column, basename_column, full
                ),
                vec![c.value.clone().into()],
            ))
        }
        M::NotMatchesRegex => {
            validate_regex(field, &c.value)?;
            Ok(SqlClause::new(
                format!(
                    "{} IS NULL OR {} IS NULL OR {} NOT regexp ?",
                    path_column, basename_column, full
                ),
                vec![c.value.clone().into()],
            ))
        }
        M::IsNull => Ok(SqlClause::plain(format!(
            "{p} IS NULL OR TRIM({p}) = '' OR {b} IS NULL OR TRIM({b}) = ''",
            p = path_column,
            b = basename_column
        ))),
        M::NotNull => Ok(SqlClause::plain(format!(
            "{p} IS NOT NULL AND TRIM({p}) != '' AND {b} IS NOT NULL AND TRIM({b}) != ''",
            p = path_column,
            b = basename_column
        ))),
        M::GreaterThan
        | M::LessThan
        | M::IncludesAll
        | M::Between
        | M::NotBetween => Err(FilterError::unsupported_modifier(field, c.modifier)),
    }
}

// =============================================================================
// Numbers
// =============================================================================

/// Comparison over a column expression.
///
/// `expr` may be a plain column, a computed value or an aggregate, which is
/// how counts and ages share the same modifier handling.
pub fn numeric_clause(
    field: &str,
    expr: &str,
    value: SqlArg,
    value2: Option<SqlArg>,
    modifier: CriterionModifier,
) -> Result<SqlClause, FilterError> {
    let between = |op: &str, value2: Option<SqlArg>| match value2 {
        Some(v2) => Ok(SqlClause::new(
            format!("{} {} ? AND ?", expr, op),
            vec![value.clone(), v2],
        )),
        None => Err(FilterError::invalid_value(
            field,
            format!("{} requires value2", modifier),
        )),
    };

    match modifier {
        M::Equals => Ok(SqlClause::new(format!("{} = ?", expr), vec![value])),
        M::NotEquals => Ok(SqlClause::new(format!("{} != ?", expr), vec![value])),
        M::GreaterThan => Ok(SqlClause::new(format!("{} > ?", expr), vec![value])),
        M::LessThan => Ok(SqlClause::new(format!("{} < ?", expr), vec![value])),
        M::Between => between("BETWEEN", value2),
        M::NotBetween => between("NOT BETWEEN", value2),
        M::IsNull => Ok(SqlClause::plain(format!("{} IS NULL", expr))),
        M::NotNull => Ok(SqlClause::plain(format!("{} IS NOT NULL", expr))),
        M::Includes
        | M::Excludes
        | M::IncludesAll
        | M::MatchesRegex
        | M::NotMatchesRegex => Err(FilterError::unsupported_modifier(field, modifier)),
    }
}

pub fn int_clause(field: &str, expr: &str, c: &IntCriterion) -> Result<SqlClause, FilterError> {
    numeric_clause(
        field,
        expr,
        SqlArg::Int(c.value),
        c.value2.map(SqlArg::Int),
        c.modifier,
    )
}

pub fn float_clause(
    field: &str,
    expr: &str,
    c: &FloatCriterion,
) -> Result<SqlClause, FilterError> {
    numeric_clause(
        field,
        expr,
        SqlArg::Float(c.value),
        c.value2.map(SqlArg::Float),
        c.modifier,
    )
}

pub fn int_criterion(f: &mut FilterBuilder, field: &str, expr: &str, c: Option<&IntCriterion>) {
    if let Some(c) = c {
        push_where(f, int_clause(field, expr, c));
    }
}

pub fn float_criterion(
    f: &mut FilterBuilder,
    field: &str,
    expr: &str,
    c: Option<&FloatCriterion>,
) {
    if let Some(c) = c {
        push_where(f, float_clause(field, expr, c));
    }
}

/// Whole seconds of a fractional column, e.g. durations
pub fn float_int_criterion(
    f: &mut FilterBuilder,
    field: &str,
    column: &str,
    c: Option<&IntCriterion>,
) {
    int_criterion(f, field, &format!("cast({} as int)", column), c);
}

/// Calendar year of a date column
pub fn year_criterion(f: &mut FilterBuilder, field: &str, column: &str, c: Option<&IntCriterion>) {
    int_criterion(
        f,
        field,
        &format!("cast(strftime('%Y', {}) as int)", column),
        c,
    );
}

/// Whole years between `from` and `to` (both date columns or expressions)
pub fn age_expr(from: &str, to: &str) -> String {
    format!(
        "cast(strftime('%Y.%m%d', {}) - strftime('%Y.%m%d', {}) as int)",
        to, from
    )
}

pub fn bool_clause(column: &str, value: bool) -> SqlClause {
    SqlClause::plain(format!("{} = {}", column, if value { 1 } else { 0 }))
}

pub fn bool_criterion(f: &mut FilterBuilder, column: &str, value: Option<bool>) {
    if let Some(v) = value {
        f.add_where_clause(bool_clause(column, v));
    }
}

// =============================================================================
// Dates and timestamps
// =============================================================================

fn parse_date(field: &str, value: &str) -> Result<String, FilterError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| FilterError::invalid_value(field, format!("'{}' is not a YYYY-MM-DD date", value)))
}

pub fn date_clause(field: &str, column: &str, c: &DateCriterion) -> Result<SqlClause, FilterError> {
    let needs_value = !matches!(c.modifier, M::IsNull | M::NotNull);
    let value = if needs_value {
        SqlArg::Text(parse_date(field, &c.value)?)
    } else {
        SqlArg::Text(String::new())
    };
    let value2 = match (&c.value2, c.modifier) {
        (Some(v), M::Between | M::NotBetween) => Some(SqlArg::Text(parse_date(field, v)?)),
        _ => None,
    };
    numeric_clause(field, column, value, value2, c.modifier)
}

pub fn date_criterion(f: &mut FilterBuilder, field: &str, column: &str, c: Option<&DateCriterion>) {
    if let Some(c) = c {
        push_where(f, date_clause(field, column, c));
    }
}

/// A parsed timestamp value and whether it carried a time of day
fn parse_timestamp(field: &str, value: &str) -> Result<(NaiveDateTime, bool), FilterError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok((dt.with_timezone(&Utc).naive_utc(), true));
    }
    for fmt in [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok((dt, true));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok((d.and_time(chrono::NaiveTime::MIN), false));
    }
    Err(FilterError::invalid_value(
        field,
        format!("'{}' is not a timestamp", value),
    ))
}

fn ts_arg(dt: NaiveDateTime) -> SqlArg {
    SqlArg::Text(dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Timestamp comparison. A date-only EQUALS/NOT_EQUALS covers the whole day.
pub fn timestamp_clause(
    field: &str,
    column: &str,
    c: &TimestampCriterion,
) -> Result<SqlClause, FilterError> {
    if matches!(c.modifier, M::IsNull | M::NotNull) {
        return numeric_clause(field, column, SqlArg::Int(0), None, c.modifier);
    }

    let (start, has_time) = parse_timestamp(field, &c.value)?;
    if !has_time {
        let next = start + Duration::days(1);
        match c.modifier {
            M::Equals => {
                return Ok(SqlClause::new(
                    format!("{} >= ? AND {} < ?", column, column),
                    vec![ts_arg(start), ts_arg(next)],
                ));
            }
            M::NotEquals => {
                return Ok(SqlClause::new(
                    format!("{} < ? OR {} >= ?", column, column),
                    vec![ts_arg(start), ts_arg(next)],
                ));
            }
            _ => {}
        }
    }

    let value2 = match (&c.value2, c.modifier) {
        (Some(v), M::Between | M::NotBetween) => {
            let (end, end_has_time) = parse_timestamp(field, v)?;
            let end = if end_has_time {
                end
            } else {
                end + Duration::days(1) - Duration::seconds(1)
            };
            Some(ts_arg(end))
        }
        _ => None,
    };
    numeric_clause(field, column, ts_arg(start), value2, c.modifier)
}

pub fn timestamp_criterion(
    f: &mut FilterBuilder,
    field: &str,
    column: &str,
    c: Option<&TimestampCriterion>,
) {
    if let Some(c) = c {
        push_where(f, timestamp_clause(field, column, c));
    }
}

// =============================================================================
// Enums, resolution, orientation
// =============================================================================

pub fn enum_clause<T: EnumValue>(
    field: &str,
    column: &str,
    c: &EnumCriterion<T>,
) -> Result<SqlClause, FilterError> {
    let args: Vec<SqlArg> = c.value.iter().map(|v| v.as_str().into()).collect();
    match c.modifier {
        M::Includes | M::Equals => {
            if args.is_empty() {
                return Ok(SqlClause::default());
            }
            Ok(SqlClause::new(
                format!("{} IN ({})", column, placeholders(args.len())),
                args,
            ))
        }
        M::Excludes | M::NotEquals => {
            if args.is_empty() {
                return Ok(SqlClause::default());
            }
            Ok(SqlClause::new(
                format!("{} NOT IN ({})", column, placeholders(args.len())),
                args,
            ))
        }
        M::IsNull => Ok(SqlClause::plain(format!(
            "{} IS NULL OR TRIM({}) = ''",
            column, column
        ))),
        M::NotNull => Ok(SqlClause::plain(format!(
            "{} IS NOT NULL AND TRIM({}) != ''",
            column, column
        ))),
        M::GreaterThan
        | M::LessThan
        | M::IncludesAll
        | M::MatchesRegex
        | M::NotMatchesRegex
        | M::Between
        | M::NotBetween => Err(FilterError::unsupported_modifier(field, c.modifier)),
    }
}

/// Bucketed match on the shorter side of the frame
pub fn resolution_clause(
    field: &str,
    width_column: &str,
    height_column: &str,
    c: &ResolutionCriterion,
) -> Result<SqlClause, FilterError> {
    let side = format!("MIN({}, {})", width_column, height_column);
    let (min, max) = (c.value.min(), c.value.max());
    match c.modifier {
        M::Equals => Ok(SqlClause::plain(format!("{} BETWEEN {} AND {}", side, min, max))),
        M::NotEquals => Ok(SqlClause::plain(format!(
            "{} NOT BETWEEN {} AND {}",
            side, min, max
        ))),
        M::LessThan => Ok(SqlClause::plain(format!("{} < {}", side, min))),
        M::GreaterThan => Ok(SqlClause::plain(format!("{} > {}", side, max))),
        M::IsNull
        | M::NotNull
        | M::Includes
        | M::Excludes
        | M::IncludesAll
        | M::MatchesRegex
        | M::NotMatchesRegex
        | M::Between
        | M::NotBetween => Err(FilterError::unsupported_modifier(field, c.modifier)),
    }
}

pub fn orientation_clause(
    width_column: &str,
    height_column: &str,
    c: &OrientationCriterion,
) -> SqlClause {
    or_clauses(
        c.value
            .iter()
            .map(|o| {
                let op = match o {
                    Orientation::Portrait => "<",
                    Orientation::Landscape => ">",
                    Orientation::Square => "=",
                };
                SqlClause::plain(format!("{} {} {}", width_column, op, height_column))
            })
            .collect(),
    )
}

// =============================================================================
// Join-table criteria
// =============================================================================

/// A many-to-many link from the primary table through a join table
#[derive(Debug, Clone, Copy)]
pub struct JoinedMulti<'a> {
    pub field: &'a str,
    pub primary_table: &'a str,
    pub join_table: &'a str,
    /// Column on the join table pointing at the primary row
    pub primary_fk: &'a str,
    /// Column on the join table pointing at the related row
    pub foreign_fk: &'a str,
}

impl JoinedMulti<'_> {
    fn join(&self, f: &mut FilterBuilder) -> String {
        let alias = f.unique_alias(self.join_table);
        f.add_left_join(
            self.join_table,
            &alias,
            &format!("{}.{} = {}.id", alias, self.primary_fk, self.primary_table),
        );
        alias
    }

    /// `primary.id NOT IN (rows linked to any of ids)`
    pub fn anti_join(&self, ids: &[i64]) -> SqlClause {
        SqlClause::new(
            format!(
                "{p}.id NOT IN (SELECT {j}.{pfk} FROM {j} WHERE {j}.{ffk} IN ({ph}))",
                p = self.primary_table,
                j = self.join_table,
                pfk = self.primary_fk,
                ffk = self.foreign_fk,
                ph = placeholders(ids.len())
            ),
            int_args(ids),
        )
    }

    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&MultiCriterion>) {
        let Some(c) = c else { return };
        let mut modifier = c.modifier();

        if matches!(modifier, M::IsNull | M::NotNull) {
            let alias = self.join(f);
            let not = if modifier == M::NotNull { "NOT " } else { "" };
            f.add_where(format!("{}.{} IS {}NULL", alias, self.foreign_fk, not), vec![]);
            return;
        }

        if c.value.is_empty() && c.excludes.is_empty() {
            return;
        }

        let mut values = c.value.clone();
        let mut excludes = c.excludes.clone();
        if modifier == M::Excludes {
            modifier = M::IncludesAll;
            excludes.append(&mut values);
        }

        if !values.is_empty() {
            let n = values.len() as i64;
            match modifier {
                M::Includes => {
                    let alias = self.join(f);
                    f.add_where(
                        format!("{}.{} IN ({})", alias, self.foreign_fk, placeholders(values.len())),
                        int_args(&values),
                    );
                }
                M::IncludesAll => {
                    let alias = self.join(f);
                    f.add_where(
                        format!("{}.{} IN ({})", alias, self.foreign_fk, placeholders(values.len())),
                        int_args(&values),
                    );
                    f.add_having(
                        format!("count(distinct {}.{}) = ?", alias, self.foreign_fk),
                        vec![SqlArg::Int(n)],
                    );
                }
                M::Equals => {
                    let alias = self.join(f);
                    let mut args = int_args(&values);
                    args.push(SqlArg::Int(n));
                    f.add_where(
                        format!(
                            "{a}.{ffk} IN ({ph}) AND (SELECT COUNT(*) FROM {j} s WHERE s.{pfk} = {p}.id) = ?",
                            a = alias,
                            ffk = self.foreign_fk,
                            ph = placeholders(values.len()),
                            j = self.join_table,
                            pfk = self.primary_fk,
                            p = self.primary_table
                        ),
                        args,
                    );
                    f.add_having(
                        format!("count(distinct {}.{}) = ?", alias, self.foreign_fk),
                        vec![SqlArg::Int(n)],
                    );
                }
                M::NotEquals
                | M::GreaterThan
                | M::LessThan
                | M::IsNull
                | M::NotNull
                | M::Excludes
                | M::MatchesRegex
                | M::NotMatchesRegex
                | M::Between
                | M::NotBetween => {
                    f.set_error(FilterError::unsupported_modifier(self.field, modifier));
                    return;
                }
            }
        }

        if !excludes.is_empty() {
            f.add_where_clause(self.anti_join(&excludes));
        }
    }
}

/// Number of distinct related rows, counted in HAVING over a left join so
/// rows without any relation count as zero.
#[derive(Debug, Clone, Copy)]
pub struct RelationCount<'a> {
    pub field: &'a str,
    pub primary_table: &'a str,
    pub join_table: &'a str,
    pub primary_fk: &'a str,
    pub counted: &'a str,
}

impl RelationCount<'_> {
    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&IntCriterion>) {
        let Some(c) = c else { return };
        let alias = f.unique_alias(&format!("{}_count", self.join_table));
        f.add_left_join(
            self.join_table,
            &alias,
            &format!("{}.{} = {}.id", alias, self.primary_fk, self.primary_table),
        );
        push_having(
            f,
            int_clause(
                self.field,
                &format!("COUNT(DISTINCT {}.{})", alias, self.counted),
                c,
            ),
        );
    }
}

/// String criterion over a one-row-per-value table (aliases, urls)
#[derive(Debug, Clone, Copy)]
pub struct StringList<'a> {
    pub field: &'a str,
    pub primary_table: &'a str,
    pub join_table: &'a str,
    pub primary_fk: &'a str,
    pub column: &'a str,
}

impl StringList<'_> {
    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&StringCriterion>) {
        let Some(c) = c else { return };

        if c.modifier == M::Excludes {
            f.add_where(
                format!(
                    "{p}.id NOT IN (SELECT {j}.{pfk} FROM {j} WHERE {j}.{col} LIKE ?)",
                    p = self.primary_table,
                    j = self.join_table,
                    pfk = self.primary_fk,
                    col = self.column
                ),
                vec![format!("%{}%", c.value).into()],
            );
            return;
        }

        let alias = f.unique_alias(self.join_table);
        f.add_left_join(
            self.join_table,
            &alias,
            &format!("{}.{} = {}.id", alias, self.primary_fk, self.primary_table),
        );
        push_where(
            f,
            string_clause(self.field, &[&format!("{}.{}", alias, self.column)], c),
        );
    }
}

/// Stash-box identifier match, optionally scoped to one endpoint.
///
/// Negative modifiers are the complement of their positive form: a row
/// matches when none of its identifiers match.
#[derive(Debug, Clone, Copy)]
pub struct StashIds<'a> {
    pub primary_table: &'a str,
    pub table: &'a str,
    pub primary_fk: &'a str,
}

impl StashIds<'_> {
    pub fn apply(&self, f: &mut FilterBuilder, c: Option<&StashIdCriterion>) {
        let Some(c) = c else { return };

        let (positive, negate) = match c.modifier {
            M::NotEquals => (M::Equals, true),
            M::Excludes => (M::Includes, true),
            M::NotMatchesRegex => (M::MatchesRegex, true),
            M::IsNull => (M::NotNull, true),
            m @ (M::Equals
            | M::Includes
            | M::MatchesRegex
            | M::NotNull
            | M::GreaterThan
            | M::LessThan
            | M::IncludesAll
            | M::Between
            | M::NotBetween) => (m, false),
        };
        let criterion = StringCriterion {
            value: c.stash_id.clone().unwrap_or_default(),
            modifier: positive,
        };
        let stash = match string_clause("stash_id", &["s.stash_id"], &criterion) {
            Ok(clause) => clause,
            Err(_) => {
                return f.set_error(FilterError::unsupported_modifier("stash_id", c.modifier));
            }
        };

        let mut conditions = Vec::new();
        if let Some(endpoint) = c.endpoint.as_deref().filter(|e| !e.is_empty()) {
            conditions.push(SqlClause::new("s.endpoint = ?", vec![endpoint.into()]));
        }
        conditions.push(stash);
        let condition = and_clauses(conditions);

        f.add_where(
            format!(
                "{p}.id {op} (SELECT s.{pfk} FROM {t} s WHERE {cond})",
                p = self.primary_table,
                op = if negate { "NOT IN" } else { "IN" },
                pfk = self.primary_fk,
                t = self.table,
                cond = condition.sql
            ),
            condition.args,
        );
    }
}

/// Criteria on the performers linked to a scene, image or gallery
#[derive(Debug, Clone, Copy)]
pub struct PerformerLink<'a> {
    pub primary_table: &'a str,
    /// e.g. `performers_scenes`
    pub join_table: &'a str,
    /// e.g. `scene_id`
    pub primary_fk: &'a str,
}

impl PerformerLink<'_> {
    fn linked_where(&self, condition: &str) -> String {
        format!(
            "SELECT pl.{pfk} FROM {j} pl INNER JOIN performers pf ON pf.id = pl.performer_id WHERE {cond}",
            pfk = self.primary_fk,
            j = self.join_table,
            cond = condition
        )
    }

    /// true: any linked performer is a favorite; false: none is
    pub fn favorite(&self, f: &mut FilterBuilder, value: Option<bool>) {
        let Some(v) = value else { return };
        let op = if v { "IN" } else { "NOT IN" };
        f.add_where(
            format!(
                "{}.id {} ({})",
                self.primary_table,
                op,
                self.linked_where("pf.favorite = 1")
            ),
            vec![],
        );
    }

    /// Age of any linked performer on the primary row's date
    pub fn age(&self, f: &mut FilterBuilder, c: Option<&IntCriterion>) {
        let Some(c) = c else { return };
        let expr = age_expr("pf.birthdate", "pd.date");
        let compare = match int_clause("performer_age", &expr, c) {
            Ok(clause) => clause,
            Err(e) => return f.set_error(e),
        };
        let sql = format!(
            "{p}.id IN (SELECT pl.{pfk} FROM {j} pl \
             INNER JOIN performers pf ON pf.id = pl.performer_id \
             INNER JOIN {p} pd ON pd.id = pl.{pfk} \
             WHERE pd.date IS NOT NULL AND pd.date != '' \
             AND pf.birthdate IS NOT NULL AND pf.birthdate != '' AND {cmp})",
            p = self.primary_table,
            pfk = self.primary_fk,
            j = self.join_table,
            cmp = compare.sql
        );
        f.add_where(sql, compare.args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str, modifier: CriterionModifier) -> StringCriterion {
        StringCriterion {
            value: value.to_string(),
            modifier,
        }
    }

    #[test]
    fn test_string_equals_and_not_equals() {
        let c = string_clause("title", &["scenes.title"], &s("Beach%", M::Equals)).unwrap();
        assert_eq!(c.sql, "(scenes.title LIKE ?)");
        assert_eq!(c.args, vec![SqlArg::Text("Beach%".into())]);

        let c = string_clause("title", &["scenes.title"], &s("x", M::NotEquals)).unwrap();
        assert_eq!(c.sql, "(scenes.title NOT LIKE ?)");
    }

    #[test]
    fn test_string_includes_words_across_columns() {
        let c = string_clause(
            "name",
            &["tags.name", "tag_aliases.alias"],
            &s(r#"red "big car""#, M::Includes),
        )
        .unwrap();
        assert_eq!(
            c.sql,
            "((((tags.name LIKE ?) OR (tag_aliases.alias LIKE ?))) AND (((tags.name LIKE ?) OR (tag_aliases.alias LIKE ?))))"
        );
        assert_eq!(
            c.args,
            vec![
                SqlArg::Text("%red%".into()),
                SqlArg::Text("%red%".into()),
                SqlArg::Text("%big car%".into()),
                SqlArg::Text("%big car%".into()),
            ]
        );
    }

    #[test]
    fn test_string_includes_empty_is_noop() {
        let c = string_clause("title", &["scenes.title"], &s("   ", M::Includes)).unwrap();
        assert!(c.is_empty());
        let c = string_clause("title", &["scenes.title"], &s("", M::Excludes)).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn test_string_excludes_allows_null() {
        let c = string_clause("title", &["scenes.title"], &s("red", M::Excludes)).unwrap();
        assert_eq!(c.sql, "(scenes.title NOT LIKE ? OR scenes.title IS NULL)");
    }

    #[test]
    fn test_string_regex_validated() {
        let err = string_clause("title", &["scenes.title"], &s("(unclosed", M::MatchesRegex))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidRegex { ref field, .. } if field == "title"));

        let c = string_clause("title", &["scenes.title"], &s("^a.*", M::NotMatchesRegex)).unwrap();
        assert_eq!(c.sql, "(scenes.title IS NULL OR scenes.title NOT regexp ?)");
    }

    #[test]
    fn test_string_null_checks_trim() {
        let c = string_clause("details", &["scenes.details"], &s("", M::IsNull)).unwrap();
        assert_eq!(c.sql, "(scenes.details IS NULL OR TRIM(scenes.details) = '')");
        let c = string_clause("details", &["scenes.details"], &s("", M::NotNull)).unwrap();
        assert_eq!(
            c.sql,
            "(scenes.details IS NOT NULL AND TRIM(scenes.details) != '')"
        );
    }

    #[test]
    fn test_string_unsupported_modifier() {
        let err = string_clause("title", &["scenes.title"], &s("x", M::GreaterThan)).unwrap_err();
        assert_eq!(err, FilterError::unsupported_modifier("title", "GREATER_THAN"));
    }

    #[test]
    fn test_numeric_modifiers() {
        let c = numeric_clause("rating", "scenes.rating", SqlArg::Int(3), None, M::GreaterThan)
            .unwrap();
        assert_eq!(c.sql, "scenes.rating > ?");

        let c = numeric_clause(
            "rating",
            "scenes.rating",
            SqlArg::Int(20),
            Some(SqlArg::Int(60)),
            M::NotBetween,
        )
        .unwrap();
        assert_eq!(c.sql, "scenes.rating NOT BETWEEN ? AND ?");
        assert_eq!(c.args, vec![SqlArg::Int(20), SqlArg::Int(60)]);

        let err =
            numeric_clause("rating", "scenes.rating", SqlArg::Int(20), None, M::Between).unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));

        let c = numeric_clause("rating", "scenes.rating", SqlArg::Int(0), None, M::IsNull).unwrap();
        assert_eq!(c.sql, "scenes.rating IS NULL");
        assert!(c.args.is_empty());

        assert!(
            numeric_clause("rating", "scenes.rating", SqlArg::Int(0), None, M::Includes).is_err()
        );
    }

    #[test]
    fn test_year_and_float_int_exprs() {
        let mut f = FilterBuilder::new("performers");
        year_criterion(
            &mut f,
            "birth_year",
            "performers.birthdate",
            Some(&IntCriterion {
                value: 1990,
                value2: None,
                modifier: M::Equals,
            }),
        );
        let compiled = f.finish().unwrap();
        assert_eq!(
            compiled.where_clause.sql,
            "(cast(strftime('%Y', performers.birthdate) as int) = ?)"
        );
    }

    #[test]
    fn test_bool_is_literal() {
        assert_eq!(bool_clause("scenes.organized", true).sql, "scenes.organized = 1");
        assert_eq!(bool_clause("scenes.organized", false).sql, "scenes.organized = 0");
        assert!(bool_clause("scenes.organized", true).args.is_empty());
    }

    #[test]
    fn test_date_validation() {
        let c = DateCriterion {
            value: "2020-13-01".into(),
            value2: None,
            modifier: M::Equals,
        };
        assert!(matches!(
            date_clause("date", "scenes.date", &c),
            Err(FilterError::InvalidValue { .. })
        ));

        let c = DateCriterion {
            value: "2020-01-01".into(),
            value2: Some("2020-12-31".into()),
            modifier: M::Between,
        };
        let clause = date_clause("date", "scenes.date", &c).unwrap();
        assert_eq!(clause.sql, "scenes.date BETWEEN ? AND ?");

        let c = DateCriterion {
            value: String::new(),
            value2: None,
            modifier: M::IsNull,
        };
        assert_eq!(
            date_clause("date", "scenes.date", &c).unwrap().sql,
            "scenes.date IS NULL"
        );
    }

    #[test]
    fn test_timestamp_date_only_equals_is_day_range() {
        let c = TimestampCriterion {
            value: "2024-02-28".into(),
            value2: None,
            modifier: M::Equals,
        };
        let clause = timestamp_clause("created_at", "scenes.created_at", &c).unwrap();
        assert_eq!(
            clause.sql,
            "scenes.created_at >= ? AND scenes.created_at < ?"
        );
        assert_eq!(
            clause.args,
            vec![
                SqlArg::Text("2024-02-28 00:00:00".into()),
                SqlArg::Text("2024-02-29 00:00:00".into())
            ]
        );
    }

    #[test]
    fn test_timestamp_rfc3339_normalized_to_utc() {
        let c = TimestampCriterion {
            value: "2024-01-01T12:00:00+02:00".into(),
            value2: None,
            modifier: M::GreaterThan,
        };
        let clause = timestamp_clause("updated_at", "scenes.updated_at", &c).unwrap();
        assert_eq!(clause.sql, "scenes.updated_at > ?");
        assert_eq!(clause.args, vec![SqlArg::Text("2024-01-01 10:00:00".into())]);
    }

    #[test]
    fn test_timestamp_between_date_only_upper_bound_inclusive() {
        let c = TimestampCriterion {
            value: "2024-01-01".into(),
            value2: Some("2024-01-31".into()),
            modifier: M::Between,
        };
        let clause = timestamp_clause("created_at", "scenes.created_at", &c).unwrap();
        assert_eq!(
            clause.args,
            vec![
                SqlArg::Text("2024-01-01 00:00:00".into()),
                SqlArg::Text("2024-01-31 23:59:59".into())
            ]
        );
    }

    #[test]
    fn test_enum_clause() {
        use super::super::types::Gender;
        let c = EnumCriterion {
            value: vec![Gender::Female, Gender::Male],
            modifier: M::Excludes,
        };
        let clause = enum_clause("gender", "performers.gender", &c).unwrap();
        assert_eq!(clause.sql, "performers.gender NOT IN (?, ?)");
        assert_eq!(
            clause.args,
            vec![SqlArg::Text("FEMALE".into()), SqlArg::Text("MALE".into())]
        );

        let empty: EnumCriterion<Gender> = EnumCriterion {
            value: vec![],
            modifier: M::Includes,
        };
        assert!(enum_clause("gender", "performers.gender", &empty).unwrap().is_empty());

        let bad: EnumCriterion<Gender> = EnumCriterion {
            value: vec![],
            modifier: M::IncludesAll,
        };
        assert!(enum_clause("gender", "performers.gender", &bad).is_err());
    }

    #[test]
    fn test_resolution_clause() {
        use super::super::types::Resolution;
        let c = ResolutionCriterion {
            value: Resolution::FullHd,
            modifier: M::Equals,
        };
        assert_eq!(
            resolution_clause("resolution", "vf.width", "vf.height", &c).unwrap().sql,
            "MIN(vf.width, vf.height) BETWEEN 1080 AND 1439"
        );
        let c = ResolutionCriterion {
            value: Resolution::FullHd,
            modifier: M::GreaterThan,
        };
        assert_eq!(
            resolution_clause("resolution", "vf.width", "vf.height", &c).unwrap().sql,
            "MIN(vf.width, vf.height) > 1439"
        );
        let c = ResolutionCriterion {
            value: Resolution::FullHd,
            modifier: M::Includes,
        };
        assert!(resolution_clause("resolution", "vf.width", "vf.height", &c).is_err());
    }

    #[test]
    fn test_orientation_clause() {
        let c = OrientationCriterion {
            value: vec![Orientation::Portrait, Orientation::Square],
        };
        assert_eq!(
            orientation_clause("w", "h", &c).sql,
            "((w < h) OR (w = h))"
        );
        assert!(orientation_clause("w", "h", &OrientationCriterion::default()).is_empty());
    }

    #[test]
    fn test_path_clause() {
        let c = path_clause("path", "folders.path", "files.basename", &s("a b", M::Includes))
            .unwrap();
        assert_eq!(
            c.sql,
            "((folders.path || '/' || files.basename LIKE ?) OR (folders.path || '/' || files.basename LIKE ?))"
        );
        let c = path_clause("path", "folders.path", "files.basename", &s("a", M::NotEquals))
            .unwrap();
        assert_eq!(c.sql, "NOT (folders.path || '/' || files.basename LIKE ?)");
    }

    fn scene_tags() -> JoinedMulti<'static> {
        JoinedMulti {
            field: "tags",
            primary_table: "scenes",
            join_table: "scenes_tags",
            primary_fk: "scene_id",
            foreign_fk: "tag_id",
        }
    }

    #[test]
    fn test_joined_multi_includes_all() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(
            &mut f,
            Some(&MultiCriterion {
                value: vec![1, 2],
                excludes: vec![3],
                modifier: Some(M::IncludesAll),
            }),
        );
        let compiled = f.finish().unwrap();
        assert_eq!(
            compiled.join_sql(),
            "LEFT JOIN scenes_tags ON scenes_tags.scene_id = scenes.id"
        );
        assert_eq!(
            compiled.where_clause.sql,
            "((scenes_tags.tag_id IN (?, ?)) AND (scenes.id NOT IN (SELECT scenes_tags.scene_id FROM scenes_tags WHERE scenes_tags.tag_id IN (?))))"
        );
        assert_eq!(
            compiled.having_clause.sql,
            "(count(distinct scenes_tags.tag_id) = ?)"
        );
        assert_eq!(
            compiled.args(),
            vec![
                SqlArg::Int(1),
                SqlArg::Int(2),
                SqlArg::Int(3),
                SqlArg::Int(2)
            ]
        );
    }

    #[test]
    fn test_joined_multi_empty_is_noop() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(&mut f, Some(&MultiCriterion::default()));
        scene_tags().apply(
            &mut f,
            Some(&MultiCriterion {
                modifier: Some(M::Excludes),
                ..Default::default()
            }),
        );
        let compiled = f.finish().unwrap();
        assert!(compiled.joins.is_empty());
        assert!(compiled.where_clause.is_empty());
    }

    #[test]
    fn test_joined_multi_excludes_becomes_anti_join() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(
            &mut f,
            Some(&MultiCriterion {
                value: vec![5],
                excludes: vec![],
                modifier: Some(M::Excludes),
            }),
        );
        let compiled = f.finish().unwrap();
        assert!(compiled.joins.is_empty());
        assert!(compiled.having_clause.is_empty());
        assert_eq!(
            compiled.where_clause.sql,
            "(scenes.id NOT IN (SELECT scenes_tags.scene_id FROM scenes_tags WHERE scenes_tags.tag_id IN (?)))"
        );
    }

    #[test]
    fn test_joined_multi_not_equals_is_error() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(
            &mut f,
            Some(&MultiCriterion {
                value: vec![1],
                excludes: vec![],
                modifier: Some(M::NotEquals),
            }),
        );
        assert_eq!(
            f.finish().unwrap_err(),
            FilterError::unsupported_modifier("tags", "NOT_EQUALS")
        );
    }

    #[test]
    fn test_joined_multi_is_null() {
        let mut f = FilterBuilder::new("scenes");
        scene_tags().apply(
            &mut f,
            Some(&MultiCriterion {
                modifier: Some(M::IsNull),
                ..Default::default()
            }),
        );
        let compiled = f.finish().unwrap();
        assert_eq!(compiled.where_clause.sql, "(scenes_tags.tag_id IS NULL)");
    }

    #[test]
    fn test_relation_count_uses_having() {
        let mut f = FilterBuilder::new("scenes");
        RelationCount {
            field: "tag_count",
            primary_table: "scenes",
            join_table: "scenes_tags",
            primary_fk: "scene_id",
            counted: "tag_id",
        }
        .apply(
            &mut f,
            Some(&IntCriterion {
                value: 0,
                value2: None,
                modifier: M::Equals,
            }),
        );
        let compiled = f.finish().unwrap();
        assert_eq!(
            compiled.join_sql(),
            "LEFT JOIN scenes_tags AS scenes_tags_count ON scenes_tags_count.scene_id = scenes.id"
        );
        assert_eq!(
            compiled.having_clause.sql,
            "(COUNT(DISTINCT scenes_tags_count.tag_id) = ?)"
        );
    }

    #[test]
    fn test_string_list_excludes_subquery() {
        let mut f = FilterBuilder::new("performers");
        StringList {
            field: "aliases",
            primary_table: "performers",
            join_table: "performer_aliases",
            primary_fk: "performer_id",
            column: "alias",
        }
        .apply(&mut f, Some(&s("bob", M::Excludes)));
        let compiled = f.finish().unwrap();
        assert!(compiled.joins.is_empty());
        assert_eq!(
            compiled.where_clause.sql,
            "(performers.id NOT IN (SELECT performer_aliases.performer_id FROM performer_aliases WHERE performer_aliases.alias LIKE ?))"
        );
        assert_eq!(compiled.args(), vec![SqlArg::Text("%bob%".into())]);
    }

    #[test]
    fn test_stash_ids_scoped_to_endpoint() {
        let stash = StashIds {
            primary_table: "scenes",
            table: "scene_stash_ids",
            primary_fk: "scene_id",
        };
        let mut f = FilterBuilder::new("scenes");
        stash.apply(
            &mut f,
            Some(&StashIdCriterion {
                endpoint: Some("https://box.example/graphql".into()),
                stash_id: None,
                modifier: M::IsNull,
            }),
        );
        let compiled = f.finish().unwrap();
        assert_eq!(
            compiled.where_clause.sql,
            "(scenes.id NOT IN (SELECT s.scene_id FROM scene_stash_ids s WHERE ((s.endpoint = ?) AND ((s.stash_id IS NOT NULL AND TRIM(s.stash_id) != '')))))"
        );
        assert_eq!(
            compiled.args(),
            vec![SqlArg::Text("https://box.example/graphql".into())]
        );
    }
}
