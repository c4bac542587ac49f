//! Error types for the data layer
//!
//! `FilterError` describes a malformed filter tree and is always a user error.
//! `DataError` is what every engine operation returns: it carries filter
//! errors (caught at validation or during compilation), wrapped backend
//! failures, missing rows and blob storage failures.

use thiserror::Error;

use crate::data::blobs::BlobStorageError;

/// A filter tree that cannot be compiled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Two mutually exclusive parts were set on the same node
    #[error("{0} and {1} sub-filters are mutually exclusive")]
    IllegalCombination(&'static str, &'static str),

    #[error("invalid regex for {field}: {error}")]
    InvalidRegex { field: String, error: String },

    #[error("modifier {modifier} is not supported for {field}")]
    UnsupportedModifier { field: String, modifier: String },

    /// A related-entity filter that itself carries related filters
    #[error("{0} cannot be used inside a related filter")]
    NestedRelatedFilter(String),

    #[error("depth {depth} is not supported for {field} with modifier {modifier}")]
    UnsupportedDepth {
        field: String,
        modifier: String,
        depth: i64,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl FilterError {
    pub fn unsupported_modifier(field: &str, modifier: impl std::fmt::Display) -> Self {
        Self::UnsupportedModifier {
            field: field.to_string(),
            modifier: modifier.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Unified error type for engine operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Filter shape rejected before compilation started
    #[error("invalid filter: {0}")]
    Validation(FilterError),

    /// Filter rejected while walking the criterion handlers
    #[error("invalid filter: {0}")]
    Compile(FilterError),

    /// Backend failure, wrapped with the failing step
    #[error("{context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Write blocked by a referencing row
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobStorageError),

    /// Schema setup failed
    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },
}

impl DataError {
    /// Wrap a backend error with the step that produced it
    pub fn execution(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Execution {
            context: context.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for failures caused by the caller's input rather than the backend
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Compile(_) | Self::NotFound { .. }
        )
    }

    /// The filter error behind a validation or compile failure
    pub fn filter_error(&self) -> Option<&FilterError> {
        match self {
            Self::Validation(e) | Self::Compile(e) => Some(e),
            _ => None,
        }
    }
}

impl From<crate::data::sqlite::SqliteError> for DataError {
    fn from(e: crate::data::sqlite::SqliteError) -> Self {
        match e {
            crate::data::sqlite::SqliteError::Database(e) => Self::execution("sqlite", e),
            crate::data::sqlite::SqliteError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                version,
                name,
                error,
            },
            crate::data::sqlite::SqliteError::Io(e) => Self::Io(e),
            crate::data::sqlite::SqliteError::Constraint(msg) => Self::Constraint(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_combination_display() {
        let err = FilterError::IllegalCombination("AND", "OR");
        assert_eq!(err.to_string(), "AND and OR sub-filters are mutually exclusive");
    }

    #[test]
    fn test_unsupported_modifier_display() {
        let err = FilterError::unsupported_modifier("tags", "NOT_EQUALS");
        assert_eq!(
            err.to_string(),
            "modifier NOT_EQUALS is not supported for tags"
        );
    }

    #[test]
    fn test_invalid_regex_display() {
        let err = FilterError::InvalidRegex {
            field: "title".to_string(),
            error: "unclosed group".to_string(),
        };
        assert_eq!(err.to_string(), "invalid regex for title: unclosed group");
    }

    #[test]
    fn test_unsupported_depth_display() {
        let err = FilterError::UnsupportedDepth {
            field: "tags".to_string(),
            modifier: "EQUALS".to_string(),
            depth: 2,
        };
        assert_eq!(
            err.to_string(),
            "depth 2 is not supported for tags with modifier EQUALS"
        );
    }

    #[test]
    fn test_nested_related_display() {
        let err = FilterError::NestedRelatedFilter("performers_filter".to_string());
        assert_eq!(
            err.to_string(),
            "performers_filter cannot be used inside a related filter"
        );
    }

    #[test]
    fn test_validation_and_compile_display() {
        let inner = FilterError::invalid_value("is_missing", "unknown key 'foo'");
        assert_eq!(
            DataError::Validation(inner.clone()).to_string(),
            "invalid filter: invalid value for is_missing: unknown key 'foo'"
        );
        assert_eq!(
            DataError::Compile(inner).to_string(),
            "invalid filter: invalid value for is_missing: unknown key 'foo'"
        );
    }

    #[test]
    fn test_execution_display() {
        let err = DataError::execution("scenes: find ids", sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("scenes: find ids: "));
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_not_found_display() {
        let err = DataError::not_found("blob", "abc");
        assert_eq!(err.to_string(), "blob not found: abc");
        assert!(err.is_user_error());
    }

    #[test]
    fn test_constraint_from_sqlite() {
        let err: DataError =
            crate::data::sqlite::SqliteError::Constraint("blob is referenced".to_string()).into();
        assert!(matches!(err, DataError::Constraint(_)));
        assert_eq!(err.to_string(), "Constraint violation: blob is referenced");
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_is_user_error() {
        let filter = FilterError::IllegalCombination("AND", "NOT");
        assert!(DataError::Validation(filter.clone()).is_user_error());
        assert!(DataError::Compile(filter).is_user_error());
        assert!(!DataError::Io(std::io::Error::other("disk")).is_user_error());
    }

    #[test]
    fn test_filter_error_accessor() {
        let err = DataError::Validation(FilterError::IllegalCombination("AND", "OR"));
        assert_eq!(
            err.filter_error(),
            Some(&FilterError::IllegalCombination("AND", "OR"))
        );
        assert!(DataError::not_found("tags", 1).filter_error().is_none());
    }

    #[test]
    fn test_from_sqlite_migration_error() {
        let err: DataError = crate::data::sqlite::SqliteError::MigrationFailed {
            version: 1,
            name: "initial_schema".into(),
            error: "boom".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Migration 1 (initial_schema) failed: boom"
        );
    }
}
