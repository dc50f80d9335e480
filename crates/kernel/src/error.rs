//! Schema engine error types.
//!
//! Domain errors carry the codes and paths involved so callers can build a
//! precise message. Infrastructure failures stay in the `Database` and
//! `Internal` variants and are never reported as validation problems.

use thiserror::Error;

/// Errors returned by the schema, index, and query services.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Malformed name, type, or parent mismatch.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Duplicate full path, duplicate embed, or path collision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Embedding would make a blueprint depend on itself.
    #[error("embedding '{embedded}' into '{host}' would create a cyclic dependency")]
    CyclicDependency { host: String, embedded: String },

    /// Direct edit of a materialized copy.
    #[error(
        "path '{path}' is materialized from blueprint '{source_blueprint}'; edit it there instead"
    )]
    ImmutableField {
        path: String,
        source_blueprint: String,
    },

    /// Blueprint still in use.
    #[error("blueprint '{code}' is still in use: {}", .reasons.join("; "))]
    Referential { code: String, reasons: Vec<String> },

    /// Payload shape does not match the declared type or cardinality.
    #[error("cannot index '{path}': {message}")]
    Indexing { path: String, message: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A tree or graph traversal went deeper than the configured bound.
    #[error("traversal exceeded the maximum depth of {limit}")]
    DepthLimit { limit: usize },

    #[error("database error")]
    Database(#[source] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl SchemaError {
    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn indexing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Indexing {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a caller-facing domain error.
    ///
    /// `false` means infrastructure failure (storage, transaction abort).
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Internal(_))
    }

    /// Map a failed write, turning unique-constraint violations into conflicts.
    pub fn from_write(err: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(conflict()),
            _ => Self::Database(err),
        }
    }
}

impl From<sqlx::Error> for SchemaError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                key: "query returned no rows".to_string(),
            },
            other => Self::Database(other),
        }
    }
}

/// Result type alias using SchemaError.
pub type SchemaResult<T> = Result<T, SchemaError>;
