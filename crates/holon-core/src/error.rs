//! Error types for the operating model facade.
//!
//! [`CoreError`] unifies the failure modes of every layer below it. Each
//! variant carries a stable [`code`](CoreError::code) that callers can
//! branch on without parsing messages.

use holon_db::DbError;
use holon_graph::GraphError;
use holon_projection::ProjectionError;

use crate::config::ConfigError;

/// Errors returned by [`OperatingModel`](crate::OperatingModel).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The event store or the projection behind it failed.
    #[error("storage error: {message}")]
    Storage {
        /// What failed.
        message: String,
        /// Whether retrying with backoff may succeed.
        retryable: bool,
    },

    /// The requested entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity looked up.
        entity: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// A persisted event could not be decoded.
    #[error("corrupt event {id}: {reason}")]
    Deserialization {
        /// The row's identifier as stored.
        id: String,
        /// What failed to decode.
        reason: String,
    },

    /// The graph or its cache could not be brought in step with the log.
    /// The event log itself is intact.
    #[error("graph sync error: {0}")]
    GraphSync(String),

    /// The request was rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The configuration could not be loaded or a backend could not be
    /// reached with it.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Stable, machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Deserialization { .. } => "DESERIALIZATION_ERROR",
            Self::GraphSync(_) => "GRAPH_SYNC_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether retrying the operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { retryable, .. } => *retryable,
            Self::GraphSync(_) => true,
            Self::NotFound { .. }
            | Self::Deserialization { .. }
            | Self::Validation(_)
            | Self::Config(_) => false,
        }
    }

    /// Build a [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::CorruptEvent { id, reason } => Self::Deserialization { id, reason },
            DbError::Config(message) => Self::Config(message),
            other => Self::Storage {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ProjectionError> for CoreError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Storage(inner) => inner.into(),
            ProjectionError::CorruptEvent { id, reason } => Self::Deserialization { id, reason },
            ProjectionError::CoordinatorClosed => Self::Storage {
                message: ProjectionError::CoordinatorClosed.to_string(),
                retryable: false,
            },
        }
    }
}

impl From<GraphError> for CoreError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Projection(inner) => inner.into(),
            GraphError::InvalidQuery(message) => Self::Validation(message),
            other => Self::GraphSync(other.to_string()),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let cases = [
            (
                CoreError::Storage {
                    message: String::new(),
                    retryable: true,
                },
                "STORAGE_ERROR",
            ),
            (CoreError::not_found("holon", "h-1"), "NOT_FOUND"),
            (
                CoreError::Deserialization {
                    id: "e".to_owned(),
                    reason: "eof".to_owned(),
                },
                "DESERIALIZATION_ERROR",
            ),
            (CoreError::GraphSync(String::new()), "GRAPH_SYNC_ERROR"),
            (CoreError::Validation(String::new()), "VALIDATION_ERROR"),
            (CoreError::Config(String::new()), "CONFIG_ERROR"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn corrupt_rows_become_deserialization_errors() {
        let direct = CoreError::from(DbError::corrupt("e-1", "payload: EOF"));
        assert_eq!(direct.code(), "DESERIALIZATION_ERROR");

        let lifted = CoreError::from(ProjectionError::from(DbError::corrupt("e-2", "bad")));
        assert!(matches!(lifted, CoreError::Deserialization { ref id, .. } if id == "e-2"));

        let nested = CoreError::from(GraphError::Projection(ProjectionError::CorruptEvent {
            id: "e-3".to_owned(),
            reason: "bad".to_owned(),
        }));
        assert_eq!(nested.code(), "DESERIALIZATION_ERROR");
    }

    #[test]
    fn graph_failures_stay_distinct_from_storage() {
        let err = CoreError::from(GraphError::Interrupted { processed: 3 });
        assert_eq!(err.code(), "GRAPH_SYNC_ERROR");
        assert!(err.is_retryable());

        let query = CoreError::from(GraphError::InvalidQuery("window".to_owned()));
        assert_eq!(query.code(), "VALIDATION_ERROR");
        assert!(!query.is_retryable());
    }

    #[test]
    fn stopped_coordinator_is_a_permanent_storage_error() {
        let err = CoreError::from(ProjectionError::CoordinatorClosed);
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(!err.is_retryable());
    }
}
