//! Error types for the projection engine.

use holon_db::DbError;

/// Errors that can occur while projecting state.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The event store failed. Retryable when the inner error is.
    #[error("event store error: {0}")]
    Storage(DbError),

    /// A persisted event could not be decoded. The enclosing replay is
    /// aborted rather than producing partial state.
    #[error("corrupt event {id}: {reason}")]
    CorruptEvent {
        /// The row's identifier as stored.
        id: String,
        /// What failed to decode.
        reason: String,
    },

    /// The coordinator task has stopped and can no longer accept commands.
    #[error("projection coordinator is not running")]
    CoordinatorClosed,
}

impl ProjectionError {
    /// Whether retrying the operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(inner) => inner.is_retryable(),
            Self::CorruptEvent { .. } | Self::CoordinatorClosed => false,
        }
    }
}

impl From<DbError> for ProjectionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::CorruptEvent { id, reason } => Self::CorruptEvent { id, reason },
            other => Self::Storage(other),
        }
    }
}
