//! Error types for the graph layer.

use holon_db::DbError;
use holon_projection::ProjectionError;

/// Errors that can occur while synchronizing or querying the graph.
///
/// None of these imply event loss: the event log is already durable by the
/// time the graph is touched, so every variant is recoverable by a forced
/// rebuild.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph backend rejected or could not complete a write.
    #[error("graph sync error: {0}")]
    Sync(String),

    /// Replaying or reading the projection failed.
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// The cache backend failed.
    #[error("cache error: {0}")]
    Cache(#[from] DbError),

    /// A rebuild was interrupted before it finished. The graph holds a
    /// partial image until the next rebuild.
    #[error("rebuild interrupted after {processed} entities")]
    Interrupted {
        /// Nodes and edges written before the interrupt was observed.
        processed: usize,
    },

    /// A query was malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl GraphError {
    /// Whether retrying the operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Sync(_) | Self::Interrupted { .. } => true,
            Self::Projection(inner) => inner.is_retryable(),
            Self::Cache(inner) => inner.is_retryable(),
            Self::InvalidQuery(_) => false,
        }
    }
}
