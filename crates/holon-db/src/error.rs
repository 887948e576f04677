//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors with additional context about which
//! operation failed.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` or `SQLite` operation failed.
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    /// A schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization error while writing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted event could not be decoded.
    #[error("corrupt event {id}: {reason}")]
    CorruptEvent {
        /// The row's identifier as stored.
        id: String,
        /// What failed to decode.
        reason: String,
    },

    /// A backing-store call did not complete in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The configured limit.
        timeout_ms: u64,
        /// The elapsed marker.
        #[source]
        source: tokio::time::error::Elapsed,
    },

    /// A key was not found in `Dragonfly`.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether the caller should retry the operation with backoff.
    ///
    /// I/O failures and timeouts are retryable; corrupt data and bad
    /// configuration are not.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Sql(_) | Self::Dragonfly(_) | Self::Timeout { .. })
    }

    /// Build a [`DbError::CorruptEvent`].
    pub fn corrupt(id: impl Into<String>, reason: impl core::fmt::Display) -> Self {
        Self::CorruptEvent {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to [`DbError::Timeout`].
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: std::time::Duration,
    fut: F,
) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|source| DbError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            source,
        })?
}
