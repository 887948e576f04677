//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and recovery.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: holon_core::ConfigError,
    },

    /// Opening a backend, replaying the log, or rebuilding the graph failed.
    #[error("{code}: {source}")]
    Model {
        /// Stable code of the underlying error.
        code: &'static str,
        /// The underlying model error.
        source: holon_core::CoreError,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}

impl From<holon_core::CoreError> for EngineError {
    fn from(source: holon_core::CoreError) -> Self {
        Self::Model {
            code: source.code(),
            source,
        }
    }
}
