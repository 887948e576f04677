//! Embedded single-file `SQLite` database for standalone and edge
//! deployments.
//!
//! Mirrors [`crate::postgres`]: a config struct, a pool wrapper that runs the
//! `migrations/sqlite` schema, and a constructor for the event store. The
//! file is opened in WAL mode; `SQLite` serializes writers itself.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::DbError;
use crate::sqlite_event_store::SqliteEventStore;

/// URL of a private in-memory database.
pub const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Default maximum number of connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default time a writer waits on a locked database.
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Default upper bound for a single store operation in seconds.
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Configuration for the embedded `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// `sqlite://path/to/file.db` or [`IN_MEMORY_URL`].
    pub url: String,
    /// Maximum number of connections. Forced to 1 for in-memory databases,
    /// which are private to a connection.
    pub max_connections: u32,
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
    /// Upper bound for any single event store call.
    pub operation_timeout: Duration,
}

impl SqliteConfig {
    /// Configuration for a database file, created if missing.
    pub fn file(path: &std::path::Path) -> Self {
        Self::new(&format!("sqlite://{}", path.display()))
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_URL)
    }

    /// Configuration from a connection URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }

    /// Set the upper bound for a single store operation.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

/// Connection pool handle to the embedded database.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    operation_timeout: Duration,
}

impl SqliteDatabase {
    /// Open (or create) the database described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Sql`] if the database cannot be opened.
    pub async fn connect(config: &SqliteConfig) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout);

        let in_memory = config.is_in_memory();
        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        let pool_options = if in_memory {
            // Every new connection would see a fresh, empty database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;

        tracing::info!(url = %config.url, in_memory, "Opened SQLite event database");

        Ok(Self {
            pool,
            operation_timeout: config.operation_timeout,
        })
    }

    /// Run all pending migrations from `migrations/sqlite`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        tracing::info!("SQLite migrations completed");
        Ok(())
    }

    /// Open an in-memory database with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if opening or migrating fails.
    pub async fn open_in_memory() -> Result<Self, DbError> {
        let db = Self::connect(&SqliteConfig::in_memory()).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// An event store over this database.
    pub fn event_store(&self) -> SqliteEventStore {
        SqliteEventStore::new(self.pool.clone(), self.operation_timeout)
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite pool closed");
    }
}
