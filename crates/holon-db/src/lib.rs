//! Data layer for the Holon operating model.
//!
//! The event log is the only durable state. It lives in `PostgreSQL` for
//! multi-writer deployments or in an embedded `SQLite` file for standalone
//! ones; both implement [`EventStore`] with identical filter and ordering
//! semantics. `Dragonfly` holds disposable query results for the graph
//! layer and can be flushed at any time.
//!
//! ```text
//! submit_event
//!     |
//!     +-- append --------> EventStore (PgEventStore | SqliteEventStore | MemoryEventStore)
//!     |
//!     +-- invalidate ----> CacheBackend (DragonflyCache | MemoryCache)
//! ```
//!
//! # Modules
//!
//! - [`event_store`] -- The store contract, filters, in-memory store
//! - [`postgres`] / [`pg_event_store`] -- `PostgreSQL` pool and store
//! - [`sqlite`] / [`sqlite_event_store`] -- Embedded database and store
//! - [`cache`] / [`dragonfly`] -- Query cache contract and backends
//! - [`error`] -- Shared error types

pub mod cache;
pub mod dragonfly;
pub mod error;
pub mod event_store;
pub mod pg_event_store;
pub mod postgres;
pub mod sqlite;
pub mod sqlite_event_store;

// Re-export primary types for convenience.
pub use cache::{CacheBackend, MemoryCache};
pub use dragonfly::DragonflyCache;
pub use error::DbError;
pub use event_store::{EventFilter, EventStore, MemoryEventStore, TimeRange};
pub use pg_event_store::PgEventStore;
pub use postgres::{PostgresConfig, PostgresPool};
pub use sqlite::{SqliteConfig, SqliteDatabase};
pub use sqlite_event_store::SqliteEventStore;
