//! State projection for the Holon operating model.
//!
//! Folds the ordered event log into the current (and any historical)
//! [`ProjectedState`](holon_types::ProjectedState), plus a calendar index
//! used for availability checks. State is never stored; it is always
//! derivable by replay.
//!
//! # Modules
//!
//! - [`fold`] -- Per-event-type handlers and the dispatch table
//! - [`calendar`] -- Calendar entry index
//! - [`engine`] -- Replay, incremental apply, as-of queries, shared reader
//! - [`coordinator`] -- Single-owner task serializing writes to the engine
//! - [`error`] -- Projection error types

pub mod calendar;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fold;

pub use calendar::CalendarIndex;
pub use coordinator::{DEFAULT_QUEUE_CAPACITY, ProjectionCoordinator, ProjectionHandle};
pub use engine::{ProjectionEngine, ProjectionReader, ReplaySummary, replay_as_of};
pub use error::ProjectionError;
pub use fold::{FoldMode, Placement, ProjectionSnapshot};
