//! Graph layer for the Holon operating model.
//!
//! Mirrors the projected state into a traversable node/edge graph, fronts
//! it with a cache-aside layer, and resolves hierarchical availability over
//! it.
//!
//! ```text
//! Event --> ProjectionHandle --> GraphSynchronizer --> GraphBackend (MemoryGraph)
//!                                       ^
//!                           CachedGraph (CacheBackend)
//!                                       ^
//!                             AvailabilityResolver
//! ```
//!
//! # Modules
//!
//! - [`graph`] -- The [`HolonGraph`] read/write contract
//! - [`backend`] -- Graph storage contract and in-memory adjacency graph
//! - [`synchronizer`] -- Full rebuild and incremental upsert from the projection
//! - [`cached`] -- Cache-aside decorator
//! - [`pattern`] -- Multi-hop structural matching
//! - [`availability`] -- Direct and inherited calendar conflicts
//! - [`filter`] -- Holon and relationship query filters
//! - [`label`] -- Label sanitization
//! - [`error`] -- Error types

pub mod availability;
pub mod backend;
pub mod cached;
pub mod error;
pub mod filter;
pub mod graph;
pub mod label;
pub mod pattern;
pub mod synchronizer;

pub use availability::{AvailabilityConfig, AvailabilityResolver, CalendarSource};
pub use backend::{EdgeUpsert, GraphBackend, GraphEdge, GraphNode, MemoryGraph};
pub use cached::CachedGraph;
pub use error::GraphError;
pub use filter::{HolonFilter, RelationshipFilter};
pub use graph::{HolonGraph, SyncSummary};
pub use pattern::{Hop, NodeSelector, PathMatch, Pattern};
pub use synchronizer::{GraphSynchronizer, affected_holons, affected_relationship};
