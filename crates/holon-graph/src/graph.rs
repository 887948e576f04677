//! The read/write contract shared by the synchronizer and its cache.

use async_trait::async_trait;
use holon_types::{Direction, Event, Holon, HolonId, HolonType, Relationship};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::filter::{HolonFilter, RelationshipFilter};
use crate::pattern::{PathMatch, Pattern};

/// Counts reported by a rebuild or an incremental update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Nodes written.
    pub nodes: usize,
    /// Edges written.
    pub edges: usize,
    /// Edges skipped because an endpoint was not a node yet.
    pub skipped_edges: usize,
}

impl SyncSummary {
    /// Nodes and edges handled so far, written or skipped.
    pub const fn processed(&self) -> usize {
        self.nodes
            .saturating_add(self.edges)
            .saturating_add(self.skipped_edges)
    }
}

/// A queryable mirror of the projected state.
///
/// Implemented by [`crate::GraphSynchronizer`] and, transparently, by the
/// cache-aside [`crate::CachedGraph`] wrapped around it.
#[async_trait]
pub trait HolonGraph: Send + Sync {
    /// Provision backend indexes, then rebuild.
    async fn initialize(&self) -> Result<SyncSummary, GraphError>;

    /// Replay the projection and rewrite the whole graph from it.
    async fn rebuild_indices(&self) -> Result<SyncSummary, GraphError>;

    /// Upsert only the nodes and edges `event` touched. The event must
    /// already be applied to the projection.
    async fn update_from_new_event(&self, event: &Event) -> Result<SyncSummary, GraphError>;

    /// One holon.
    async fn get_holon(&self, id: &HolonId) -> Result<Option<Holon>, GraphError>;

    /// Holons of one type passing `filter`, ordered by ID.
    async fn query_holons_by_type(
        &self,
        holon_type: &HolonType,
        filter: &HolonFilter,
    ) -> Result<Vec<Holon>, GraphError>;

    /// Relationships incident on `id`, ordered by ID.
    async fn traverse_relationships(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Relationship>, GraphError>;

    /// The holons at the far end of the same traversal, deduplicated.
    async fn get_connected_holons(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Holon>, GraphError>;

    /// Multi-hop structural match.
    async fn match_pattern(&self, pattern: &Pattern) -> Result<Vec<PathMatch>, GraphError>;
}
