//! Graph reads answered straight from the projection.
//!
//! [`ProjectedGraph`] stands in for the graph layer while the model is
//! degraded. It holds no state of its own: every read scans the current
//! projection, so it is slower than the graph but never stale. Edges with
//! a missing endpoint are hidden, as they are in the graph.

use std::collections::BTreeSet;

use async_trait::async_trait;
use holon_graph::pattern;
use holon_graph::{
    GraphBackend, GraphEdge, GraphError, GraphNode, HolonFilter, HolonGraph, MemoryGraph,
    PathMatch, Pattern, RelationshipFilter, SyncSummary,
};
use holon_projection::ProjectionHandle;
use holon_types::{Direction, Event, Holon, HolonId, HolonType, Relationship};

/// Read-only [`HolonGraph`] over a [`ProjectionHandle`].
#[derive(Clone)]
pub struct ProjectedGraph {
    projection: ProjectionHandle,
}

impl ProjectedGraph {
    /// Wrap a running projection.
    pub const fn new(projection: ProjectionHandle) -> Self {
        Self { projection }
    }
}

fn faces(relationship: &Relationship, id: &HolonId, direction: Direction) -> bool {
    match direction {
        Direction::Outgoing => relationship.source_holon_id == *id,
        Direction::Incoming => relationship.target_holon_id == *id,
        Direction::Both => true,
    }
}

#[async_trait]
impl HolonGraph for ProjectedGraph {
    async fn initialize(&self) -> Result<SyncSummary, GraphError> {
        self.rebuild_indices().await
    }

    async fn rebuild_indices(&self) -> Result<SyncSummary, GraphError> {
        self.projection.replay_all().await?;
        let state = self.projection.reader().state().await;
        Ok(SyncSummary {
            nodes: state.holons.len(),
            edges: state.relationships.len(),
            skipped_edges: 0,
        })
    }

    async fn update_from_new_event(&self, _event: &Event) -> Result<SyncSummary, GraphError> {
        // The projection already holds the event.
        Ok(SyncSummary::default())
    }

    async fn get_holon(&self, id: &HolonId) -> Result<Option<Holon>, GraphError> {
        Ok(self
            .projection
            .reader()
            .holon_state(id)
            .await
            .map(|state| state.holon))
    }

    async fn query_holons_by_type(
        &self,
        holon_type: &HolonType,
        filter: &HolonFilter,
    ) -> Result<Vec<Holon>, GraphError> {
        Ok(self
            .projection
            .reader()
            .holons_by_type(holon_type)
            .await
            .into_iter()
            .map(|state| state.holon)
            .filter(|holon| filter.matches(holon))
            .collect())
    }

    async fn traverse_relationships(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Relationship>, GraphError> {
        let reader = self.projection.reader();
        if reader.holon_state(id).await.is_none() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for state in reader.relationships_touching(id).await {
            let relationship = state.relationship;
            if !faces(&relationship, id, direction)
                || relationship_type.is_some_and(|kind| relationship.relationship_type != kind)
                || !filter.matches(&relationship)
            {
                continue;
            }
            let other = if relationship.source_holon_id == *id {
                &relationship.target_holon_id
            } else {
                &relationship.source_holon_id
            };
            if reader.holon_state(other).await.is_some() {
                found.push(relationship);
            }
        }
        Ok(found)
    }

    async fn get_connected_holons(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Holon>, GraphError> {
        let neighbors: BTreeSet<HolonId> = self
            .traverse_relationships(id, relationship_type, direction, filter)
            .await?
            .into_iter()
            .map(|relationship| {
                if relationship.source_holon_id == *id {
                    relationship.target_holon_id
                } else {
                    relationship.source_holon_id
                }
            })
            .collect();

        let reader = self.projection.reader();
        let mut holons = Vec::with_capacity(neighbors.len());
        for neighbor in &neighbors {
            if let Some(state) = reader.holon_state(neighbor).await {
                holons.push(state.holon);
            }
        }
        Ok(holons)
    }

    async fn match_pattern(&self, pattern: &Pattern) -> Result<Vec<PathMatch>, GraphError> {
        // Throwaway graph over the current state.
        let state = self.projection.reader().state().await;
        let scratch = MemoryGraph::new();
        for entry in state.holons.into_values() {
            scratch.upsert_node(GraphNode::from_holon(entry.holon)).await?;
        }
        for entry in state.relationships.into_values() {
            scratch
                .upsert_edge(GraphEdge::from_relationship(entry.relationship))
                .await?;
        }
        pattern::match_pattern(&scratch, pattern).await
    }
}
