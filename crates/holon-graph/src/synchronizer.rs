//! Projected state → graph.
//!
//! [`GraphSynchronizer`] mirrors the projection into a [`GraphBackend`].
//! A full rebuild replays the projection through its coordinator and
//! rewrites every node and edge. The incremental path touches only the
//! holons and relationship an event names, so its cost follows the event,
//! not the graph.
//!
//! Edges whose endpoints are not nodes yet are skipped, not failed. When a
//! holon first appears, its pending edges are written.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use holon_projection::ProjectionHandle;
use holon_types::{
    Direction, Event, EventPayload, Holon, HolonId, HolonType, Relationship, RelationshipId,
};

use crate::backend::{EdgeUpsert, GraphBackend, GraphEdge, GraphNode};
use crate::error::GraphError;
use crate::filter::{HolonFilter, RelationshipFilter};
use crate::graph::{HolonGraph, SyncSummary};
use crate::pattern::{self, PathMatch, Pattern};

/// Holons an event may have changed: its subjects plus any holon named in
/// the payload.
///
/// IDs that turn out not to be holons (calendar entries, relationships)
/// are harmless; lookups for them come back empty.
pub fn affected_holons(event: &Event) -> BTreeSet<HolonId> {
    let mut ids: BTreeSet<HolonId> = event
        .subjects
        .iter()
        .map(|s| HolonId::from(s.as_str()))
        .collect();
    let named = match EventPayload::decode(event.event_type.handler_kind(), &event.payload) {
        EventPayload::HolonCreation(creation) => vec![creation.holon_id],
        EventPayload::HolonModification(patch) => vec![patch.holon_id],
        EventPayload::HolonDeactivation(target) => vec![target.holon_id],
        EventPayload::RelationshipStart(start) => {
            vec![start.source_holon_id, start.target_holon_id]
        }
        _ => Vec::new(),
    };
    ids.extend(named.into_iter().flatten().map(HolonId::from));
    ids
}

/// The relationship an event changed, if it is a relationship event.
///
/// Starts need an explicit `relationshipId`; ends and corrections fall back
/// to `subjects[0]`.
pub fn affected_relationship(event: &Event) -> Option<RelationshipId> {
    let kind = event.event_type.handler_kind();
    if !kind.is_relationship() {
        return None;
    }
    let explicit = match EventPayload::decode(kind, &event.payload) {
        EventPayload::RelationshipStart(start) => {
            return start.relationship_id.map(RelationshipId::from);
        }
        EventPayload::RelationshipEnd(target) => target.relationship_id,
        EventPayload::RelationshipCorrection(patch) => patch.relationship_id,
        _ => None,
    };
    explicit
        .or_else(|| event.primary_subject().map(str::to_owned))
        .map(RelationshipId::from)
}

/// Keeps a [`GraphBackend`] in step with the projection.
pub struct GraphSynchronizer {
    backend: Arc<dyn GraphBackend>,
    projection: ProjectionHandle,
    interrupt: Arc<AtomicBool>,
}

impl GraphSynchronizer {
    /// Create a synchronizer. The backend starts however it is; call
    /// [`HolonGraph::initialize`] to populate it.
    pub fn new(backend: Arc<dyn GraphBackend>, projection: ProjectionHandle) -> Self {
        Self {
            backend,
            projection,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop a running rebuild at the next entity whenever `flag` is set,
    /// e.g. from a signal handler.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// The graph backend.
    pub fn backend(&self) -> Arc<dyn GraphBackend> {
        Arc::clone(&self.backend)
    }

    /// The projection this synchronizer reads from.
    pub const fn projection(&self) -> &ProjectionHandle {
        &self.projection
    }

    fn check_interrupt(&self, summary: &SyncSummary) -> Result<(), GraphError> {
        if self.interrupt.swap(false, Ordering::AcqRel) {
            let processed = summary.processed();
            tracing::warn!(processed, "Graph rebuild interrupted");
            return Err(GraphError::Interrupted { processed });
        }
        Ok(())
    }

    async fn write_node(&self, holon: Holon, summary: &mut SyncSummary) -> Result<bool, GraphError> {
        let created = self.backend.upsert_node(GraphNode::from_holon(holon)).await?;
        summary.nodes = summary.nodes.saturating_add(1);
        Ok(created)
    }

    async fn write_edge(
        &self,
        relationship: Relationship,
        summary: &mut SyncSummary,
    ) -> Result<(), GraphError> {
        let id = relationship.id.clone();
        match self
            .backend
            .upsert_edge(GraphEdge::from_relationship(relationship))
            .await?
        {
            EdgeUpsert::Written => summary.edges = summary.edges.saturating_add(1),
            EdgeUpsert::MissingEndpoint(endpoint) => {
                tracing::warn!(
                    relationship_id = %id,
                    missing = %endpoint,
                    "Edge endpoint not in graph, skipped"
                );
                summary.skipped_edges = summary.skipped_edges.saturating_add(1);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HolonGraph for GraphSynchronizer {
    async fn initialize(&self) -> Result<SyncSummary, GraphError> {
        self.backend.ensure_indexes().await?;
        tracing::info!(backend = self.backend.backend_name(), "Graph indexes provisioned");
        self.rebuild_indices().await
    }

    async fn rebuild_indices(&self) -> Result<SyncSummary, GraphError> {
        // A stale request must not abort a rebuild started after it.
        self.interrupt.store(false, Ordering::Release);

        let replay = self.projection.replay_all().await?;
        let state = self.projection.reader().state().await;
        self.backend.clear().await?;

        let mut summary = SyncSummary::default();
        for entry in state.holons.into_values() {
            self.check_interrupt(&summary)?;
            self.write_node(entry.holon, &mut summary).await?;
        }
        for entry in state.relationships.into_values() {
            self.check_interrupt(&summary)?;
            self.write_edge(entry.relationship, &mut summary).await?;
        }

        tracing::info!(
            backend = self.backend.backend_name(),
            events = replay.events,
            nodes = summary.nodes,
            edges = summary.edges,
            skipped_edges = summary.skipped_edges,
            "Graph rebuilt"
        );
        Ok(summary)
    }

    async fn update_from_new_event(&self, event: &Event) -> Result<SyncSummary, GraphError> {
        let mut summary = SyncSummary::default();
        let kind = event.event_type.handler_kind();
        if kind.is_calendar() {
            return Ok(summary);
        }

        let reader = self.projection.reader();
        let relationship = match affected_relationship(event) {
            Some(id) => reader.relationship_state(&id).await,
            None => None,
        };

        let mut holons = affected_holons(event);
        if let Some(state) = &relationship {
            holons.insert(state.relationship.source_holon_id.clone());
            holons.insert(state.relationship.target_holon_id.clone());
        }

        // Edges that were skipped earlier because this holon was missing.
        let mut pending = BTreeMap::new();
        for id in &holons {
            let Some(state) = reader.holon_state(id).await else {
                continue;
            };
            if self.write_node(state.holon, &mut summary).await? {
                for touching in reader.relationships_touching(id).await {
                    pending.insert(touching.relationship.id.clone(), touching.relationship);
                }
            }
        }
        if let Some(state) = relationship {
            pending.insert(state.relationship.id.clone(), state.relationship);
        }
        for edge in pending.into_values() {
            self.write_edge(edge, &mut summary).await?;
        }

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            nodes = summary.nodes,
            edges = summary.edges,
            "Graph updated"
        );
        Ok(summary)
    }

    async fn get_holon(&self, id: &HolonId) -> Result<Option<Holon>, GraphError> {
        Ok(self.backend.node(id).await?.map(|node| node.holon))
    }

    async fn query_holons_by_type(
        &self,
        holon_type: &HolonType,
        filter: &HolonFilter,
    ) -> Result<Vec<Holon>, GraphError> {
        Ok(self
            .backend
            .nodes_by_type(holon_type.as_str())
            .await?
            .into_iter()
            .map(|node| node.holon)
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
        Ok(self
            .backend
            .edges(id, relationship_type, direction)
            .await?
            .into_iter()
            .map(|edge| edge.relationship)
            .filter(|relationship| filter.matches(relationship))
            .collect())
    }

    async fn get_connected_holons(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Holon>, GraphError> {
        let edges = self
            .traverse_relationships(id, relationship_type, direction, filter)
            .await?;
        let neighbors: BTreeSet<HolonId> = edges
            .into_iter()
            .map(|relationship| {
                if relationship.source_holon_id == *id {
                    relationship.target_holon_id
                } else {
                    relationship.source_holon_id
                }
            })
            .collect();

        let mut holons = Vec::with_capacity(neighbors.len());
        for neighbor in &neighbors {
            if let Some(node) = self.backend.node(neighbor).await? {
                holons.push(node.holon);
            }
        }
        Ok(holons)
    }

    async fn match_pattern(&self, pattern: &Pattern) -> Result<Vec<PathMatch>, GraphError> {
        pattern::match_pattern(self.backend.as_ref(), pattern).await
    }
}
