//! Graph storage: holons as nodes, relationships as typed directed edges.
//!
//! [`GraphBackend`] is the seam a server-backed graph database would
//! implement. [`MemoryGraph`] is the in-process implementation: an
//! adjacency map indexes outbound edges per node
//! (`BTreeMap<HolonId, Vec<RelationshipId>>`) and a reverse map indexes
//! inbound edges, alongside a type index for label scans.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use holon_types::{Direction, Holon, HolonId, Relationship, RelationshipId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GraphError;
use crate::label::label_for;

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// A holon as stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// The projected holon. Its type doubles as the node's `type` property.
    pub holon: Holon,
    /// Sanitized label, absent when the type name is not label-safe.
    pub label: Option<String>,
}

impl GraphNode {
    /// Wrap a holon, deriving its label.
    pub fn from_holon(holon: Holon) -> Self {
        let label = label_for(holon.holon_type.as_str());
        Self { holon, label }
    }

    /// The node's `type` property.
    pub fn type_name(&self) -> &str {
        self.holon.holon_type.as_str()
    }
}

/// A relationship as stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// The projected relationship.
    pub relationship: Relationship,
    /// Sanitized edge label, absent when the relationship type is not
    /// label-safe.
    pub label: Option<String>,
}

impl GraphEdge {
    /// Wrap a relationship, deriving its label.
    pub fn from_relationship(relationship: Relationship) -> Self {
        let label = label_for(&relationship.relationship_type);
        Self {
            relationship,
            label,
        }
    }

    /// The endpoint opposite `from`. For a self-loop this is `from` itself.
    pub fn other_end(&self, from: &HolonId) -> &HolonId {
        if self.relationship.source_holon_id == *from {
            &self.relationship.target_holon_id
        } else {
            &self.relationship.source_holon_id
        }
    }
}

/// Outcome of an edge upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeUpsert {
    /// The edge was written.
    Written,
    /// The edge was skipped because this endpoint is not a node yet.
    MissingEndpoint(HolonId),
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// Storage for the holon graph.
///
/// Writes are upserts keyed by holon and relationship ID. Reads return
/// clones; callers never hold a borrow into the backend.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Provision uniqueness on node and edge IDs and an index on node type.
    /// Idempotent.
    async fn ensure_indexes(&self) -> Result<(), GraphError>;

    /// Remove every node and edge.
    async fn clear(&self) -> Result<(), GraphError>;

    /// Insert or replace a node. Returns `true` if the node is new.
    async fn upsert_node(&self, node: GraphNode) -> Result<bool, GraphError>;

    /// Insert or replace an edge between two existing nodes.
    async fn upsert_edge(&self, edge: GraphEdge) -> Result<EdgeUpsert, GraphError>;

    /// One node.
    async fn node(&self, id: &HolonId) -> Result<Option<GraphNode>, GraphError>;

    /// Every node whose `type` property equals `type_name`, ordered by ID.
    async fn nodes_by_type(&self, type_name: &str) -> Result<Vec<GraphNode>, GraphError>;

    /// Edges incident on `id` in `direction`, optionally of one type,
    /// ordered by relationship ID.
    async fn edges(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<GraphEdge>, GraphError>;

    /// Node and edge counts.
    async fn counts(&self) -> Result<(usize, usize), GraphError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// In-process backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Adjacency {
    nodes: BTreeMap<HolonId, GraphNode>,
    edges: BTreeMap<RelationshipId, GraphEdge>,
    /// Outbound adjacency: node -> edges whose source it is.
    outbound: BTreeMap<HolonId, Vec<RelationshipId>>,
    /// Inbound adjacency: node -> edges whose target it is.
    inbound: BTreeMap<HolonId, Vec<RelationshipId>>,
    /// Type index: `type` property -> nodes.
    by_type: BTreeMap<String, BTreeSet<HolonId>>,
}

impl Adjacency {
    fn unlink_edge(&mut self, edge: &GraphEdge) {
        let id = &edge.relationship.id;
        if let Some(list) = self.outbound.get_mut(&edge.relationship.source_holon_id) {
            list.retain(|rid| rid != id);
        }
        if let Some(list) = self.inbound.get_mut(&edge.relationship.target_holon_id) {
            list.retain(|rid| rid != id);
        }
    }

    fn unindex_type(&mut self, node: &GraphNode) {
        if let Some(ids) = self.by_type.get_mut(node.type_name()) {
            ids.remove(&node.holon.id);
            if ids.is_empty() {
                self.by_type.remove(node.type_name());
            }
        }
    }

    fn incident(&self, id: &HolonId, direction: Direction) -> BTreeSet<&RelationshipId> {
        let mut ids = BTreeSet::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            ids.extend(self.outbound.get(id).into_iter().flatten());
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            ids.extend(self.inbound.get(id).into_iter().flatten());
        }
        ids
    }
}

/// In-process [`GraphBackend`].
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: RwLock<Adjacency>,
}

impl MemoryGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    async fn ensure_indexes(&self) -> Result<(), GraphError> {
        // The ID maps are unique by construction and the type index is
        // maintained on every upsert.
        tracing::debug!("Memory graph indexes ready");
        Ok(())
    }

    async fn clear(&self) -> Result<(), GraphError> {
        *self.inner.write().await = Adjacency::default();
        Ok(())
    }

    async fn upsert_node(&self, node: GraphNode) -> Result<bool, GraphError> {
        let mut graph = self.inner.write().await;
        let id = node.holon.id.clone();
        let previous = graph.nodes.remove(&id);
        if let Some(old) = &previous {
            graph.unindex_type(old);
        }
        graph
            .by_type
            .entry(node.type_name().to_owned())
            .or_default()
            .insert(id.clone());
        graph.outbound.entry(id.clone()).or_default();
        graph.inbound.entry(id.clone()).or_default();
        graph.nodes.insert(id, node);
        Ok(previous.is_none())
    }

    async fn upsert_edge(&self, edge: GraphEdge) -> Result<EdgeUpsert, GraphError> {
        let mut graph = self.inner.write().await;
        let source = edge.relationship.source_holon_id.clone();
        let target = edge.relationship.target_holon_id.clone();
        for endpoint in [&source, &target] {
            if !graph.nodes.contains_key(endpoint) {
                return Ok(EdgeUpsert::MissingEndpoint(endpoint.clone()));
            }
        }

        let id = edge.relationship.id.clone();
        if let Some(old) = graph.edges.remove(&id) {
            graph.unlink_edge(&old);
        }
        graph.outbound.entry(source).or_default().push(id.clone());
        graph.inbound.entry(target).or_default().push(id.clone());
        graph.edges.insert(id, edge);
        Ok(EdgeUpsert::Written)
    }

    async fn node(&self, id: &HolonId) -> Result<Option<GraphNode>, GraphError> {
        Ok(self.inner.read().await.nodes.get(id).cloned())
    }

    async fn nodes_by_type(&self, type_name: &str) -> Result<Vec<GraphNode>, GraphError> {
        let graph = self.inner.read().await;
        Ok(graph
            .by_type
            .get(type_name)
            .into_iter()
            .flatten()
            .filter_map(|id| graph.nodes.get(id))
            .cloned()
            .collect())
    }

    async fn edges(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<GraphEdge>, GraphError> {
        let graph = self.inner.read().await;
        Ok(graph
            .incident(id, direction)
            .into_iter()
            .filter_map(|rid| graph.edges.get(rid))
            .filter(|edge| {
                relationship_type.is_none_or(|kind| edge.relationship.relationship_type == kind)
            })
            .cloned()
            .collect())
    }

    async fn counts(&self) -> Result<(usize, usize), GraphError> {
        let graph = self.inner.read().await;
        Ok((graph.nodes.len(), graph.edges.len()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use holon_types::{AuthorityLevel, EventId, HolonStatus, HolonType, PropertyMap};

    use super::*;

    fn node(id: &str, holon_type: HolonType) -> GraphNode {
        GraphNode::from_holon(Holon {
            id: id.into(),
            holon_type,
            properties: PropertyMap::new(),
            status: HolonStatus::Active,
            created_at: Utc::now(),
            created_by: EventId::new(),
            source_documents: Vec::new(),
        })
    }

    fn edge(id: &str, kind: &str, source: &str, target: &str) -> GraphEdge {
        GraphEdge::from_relationship(Relationship {
            id: id.into(),
            relationship_type: kind.to_owned(),
            source_holon_id: source.into(),
            target_holon_id: target.into(),
            properties: PropertyMap::new(),
            effective_start: Utc::now(),
            effective_end: None,
            authority_level: AuthorityLevel::Authoritative,
            confidence_score: None,
            source_system: "test".to_owned(),
            created_by: EventId::new(),
        })
    }

    async fn edge_ids(
        graph: &MemoryGraph,
        id: &str,
        kind: Option<&str>,
        direction: Direction,
    ) -> Vec<String> {
        graph
            .edges(&id.into(), kind, direction)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.relationship.id.0)
            .collect()
    }

    #[tokio::test]
    async fn edges_need_both_endpoints() {
        let graph = MemoryGraph::new();
        let _ = graph.upsert_node(node("team", HolonType::Team)).await;
        let outcome = graph.upsert_edge(edge("r1", "part_of", "team", "org")).await;
        assert_eq!(
            outcome.ok(),
            Some(EdgeUpsert::MissingEndpoint(HolonId::from("org")))
        );

        let _ = graph.upsert_node(node("org", HolonType::Organization)).await;
        let outcome = graph.upsert_edge(edge("r1", "part_of", "team", "org")).await;
        assert_eq!(outcome.ok(), Some(EdgeUpsert::Written));
        assert_eq!(graph.counts().await.ok(), Some((2, 1)));
    }

    #[tokio::test]
    async fn direction_and_type_select_edges() {
        let graph = MemoryGraph::new();
        for (id, t) in [
            ("org", HolonType::Organization),
            ("team", HolonType::Team),
            ("pos", HolonType::Position),
        ] {
            let _ = graph.upsert_node(node(id, t)).await;
        }
        let _ = graph.upsert_edge(edge("r1", "part_of", "team", "org")).await;
        let _ = graph.upsert_edge(edge("r2", "belongs_to", "pos", "team")).await;

        assert_eq!(
            edge_ids(&graph, "team", None, Direction::Outgoing).await,
            ["r1"]
        );
        assert_eq!(
            edge_ids(&graph, "team", None, Direction::Incoming).await,
            ["r2"]
        );
        assert_eq!(
            edge_ids(&graph, "team", None, Direction::Both).await,
            ["r1", "r2"]
        );
        assert!(
            edge_ids(&graph, "team", Some("belongs_to"), Direction::Outgoing)
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn upsert_replaces_without_duplicating() {
        let graph = MemoryGraph::new();
        assert_eq!(graph.upsert_node(node("a", HolonType::Team)).await.ok(), Some(true));
        assert_eq!(graph.upsert_node(node("b", HolonType::Team)).await.ok(), Some(true));
        assert_eq!(graph.upsert_node(node("a", HolonType::Team)).await.ok(), Some(false));

        let _ = graph.upsert_edge(edge("r", "part_of", "a", "b")).await;
        let _ = graph.upsert_edge(edge("r", "part_of", "a", "b")).await;
        assert_eq!(edge_ids(&graph, "a", None, Direction::Outgoing).await, ["r"]);

        // Moving an edge unlinks it from its old endpoints.
        let _ = graph.upsert_edge(edge("r", "part_of", "b", "a")).await;
        assert!(edge_ids(&graph, "a", None, Direction::Outgoing).await.is_empty());
        assert_eq!(edge_ids(&graph, "a", None, Direction::Incoming).await, ["r"]);
    }

    #[tokio::test]
    async fn type_index_follows_type_changes() {
        let graph = MemoryGraph::new();
        let _ = graph.upsert_node(node("x", HolonType::Team)).await;
        let _ = graph
            .upsert_node(node("x", HolonType::Custom("Working Group".to_owned())))
            .await;
        assert!(graph.nodes_by_type("Team").await.unwrap_or_default().is_empty());

        let custom = graph.nodes_by_type("Working Group").await.unwrap_or_default();
        assert_eq!(custom.len(), 1);
        assert_eq!(custom.first().and_then(|n| n.label.clone()), None);
    }

    #[tokio::test]
    async fn clear_empties_everything() {
        let graph = MemoryGraph::new();
        let _ = graph.upsert_node(node("a", HolonType::Team)).await;
        let _ = graph.clear().await;
        assert_eq!(graph.counts().await.ok(), Some((0, 0)));
        assert!(graph.nodes_by_type("Team").await.unwrap_or_default().is_empty());
    }
}
