//! Multi-hop structural queries.
//!
//! A [`Pattern`] is a start selector followed by a chain of hops, each one
//! naming an edge constraint and a selector for the node it reaches. Matching
//! expands level by level over simple paths: no node appears twice in one
//! match. This is a fixed-shape matcher, not a query language.
//!
//! ```text
//! (Person) -occupies-> (Position) -belongs_to-> (Team {name: "Core"})
//! ```

use holon_types::{Direction, Holon, HolonId, HolonType, Relationship};
use serde::{Deserialize, Serialize};

use crate::backend::{GraphBackend, GraphNode};
use crate::error::GraphError;
use crate::filter::{HolonFilter, RelationshipFilter};

/// Longest hop chain accepted.
pub const MAX_HOPS: usize = 8;

/// Constraints on one node position in a pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    /// Exact holon.
    pub id: Option<HolonId>,
    /// Holon type.
    pub holon_type: Option<HolonType>,
    /// Status and property constraints.
    #[serde(default)]
    pub filter: HolonFilter,
}

impl NodeSelector {
    /// Select one holon by ID.
    pub fn id(id: impl Into<HolonId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Select holons of one type.
    pub fn of_type(holon_type: HolonType) -> Self {
        Self {
            holon_type: Some(holon_type),
            ..Self::default()
        }
    }

    /// Replace the holon filter.
    #[must_use]
    pub fn with_filter(mut self, filter: HolonFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Whether `holon` satisfies the selector.
    pub fn matches(&self, holon: &Holon) -> bool {
        self.id.as_ref().is_none_or(|id| holon.id == *id)
            && self
                .holon_type
                .as_ref()
                .is_none_or(|t| holon.holon_type == *t)
            && self.filter.matches(holon)
    }
}

/// One edge step plus the node it must reach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hop {
    /// Edge type; any type when absent.
    pub relationship_type: Option<String>,
    /// Which way the edge must point relative to the previous node.
    #[serde(default)]
    pub direction: Direction,
    /// Edge constraints.
    #[serde(default)]
    pub relationship_filter: RelationshipFilter,
    /// Constraints on the reached node.
    #[serde(default)]
    pub node: NodeSelector,
}

impl Hop {
    /// An outgoing hop over `relationship_type` to any node.
    pub fn outgoing(relationship_type: &str) -> Self {
        Self {
            relationship_type: Some(relationship_type.to_owned()),
            ..Self::default()
        }
    }

    /// An incoming hop over `relationship_type` to any node.
    pub fn incoming(relationship_type: &str) -> Self {
        Self {
            relationship_type: Some(relationship_type.to_owned()),
            direction: Direction::Incoming,
            ..Self::default()
        }
    }

    /// Constrain the reached node.
    #[must_use]
    pub fn to(mut self, node: NodeSelector) -> Self {
        self.node = node;
        self
    }

    /// Constrain the edge.
    #[must_use]
    pub fn with_filter(mut self, filter: RelationshipFilter) -> Self {
        self.relationship_filter = filter;
        self
    }
}

/// A structural query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    /// Where matches begin. Must name an ID or a type.
    pub start: NodeSelector,
    /// The hop chain, at most [`MAX_HOPS`] long.
    #[serde(default)]
    pub hops: Vec<Hop>,
    /// Stop after this many matches.
    pub limit: Option<usize>,
}

impl Pattern {
    /// A pattern beginning at `start`.
    pub const fn starting_at(start: NodeSelector) -> Self {
        Self {
            start,
            hops: Vec::new(),
            limit: None,
        }
    }

    /// Append a hop.
    #[must_use]
    pub fn then(mut self, hop: Hop) -> Self {
        self.hops.push(hop);
        self
    }

    /// Cap the number of matches.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject patterns that are unanchored or longer than [`MAX_HOPS`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidQuery`] describing the problem.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.start.id.is_none() && self.start.holon_type.is_none() {
            return Err(GraphError::InvalidQuery(
                "pattern start must name an id or a holon type".to_owned(),
            ));
        }
        if self.hops.len() > MAX_HOPS {
            return Err(GraphError::InvalidQuery(format!(
                "pattern has {} hops, at most {MAX_HOPS} allowed",
                self.hops.len()
            )));
        }
        Ok(())
    }
}

/// One match: `holons` has one more element than `relationships`, and
/// `relationships[i]` joins `holons[i]` to `holons[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMatch {
    /// Nodes along the path.
    pub holons: Vec<Holon>,
    /// Edges along the path.
    pub relationships: Vec<Relationship>,
}

impl PathMatch {
    fn last_id(&self) -> Option<&HolonId> {
        self.holons.last().map(|h| &h.id)
    }

    fn visits(&self, id: &HolonId) -> bool {
        self.holons.iter().any(|h| h.id == *id)
    }
}

/// Match `pattern` against `backend`.
///
/// # Errors
///
/// Returns [`GraphError::InvalidQuery`] for an unanchored or overlong
/// pattern, or the backend's error.
pub async fn match_pattern(
    backend: &dyn GraphBackend,
    pattern: &Pattern,
) -> Result<Vec<PathMatch>, GraphError> {
    pattern.validate()?;
    let limit = pattern.limit.unwrap_or(usize::MAX);
    if limit == 0 {
        return Ok(Vec::new());
    }

    let starts: Vec<GraphNode> = match (&pattern.start.id, &pattern.start.holon_type) {
        (Some(id), _) => backend.node(id).await?.into_iter().collect(),
        (None, Some(holon_type)) => backend.nodes_by_type(holon_type.as_str()).await?,
        (None, None) => Vec::new(),
    };

    let mut paths: Vec<PathMatch> = starts
        .into_iter()
        .filter(|node| pattern.start.matches(&node.holon))
        .map(|node| PathMatch {
            holons: vec![node.holon],
            relationships: Vec::new(),
        })
        .collect();

    for (depth, hop) in pattern.hops.iter().enumerate() {
        let last_level = depth.saturating_add(1) == pattern.hops.len();
        let mut next = Vec::new();
        'paths: for path in &paths {
            let Some(from) = path.last_id() else {
                continue;
            };
            let edges = backend
                .edges(from, hop.relationship_type.as_deref(), hop.direction)
                .await?;
            for edge in edges {
                if !hop.relationship_filter.matches(&edge.relationship) {
                    continue;
                }
                let to = edge.other_end(from);
                if path.visits(to) {
                    continue;
                }
                let Some(node) = backend.node(to).await? else {
                    continue;
                };
                if !hop.node.matches(&node.holon) {
                    continue;
                }
                let mut extended = path.clone();
                extended.holons.push(node.holon);
                extended.relationships.push(edge.relationship);
                next.push(extended);
                if last_level && next.len() >= limit {
                    break 'paths;
                }
            }
        }
        paths = next;
        if paths.is_empty() {
            break;
        }
    }

    paths.truncate(limit);
    tracing::debug!(
        hops = pattern.hops.len(),
        matches = paths.len(),
        "Pattern matched"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use holon_types::{AuthorityLevel, EventId, HolonStatus, PropertyMap};
    use serde_json::json;

    use super::*;
    use crate::backend::{GraphEdge, MemoryGraph};

    fn holon(id: &str, holon_type: HolonType, name: &str) -> GraphNode {
        GraphNode::from_holon(Holon {
            id: id.into(),
            holon_type,
            properties: [("name".to_owned(), json!(name))].into_iter().collect(),
            status: HolonStatus::Active,
            created_at: Utc::now(),
            created_by: EventId::new(),
            source_documents: Vec::new(),
        })
    }

    fn rel(id: &str, kind: &str, source: &str, target: &str) -> GraphEdge {
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

    /// alice -occupies-> eng-lead -belongs_to-> core -part_of-> acme
    /// bob   -occupies-> ops-lead -belongs_to-> ops  -part_of-> acme
    async fn org() -> MemoryGraph {
        let graph = MemoryGraph::new();
        for node in [
            holon("alice", HolonType::Person, "Alice"),
            holon("bob", HolonType::Person, "Bob"),
            holon("eng-lead", HolonType::Position, "Eng Lead"),
            holon("ops-lead", HolonType::Position, "Ops Lead"),
            holon("core", HolonType::Team, "Core"),
            holon("ops", HolonType::Team, "Ops"),
            holon("acme", HolonType::Organization, "Acme"),
        ] {
            let _ = graph.upsert_node(node).await;
        }
        for edge in [
            rel("r1", "occupies", "alice", "eng-lead"),
            rel("r2", "occupies", "bob", "ops-lead"),
            rel("r3", "belongs_to", "eng-lead", "core"),
            rel("r4", "belongs_to", "ops-lead", "ops"),
            rel("r5", "part_of", "core", "acme"),
            rel("r6", "part_of", "ops", "acme"),
        ] {
            let _ = graph.upsert_edge(edge).await;
        }
        graph
    }

    fn ids(path: &PathMatch) -> Vec<&str> {
        path.holons.iter().map(|h| h.id.as_str()).collect()
    }

    #[tokio::test]
    async fn two_hop_pattern_with_target_filter() {
        let graph = org().await;
        let pattern = Pattern::starting_at(NodeSelector::of_type(HolonType::Person))
            .then(Hop::outgoing("occupies"))
            .then(Hop::outgoing("belongs_to").to(
                NodeSelector::of_type(HolonType::Team)
                    .with_filter(HolonFilter::default().with_property("name", json!("Core"))),
            ));
        let matches = match_pattern(&graph, &pattern).await.unwrap_or_default();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches.first().map(ids),
            Some(vec!["alice", "eng-lead", "core"])
        );
        assert_eq!(matches.first().map(|m| m.relationships.len()), Some(2));
    }

    #[tokio::test]
    async fn incoming_hops_and_limit() {
        let graph = org().await;
        let pattern = Pattern::starting_at(NodeSelector::id("acme"))
            .then(Hop::incoming("part_of"))
            .then(Hop::incoming("belongs_to"));
        let all = match_pattern(&graph, &pattern).await.unwrap_or_default();
        assert_eq!(all.len(), 2);

        let one = match_pattern(&graph, &pattern.limit(1)).await.unwrap_or_default();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn paths_never_revisit_a_node() {
        let graph = org().await;
        // core -part_of-> acme <-part_of- ops would be fine, but
        // core -> acme -> core must not be produced.
        let pattern = Pattern::starting_at(NodeSelector::id("core"))
            .then(Hop {
                direction: Direction::Both,
                ..Hop::default()
            })
            .then(Hop {
                direction: Direction::Both,
                ..Hop::default()
            });
        let matches = match_pattern(&graph, &pattern).await.unwrap_or_default();
        assert!(!matches.is_empty());
        for m in &matches {
            let path = ids(m);
            assert_ne!(path.first(), path.last(), "cycle in {path:?}");
        }
    }

    #[tokio::test]
    async fn unanchored_and_overlong_patterns_are_rejected() {
        let graph = MemoryGraph::new();
        let unanchored = Pattern::default();
        assert!(matches!(
            match_pattern(&graph, &unanchored).await,
            Err(GraphError::InvalidQuery(_))
        ));

        let mut long = Pattern::starting_at(NodeSelector::id("x"));
        long.hops = vec![Hop::default(); MAX_HOPS + 1];
        assert!(matches!(
            match_pattern(&graph, &long).await,
            Err(GraphError::InvalidQuery(_))
        ));
    }
}
