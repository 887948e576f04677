//! Hierarchical availability.
//!
//! A holon is busy when an active calendar entry names it (a direct
//! conflict) or names one of its organizational ancestors (an inherited
//! conflict). Ancestors are found by walking outgoing, in-force hierarchy
//! edges level by level. Every lookup at one level is issued at once, a
//! visited set stops cycles, and the walk ends at a fixed depth.
//!
//! ```text
//! person -occupies-> position -belongs_to-> team -part_of-> org
//!                                   depth 1          depth 2
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use holon_projection::ProjectionReader;
use holon_types::{
    AvailabilityReport, CalendarEventView, Conflict, ConflictReason, Direction, HolonId,
    relationship_types,
};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::filter::RelationshipFilter;
use crate::graph::HolonGraph;

/// Default ancestor depth.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Where calendar entries come from.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Active entries naming `participant` that overlap `[start, end]`.
    async fn active_conflicts(
        &self,
        participant: &HolonId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventView>, GraphError>;
}

#[async_trait]
impl CalendarSource for ProjectionReader {
    async fn active_conflicts(
        &self,
        participant: &HolonId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventView>, GraphError> {
        Ok(self
            .calendar_conflicts(participant.as_str(), start, end)
            .await)
    }
}

/// Ancestor traversal settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    /// Relationship types that point from a holon to its parent.
    pub hierarchy_types: Vec<String>,
    /// Maximum number of levels to climb.
    pub max_depth: usize,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            hierarchy_types: relationship_types::HIERARCHY
                .iter()
                .map(|&kind| kind.to_owned())
                .collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Computes direct and inherited scheduling conflicts.
pub struct AvailabilityResolver {
    graph: Arc<dyn HolonGraph>,
    calendar: Arc<dyn CalendarSource>,
    config: AvailabilityConfig,
}

impl AvailabilityResolver {
    /// Create a resolver over a graph (for hierarchy edges) and a calendar.
    pub fn new(
        graph: Arc<dyn HolonGraph>,
        calendar: Arc<dyn CalendarSource>,
        config: AvailabilityConfig,
    ) -> Self {
        Self {
            graph,
            calendar,
            config,
        }
    }

    /// Ancestors of `id`, nearest first, each listed once.
    ///
    /// # Errors
    ///
    /// Returns the graph's error if any traversal fails.
    pub async fn ancestors(&self, id: &HolonId) -> Result<Vec<HolonId>, GraphError> {
        let filter = &RelationshipFilter::in_force();
        let mut visited = BTreeSet::from([id.clone()]);
        let mut frontier = vec![id.clone()];
        let mut found = Vec::new();

        for depth in 1..=self.config.max_depth {
            if frontier.is_empty() {
                break;
            }
            let lookups = frontier.iter().flat_map(|node| {
                self.config.hierarchy_types.iter().map(move |kind| {
                    self.graph.traverse_relationships(
                        node,
                        Some(kind.as_str()),
                        Direction::Outgoing,
                        filter,
                    )
                })
            });
            let levels = try_join_all(lookups).await?;

            let mut next = Vec::new();
            for relationship in levels.into_iter().flatten() {
                let parent = relationship.target_holon_id;
                if visited.insert(parent.clone()) {
                    found.push(parent.clone());
                    next.push(parent);
                }
            }
            tracing::trace!(holon_id = %id, depth, discovered = next.len(), "Ancestor level");
            frontier = next;
        }
        Ok(found)
    }

    /// Check whether `holon_id` is free over `[start, end]`.
    ///
    /// Conflicts are ordered by start time. An entry reachable both
    /// directly and through an ancestor is reported once, as direct.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidQuery`] if `end` precedes `start`, or
    /// the graph's or calendar's error.
    pub async fn check_availability(
        &self,
        holon_id: &HolonId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AvailabilityReport, GraphError> {
        if end < start {
            return Err(GraphError::InvalidQuery(format!(
                "availability window ends ({end}) before it starts ({start})"
            )));
        }

        let ancestors = self.ancestors(holon_id).await?;
        let sources: Vec<(&HolonId, ConflictReason)> =
            std::iter::once((holon_id, ConflictReason::Direct))
                .chain(ancestors.iter().map(|a| (a, ConflictReason::Inherited)))
                .collect();
        let found = try_join_all(
            sources
                .iter()
                .map(|(source, _)| self.calendar.active_conflicts(source, start, end)),
        )
        .await?;

        let mut seen = BTreeSet::new();
        let mut conflicts = Vec::new();
        for ((source, reason), entries) in sources.iter().zip(found) {
            for entry in entries {
                if !seen.insert(entry.id) {
                    continue;
                }
                conflicts.push(Conflict {
                    calendar_event_id: entry.id,
                    title: entry.title,
                    start_time: entry.start_time,
                    end_time: entry.end_time,
                    reason: *reason,
                    source_id: (*source).clone(),
                });
            }
        }
        conflicts.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.calendar_event_id.cmp(&b.calendar_event_id))
        });

        tracing::debug!(
            holon_id = %holon_id,
            ancestors = ancestors.len(),
            conflicts = conflicts.len(),
            "Availability checked"
        );
        Ok(AvailabilityReport {
            available: conflicts.is_empty(),
            conflicts,
        })
    }
}
