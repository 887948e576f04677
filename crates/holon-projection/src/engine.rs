//! The state projection engine.
//!
//! [`ProjectionEngine`] owns the write side of the current projection: full
//! replay and incremental apply. Reads go through [`ProjectionReader`],
//! which shares the same snapshot behind a [`RwLock`]. A replay builds its
//! new snapshot without holding the lock and only takes it for the final
//! swap, so readers never wait on a replay.
//!
//! Mutating methods take `&mut self`; when the engine is shared across
//! tasks it is owned by the coordinator (see [`crate::coordinator`]).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use holon_db::{EventFilter, EventStore};
use holon_types::{
    CalendarEventView, Event, EventId, HolonId, HolonState, HolonType, ProjectedState,
    RelationshipId, RelationshipState,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

use crate::error::ProjectionError;
use crate::fold::{FoldMode, Placement, ProjectionSnapshot};

/// Capacity of the applied-event broadcast channel.
///
/// A subscriber that falls behind by more than this many events receives
/// [`broadcast::error::RecvError::Lagged`] and skips ahead.
const BROADCAST_CAPACITY: usize = 1024;

/// Counts reported after a full replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Events read from the store.
    pub events: usize,
    /// Holons in the resulting state.
    pub holons: usize,
    /// Relationships in the resulting state.
    pub relationships: usize,
    /// Calendar entries in the resulting index.
    pub calendar_entries: usize,
    /// The resulting state's `as_of_timestamp`.
    pub as_of: DateTime<Utc>,
}

impl ReplaySummary {
    fn of(snapshot: &ProjectionSnapshot, events: usize) -> Self {
        Self {
            events,
            holons: snapshot.state.holons.len(),
            relationships: snapshot.state.relationships.len(),
            calendar_entries: snapshot.calendar.len(),
            as_of: snapshot.state.as_of_timestamp,
        }
    }
}

/// Fold the log as it stood at `at` into a fresh snapshot.
///
/// Events after `at`, and events whose validity window excludes `at`, are
/// skipped. The live projection is not touched.
///
/// # Errors
///
/// Returns [`ProjectionError`] if the store fails or an event is corrupt.
pub async fn replay_as_of(
    store: &dyn EventStore,
    at: DateTime<Utc>,
) -> Result<ProjectionSnapshot, ProjectionError> {
    let filter = EventFilter::default().with_time_range(None, Some(at));
    let events = store.query(&filter).await?;
    Ok(ProjectionSnapshot::fold(&events, FoldMode::AsOf(at), at))
}

/// The write side of the current projection.
pub struct ProjectionEngine {
    store: Arc<dyn EventStore>,
    current: Arc<RwLock<ProjectionSnapshot>>,
    applied: broadcast::Sender<Event>,
    /// Set when a replay triggered by a back-dated event failed: the live
    /// projection is missing at least one persisted event.
    behind: bool,
}

impl ProjectionEngine {
    /// Create an engine with an empty projection. Call
    /// [`replay_all`](Self::replay_all) to load the log.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        let (applied, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            store,
            current: Arc::new(RwLock::new(ProjectionSnapshot::empty(Utc::now()))),
            applied,
            behind: false,
        }
    }

    /// The event store this engine replays from.
    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    /// A cloneable read handle on the current projection.
    pub fn reader(&self) -> ProjectionReader {
        ProjectionReader {
            current: Arc::clone(&self.current),
        }
    }

    /// Sender side of the applied-event channel.
    pub fn applied_sender(&self) -> broadcast::Sender<Event> {
        self.applied.clone()
    }

    /// Receive every event applied from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.applied.subscribe()
    }

    /// Reset and fold every event in the store.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails or an event is corrupt;
    /// the current projection is left unchanged in that case.
    pub async fn replay_all(&mut self) -> Result<ReplaySummary, ProjectionError> {
        let events = self.store.get_all().await?;
        let snapshot = ProjectionSnapshot::fold(&events, FoldMode::Current, Utc::now());
        let summary = ReplaySummary::of(&snapshot, events.len());

        *self.current.write().await = snapshot;
        self.behind = false;

        tracing::info!(
            backend = self.store.backend_name(),
            events = summary.events,
            holons = summary.holons,
            relationships = summary.relationships,
            calendar_entries = summary.calendar_entries,
            "Projection replayed"
        );
        Ok(summary)
    }

    /// Fold one newly persisted event into the current projection.
    ///
    /// An event that sorts before one already applied (a late, back-dated
    /// submission) triggers a full replay instead, so the result always
    /// equals a replay of the whole log. An event a replay already folded
    /// in as its latest is not applied twice.
    ///
    /// If that replay fails the engine is left behind the log, and every
    /// later apply replays until one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] only when a triggered replay fails.
    pub async fn apply_new(&mut self, event: &Event) -> Result<(), ProjectionError> {
        let placement = if self.behind {
            Placement::Late
        } else {
            self.current.read().await.placement(event)
        };
        match placement {
            Placement::Next => {
                let mut current = self.current.write().await;
                current.apply(event);
                current.state.as_of_timestamp = Utc::now();
            }
            Placement::Late => {
                tracing::info!(
                    event_id = %event.id,
                    occurred_at = %event.occurred_at,
                    behind = self.behind,
                    "Projection out of order with the log, replaying"
                );
                if let Err(e) = self.replay_all().await {
                    self.behind = true;
                    tracing::error!(
                        event_id = %event.id,
                        error = %e,
                        "Replay failed, projection is behind the log"
                    );
                    return Err(e);
                }
            }
            Placement::Duplicate => {
                tracing::debug!(event_id = %event.id, "Event already folded in by replay");
                return Ok(());
            }
        }

        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Applied event");
        // No receivers is normal.
        let _ = self.applied.send(event.clone());
        Ok(())
    }

    /// Fold the log as it stood at `at`. See [`replay_as_of`].
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails or an event is corrupt.
    pub async fn replay_as_of(&self, at: DateTime<Utc>) -> Result<ProjectedState, ProjectionError> {
        Ok(replay_as_of(self.store.as_ref(), at).await?.state)
    }

    /// Current state of one holon.
    pub async fn get_holon_state(&self, id: &HolonId) -> Option<HolonState> {
        self.reader().holon_state(id).await
    }

    /// Current state of one relationship.
    pub async fn get_relationship_state(&self, id: &RelationshipId) -> Option<RelationshipState> {
        self.reader().relationship_state(id).await
    }
}

/// Concurrent read access to the current projection.
#[derive(Clone)]
pub struct ProjectionReader {
    current: Arc<RwLock<ProjectionSnapshot>>,
}

impl ProjectionReader {
    /// One holon.
    pub async fn holon_state(&self, id: &HolonId) -> Option<HolonState> {
        self.current.read().await.state.holons.get(id).cloned()
    }

    /// One relationship.
    pub async fn relationship_state(&self, id: &RelationshipId) -> Option<RelationshipState> {
        self.current.read().await.state.relationships.get(id).cloned()
    }

    /// Event IDs that touched a holon, in replay order.
    pub async fn holon_history(&self, id: &HolonId) -> Option<Vec<EventId>> {
        self.current
            .read()
            .await
            .state
            .holons
            .get(id)
            .map(|entry| entry.modification_events.clone())
    }

    /// Event IDs that touched a relationship, in replay order.
    pub async fn relationship_history(&self, id: &RelationshipId) -> Option<Vec<EventId>> {
        self.current
            .read()
            .await
            .state
            .relationships
            .get(id)
            .map(|entry| entry.modification_events.clone())
    }

    /// Every holon of one type, ordered by ID.
    pub async fn holons_by_type(&self, holon_type: &HolonType) -> Vec<HolonState> {
        self.current
            .read()
            .await
            .state
            .holons
            .values()
            .filter(|entry| entry.holon.holon_type == *holon_type)
            .cloned()
            .collect()
    }

    /// Relationships with `id` as source or target.
    pub async fn relationships_touching(&self, id: &HolonId) -> Vec<RelationshipState> {
        self.current
            .read()
            .await
            .state
            .relationships
            .values()
            .filter(|entry| {
                entry.relationship.source_holon_id == *id
                    || entry.relationship.target_holon_id == *id
            })
            .cloned()
            .collect()
    }

    /// A copy of the whole current state.
    pub async fn state(&self) -> ProjectedState {
        self.current.read().await.state.clone()
    }

    /// The instant the current state describes.
    pub async fn as_of(&self) -> DateTime<Utc> {
        self.current.read().await.state.as_of_timestamp
    }

    /// Active calendar entries naming `participant` that overlap
    /// `[start, end]`.
    pub async fn calendar_conflicts(
        &self,
        participant: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<CalendarEventView> {
        self.current
            .read()
            .await
            .calendar
            .active_overlapping(participant, start, end)
    }

    /// One calendar entry.
    pub async fn calendar_entry(&self, id: &EventId) -> Option<CalendarEventView> {
        self.current.read().await.calendar.get(id).cloned()
    }
}
