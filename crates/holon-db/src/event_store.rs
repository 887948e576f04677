//! The append-only event store contract.
//!
//! Events are the source of truth for every projected holon and
//! relationship. The store assigns each event an ID and a `recorded_at`
//! timestamp, persists it, and never rejects it on domain grounds.
//!
//! Three implementations share the same filter and ordering semantics:
//!
//! - [`crate::PgEventStore`] -- server-backed, multi-writer
//! - [`crate::SqliteEventStore`] -- embedded single file
//! - [`MemoryEventStore`] -- in-process, for tests and ephemeral use
//!
//! Ordering is `occurred_at`, then `recorded_at`, then `id`, so replay is
//! deterministic even when events with the same business timestamp were
//! submitted out of order.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use holon_types::{CausalLinks, Event, EventId, EventType, NewEvent, ValidityWindow};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DbError;

/// Operations on the event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event, returning it with its assigned ID and
    /// `recorded_at`.
    async fn append(&self, event: NewEvent) -> Result<Event, DbError>;

    /// Persist a new event, returning only its ID.
    async fn submit(&self, event: NewEvent) -> Result<EventId, DbError> {
        Ok(self.append(event).await?.id)
    }

    /// Fetch one event.
    async fn get(&self, id: EventId) -> Result<Option<Event>, DbError>;

    /// Events matching `filter`, in replay order.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, DbError>;

    /// Every event, in replay order.
    async fn get_all(&self) -> Result<Vec<Event>, DbError> {
        self.query(&EventFilter::default()).await
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Inclusive range over `occurred_at`. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest `occurred_at`.
    pub start: Option<DateTime<Utc>>,
    /// Latest `occurred_at`.
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= at) && self.end.is_none_or(|end| at <= end)
    }
}

/// Criteria for [`EventStore::query`]. Every set criterion must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Accepted event types.
    pub types: Option<Vec<EventType>>,
    /// Exact actor.
    pub actor: Option<String>,
    /// Matches when any of these appears anywhere in the event's subjects.
    pub subjects: Option<Vec<String>>,
    /// Range over `occurred_at`.
    pub time_range: Option<TimeRange>,
}

impl EventFilter {
    /// Restrict to the given event types.
    #[must_use]
    pub fn with_types(mut self, types: Vec<EventType>) -> Self {
        self.types = Some(types);
        self
    }

    /// Restrict to one actor.
    #[must_use]
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_owned());
        self
    }

    /// Restrict to events naming any of `subjects`.
    #[must_use]
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects = Some(subjects.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict `occurred_at` to a range.
    #[must_use]
    pub const fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    /// Whether a criterion is an explicitly empty list, which no event can
    /// satisfy.
    pub fn is_unsatisfiable(&self) -> bool {
        self.types.as_ref().is_some_and(Vec::is_empty)
            || self.subjects.as_ref().is_some_and(Vec::is_empty)
    }

    /// Subject containment check, applied by every backend after the
    /// database-side filtering.
    pub fn matches_subjects(&self, event: &Event) -> bool {
        self.subjects.as_ref().is_none_or(|wanted| {
            event
                .subjects
                .iter()
                .any(|subject| wanted.iter().any(|w| w == subject))
        })
    }

    /// Full in-process evaluation of the filter.
    pub fn matches(&self, event: &Event) -> bool {
        self.types
            .as_ref()
            .is_none_or(|types| types.contains(&event.event_type))
            && self
                .actor
                .as_ref()
                .is_none_or(|actor| *actor == event.actor)
            && self
                .time_range
                .as_ref()
                .is_none_or(|range| range.contains(event.occurred_at))
            && self.matches_subjects(event)
    }
}

/// Assign an ID and `recorded_at`, truncating timestamps to microseconds so
/// that every backend round-trips the event unchanged.
pub fn stamp(event: NewEvent) -> Event {
    let recorded_at = Utc::now().trunc_subsecs(6);
    let mut event = event.into_event(EventId::new(), recorded_at);
    event.occurred_at = event.occurred_at.trunc_subsecs(6);
    event.validity_window = event.validity_window.map(|window| ValidityWindow {
        start: window.start.map(|t| t.trunc_subsecs(6)),
        end: window.end.map(|t| t.trunc_subsecs(6)),
    });
    event
}

/// Sort into replay order.
pub fn sort_for_replay(events: &mut [Event]) {
    events.sort_by_key(Event::replay_key);
}

// =========================================================================
// Row decoding shared by the SQL backends
// =========================================================================

/// An `events` row with its JSON columns still serialized.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Event identifier.
    pub id: uuid::Uuid,
    /// Event type tag.
    pub event_type: String,
    /// Business timestamp.
    pub occurred_at: DateTime<Utc>,
    /// System timestamp.
    pub recorded_at: DateTime<Utc>,
    /// Actor.
    pub actor: String,
    /// JSON array of subject IDs.
    pub subjects: String,
    /// JSON payload.
    pub payload: String,
    /// JSON map of causal links.
    pub causal_links: Option<String>,
    /// Originating system.
    pub source_system: String,
    /// Source document.
    pub source_document: Option<String>,
    /// JSON validity window.
    pub validity_window: Option<String>,
}

impl TryFrom<RawEvent> for Event {
    type Error = DbError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let id = raw.id.to_string();
        let subjects: Vec<String> = serde_json::from_str(&raw.subjects)
            .map_err(|e| DbError::corrupt(&id, format!("subjects: {e}")))?;
        let payload: serde_json::Value = serde_json::from_str(&raw.payload)
            .map_err(|e| DbError::corrupt(&id, format!("payload: {e}")))?;
        let causal_links: Option<CausalLinks> = raw
            .causal_links
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::corrupt(&id, format!("causal_links: {e}")))?;
        let validity_window: Option<ValidityWindow> = raw
            .validity_window
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::corrupt(&id, format!("validity_window: {e}")))?;

        Ok(Self {
            id: EventId(raw.id),
            event_type: EventType::from_tag(&raw.event_type),
            occurred_at: raw.occurred_at,
            recorded_at: raw.recorded_at,
            actor: raw.actor,
            subjects,
            payload,
            source_system: raw.source_system,
            source_document: raw.source_document,
            validity_window,
            causal_links,
        })
    }
}

/// Decode rows in order, aborting on the first corrupt one, then apply the
/// subject post-filter.
pub fn decode_rows<I>(rows: I, filter: &EventFilter) -> Result<Vec<Event>, DbError>
where
    I: IntoIterator<Item = RawEvent>,
{
    let mut events = Vec::new();
    for row in rows {
        let event = Event::try_from(row)?;
        if filter.matches_subjects(&event) {
            events.push(event);
        }
    }
    Ok(events)
}

// =========================================================================
// In-memory store
// =========================================================================

/// Event store held entirely in process memory.
///
/// Same contract as the SQL stores; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event, DbError> {
        let event = stamp(event);
        self.events.write().await.push(event.clone());
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Appended event (memory)");
        Ok(event)
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, DbError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .find(|event| event.id == id)
            .cloned())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, DbError> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        sort_for_replay(&mut events);
        Ok(events)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
