//! Core structs: events, projected holons and relationships, projected
//! state, calendar views, and availability results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    AuthorityLevel, CalendarStatus, ConflictReason, EventType, HolonStatus, HolonType,
};
use crate::ids::{EventId, HolonId, RelationshipId};

/// Open key/value property bag, shallow-merged across modification events.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Named causal links from an event to the events that caused it
/// (for example `corrects` -> the event being corrected).
pub type CausalLinks = BTreeMap<String, Vec<EventId>>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A time range outside which an event's effect is not in force.
///
/// Either bound may be open. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ValidityWindow {
    /// First instant the effect is in force.
    pub start: Option<DateTime<Utc>>,
    /// Last instant the effect is in force.
    pub end: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    /// A closed window `[start, end]`.
    pub const fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= at) && self.end.is_none_or(|end| at <= end)
    }
}

/// An immutable, persisted domain fact.
///
/// Events are the single source of truth. State is reconstructed by
/// replaying the log ordered by `occurred_at`, then `recorded_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Store-assigned identifier.
    pub id: EventId,
    /// The category of event.
    #[ts(type = "string")]
    pub event_type: EventType,
    /// Business timestamp supplied by the caller.
    pub occurred_at: DateTime<Utc>,
    /// System timestamp assigned by the store.
    pub recorded_at: DateTime<Utc>,
    /// Who (or what) asserted the fact.
    pub actor: String,
    /// Entity IDs the event concerns; `subjects[0]` is the primary target.
    pub subjects: Vec<String>,
    /// Event-type-specific structured data.
    pub payload: serde_json::Value,
    /// System the event originated from.
    pub source_system: String,
    /// Document the fact was extracted from, if any.
    pub source_document: Option<String>,
    /// Window restricting when the effect is in force.
    pub validity_window: Option<ValidityWindow>,
    /// Events that caused this one.
    pub causal_links: Option<CausalLinks>,
}

impl Event {
    /// The conventional primary target (`subjects[0]`).
    pub fn primary_subject(&self) -> Option<&str> {
        self.subjects.first().map(String::as_str)
    }

    /// Whether the event's effect is in force at `at`.
    ///
    /// Events without a validity window are always in force.
    pub fn in_force_at(&self, at: DateTime<Utc>) -> bool {
        self.validity_window
            .as_ref()
            .is_none_or(|window| window.contains(at))
    }

    /// Replay order: `occurred_at`, then `recorded_at`, then `id`.
    pub fn replay_key(&self) -> (DateTime<Utc>, DateTime<Utc>, EventId) {
        (self.occurred_at, self.recorded_at, self.id)
    }
}

/// An event as submitted by a caller, before the store assigns an ID and
/// `recorded_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NewEvent {
    /// The category of event.
    #[ts(type = "string")]
    pub event_type: EventType,
    /// Business timestamp.
    pub occurred_at: DateTime<Utc>,
    /// Who asserted the fact.
    pub actor: String,
    /// Entity IDs the event concerns.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Event-type-specific structured data.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Originating system.
    #[serde(default)]
    pub source_system: String,
    /// Source document, if any.
    #[serde(default)]
    pub source_document: Option<String>,
    /// Window restricting when the effect is in force.
    #[serde(default)]
    pub validity_window: Option<ValidityWindow>,
    /// Events that caused this one.
    #[serde(default)]
    pub causal_links: Option<CausalLinks>,
}

impl NewEvent {
    /// Start building an event with an empty payload.
    pub fn new(event_type: EventType, occurred_at: DateTime<Utc>, actor: &str) -> Self {
        Self {
            event_type,
            occurred_at,
            actor: actor.to_owned(),
            subjects: Vec::new(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
            source_system: String::new(),
            source_document: None,
            validity_window: None,
            causal_links: None,
        }
    }

    /// Set the subjects.
    #[must_use]
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the originating system.
    #[must_use]
    pub fn with_source_system(mut self, source_system: &str) -> Self {
        source_system.clone_into(&mut self.source_system);
        self
    }

    /// Set the source document.
    #[must_use]
    pub fn with_source_document(mut self, source_document: &str) -> Self {
        self.source_document = Some(source_document.to_owned());
        self
    }

    /// Restrict the event's effect to a validity window.
    #[must_use]
    pub const fn with_validity_window(mut self, window: ValidityWindow) -> Self {
        self.validity_window = Some(window);
        self
    }

    /// Record a causal link to earlier events.
    #[must_use]
    pub fn with_causal_link(mut self, name: &str, causes: Vec<EventId>) -> Self {
        self.causal_links
            .get_or_insert_with(CausalLinks::new)
            .insert(name.to_owned(), causes);
        self
    }

    /// Materialize the persisted event.
    pub fn into_event(self, id: EventId, recorded_at: DateTime<Utc>) -> Event {
        Event {
            id,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            recorded_at,
            actor: self.actor,
            subjects: self.subjects,
            payload: self.payload,
            source_system: self.source_system,
            source_document: self.source_document,
            validity_window: self.validity_window,
            causal_links: self.causal_links,
        }
    }
}

// ---------------------------------------------------------------------------
// Projected entities
// ---------------------------------------------------------------------------

/// A projected organizational entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Holon {
    /// Holon identifier.
    pub id: HolonId,
    /// Entity kind.
    #[ts(type = "string")]
    pub holon_type: HolonType,
    /// Merged property bag.
    #[ts(type = "Record<string, unknown>")]
    pub properties: PropertyMap,
    /// Lifecycle status.
    pub status: HolonStatus,
    /// Business time of the creating event.
    pub created_at: DateTime<Utc>,
    /// The creating event.
    pub created_by: EventId,
    /// Documents the holon's facts were sourced from.
    pub source_documents: Vec<String>,
}

/// A projected, typed, directed edge between two holons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Relationship {
    /// Relationship identifier.
    pub id: RelationshipId,
    /// Relationship type (`part_of`, `occupies`, ...).
    pub relationship_type: String,
    /// Edge source.
    pub source_holon_id: HolonId,
    /// Edge target.
    pub target_holon_id: HolonId,
    /// Property bag.
    #[ts(type = "Record<string, unknown>")]
    pub properties: PropertyMap,
    /// Business time of the starting event.
    pub effective_start: DateTime<Utc>,
    /// Business time of the ending event; `None` while in force.
    pub effective_end: Option<DateTime<Utc>>,
    /// Provenance classification.
    pub authority_level: AuthorityLevel,
    /// Confidence for derived or inferred edges.
    pub confidence_score: Option<f64>,
    /// Originating system.
    pub source_system: String,
    /// The starting event.
    pub created_by: EventId,
}

impl Relationship {
    /// Whether the relationship is currently in force.
    pub const fn is_in_force(&self) -> bool {
        self.effective_end.is_none()
    }
}

/// A holon plus its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HolonState {
    /// The projected holon.
    pub holon: Holon,
    /// Business time of the last event that touched it.
    pub last_modified: DateTime<Utc>,
    /// Every event that touched it, in replay order.
    pub modification_events: Vec<EventId>,
}

/// A relationship plus its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RelationshipState {
    /// The projected relationship.
    pub relationship: Relationship,
    /// Business time of the last event that touched it.
    pub last_modified: DateTime<Utc>,
    /// Every event that touched it, in replay order.
    pub modification_events: Vec<EventId>,
}

/// The result of folding an ordered event sequence.
///
/// Maps are ordered so that two states folded from the same events compare
/// and serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedState {
    /// Holons keyed by ID.
    pub holons: BTreeMap<HolonId, HolonState>,
    /// Relationships keyed by ID.
    pub relationships: BTreeMap<RelationshipId, RelationshipState>,
    /// The instant this state describes.
    pub as_of_timestamp: DateTime<Utc>,
}

impl ProjectedState {
    /// An empty state as of `at`.
    pub const fn empty(at: DateTime<Utc>) -> Self {
        Self {
            holons: BTreeMap::new(),
            relationships: BTreeMap::new(),
            as_of_timestamp: at,
        }
    }

    /// Whether two states hold the same entities, ignoring `as_of_timestamp`.
    pub fn same_entities(&self, other: &Self) -> bool {
        self.holons == other.holons && self.relationships == other.relationships
    }
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

/// A participant named on a calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Participant {
    /// Participant holon ID.
    pub id: String,
    /// Participant holon type.
    #[serde(rename = "type")]
    pub participant_type: String,
    /// Role on the entry (`organizer`, `attendee`, ...).
    pub role: String,
}

/// Derived calendar index entry, keyed by the creating event's ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CalendarEventView {
    /// The creating event.
    pub id: EventId,
    /// Display title.
    pub title: String,
    /// Start of the entry.
    pub start_time: DateTime<Utc>,
    /// End of the entry.
    pub end_time: DateTime<Utc>,
    /// Entry kind (`meeting`, `offsite`, `leave`, ...).
    pub event_type: String,
    /// Sensitivity classification.
    pub classification: Option<String>,
    /// Named participants.
    pub participants: Vec<Participant>,
    /// Active or cancelled.
    pub status: CalendarStatus,
}

impl CalendarEventView {
    /// Closed-interval overlap: touching endpoints count.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time <= end && self.end_time >= start
    }

    /// Whether `holon_id` is named as a participant.
    pub fn has_participant(&self, holon_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == holon_id)
    }
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// A calendar entry that blocks a requested slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Conflict {
    /// The conflicting calendar entry.
    pub calendar_event_id: EventId,
    /// Its title.
    pub title: String,
    /// Its start.
    pub start_time: DateTime<Utc>,
    /// Its end.
    pub end_time: DateTime<Utc>,
    /// Direct or inherited.
    pub reason: ConflictReason,
    /// The holon named on the entry (the requested holon or an ancestor).
    pub source_id: HolonId,
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AvailabilityReport {
    /// `true` when there are no conflicts.
    pub available: bool,
    /// Direct and inherited conflicts, ordered by start time.
    pub conflicts: Vec<Conflict>,
}
