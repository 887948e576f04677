//! The event fold: how each event type changes projected state.
//!
//! Every event type maps to a [`HandlerKind`] through an exhaustive match in
//! `holon-types`; each kind maps to exactly one handler through a table built
//! once on first use. Handlers decode tolerantly: a payload missing a field
//! they need leaves state untouched.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use holon_types::{
    AuthorityLevel, Event, EventId, EventPayload, HandlerKind, Holon, HolonId, HolonState,
    HolonStatus, HolonType, ProjectedState, PropertyMap, Relationship, RelationshipId,
    RelationshipState,
};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarIndex;

/// Holon type recorded when neither the event type nor the payload names one.
const UNTYPED_HOLON: &str = "Holon";

/// Relationship type recorded when neither the event nor the payload names one.
const UNTYPED_RELATIONSHIP: &str = "related_to";

/// Everything derived from the event log: entity state plus calendar index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSnapshot {
    /// Holons and relationships.
    pub state: ProjectedState,
    /// Calendar entries.
    pub calendar: CalendarIndex,
    /// Replay key of the latest applied event.
    pub last_applied: Option<(DateTime<Utc>, DateTime<Utc>, EventId)>,
    /// Number of events folded in, including ignored ones.
    pub events_applied: usize,
}

/// Which events a fold admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldMode {
    /// Every event, regardless of validity window.
    Current,
    /// Events with `occurred_at <= t` whose validity window contains `t`.
    AsOf(DateTime<Utc>),
}

impl FoldMode {
    fn admits(self, event: &Event) -> bool {
        match self {
            Self::Current => true,
            Self::AsOf(at) => event.occurred_at <= at && event.in_force_at(at),
        }
    }
}

type Handler = fn(&mut ProjectionSnapshot, &Event, &EventPayload);

static HANDLERS: LazyLock<HashMap<HandlerKind, Handler>> = LazyLock::new(|| {
    let table: [(HandlerKind, Handler); 10] = [
        (HandlerKind::HolonCreation, create_holon),
        (HandlerKind::HolonModification, modify_holon),
        (HandlerKind::HolonDeactivation, deactivate_holon),
        (HandlerKind::RelationshipStart, start_relationship),
        (HandlerKind::RelationshipEnd, end_relationship),
        (HandlerKind::RelationshipCorrection, correct_relationship),
        (HandlerKind::CalendarCreation, apply_calendar),
        (HandlerKind::CalendarModification, apply_calendar),
        (HandlerKind::CalendarCancellation, apply_calendar),
        (HandlerKind::Ignored, ignore),
    ];
    table.into_iter().collect()
});

impl ProjectionSnapshot {
    /// An empty snapshot as of `at`.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            state: ProjectedState::empty(at),
            calendar: CalendarIndex::new(),
            last_applied: None,
            events_applied: 0,
        }
    }

    /// Fold an ordered event sequence from empty.
    pub fn fold<'a, I>(events: I, mode: FoldMode, as_of: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut snapshot = Self::empty(as_of);
        for event in events.into_iter().filter(|event| mode.admits(event)) {
            snapshot.apply(event);
        }
        snapshot.state.as_of_timestamp = as_of;
        snapshot
    }

    /// Fold one event into this snapshot.
    pub fn apply(&mut self, event: &Event) {
        let kind = event.event_type.handler_kind();
        let payload = EventPayload::decode(kind, &event.payload);
        if let Some(handler) = HANDLERS.get(&kind) {
            handler(self, event, &payload);
        }
        self.events_applied += 1;
        let key = event.replay_key();
        if self.last_applied.is_none_or(|last| key > last) {
            self.last_applied = Some(key);
        }
    }

    /// Where `event` falls relative to what has already been applied.
    pub fn placement(&self, event: &Event) -> Placement {
        match self.last_applied.map(|last| event.replay_key().cmp(&last)) {
            None | Some(Ordering::Greater) => Placement::Next,
            Some(Ordering::Less) => Placement::Late,
            Some(Ordering::Equal) => Placement::Duplicate,
        }
    }
}

/// How an incoming event relates to the events already folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Sorts after everything applied; fold it in directly.
    Next,
    /// Sorts before something applied; folding it in directly would diverge
    /// from a full replay.
    Late,
    /// The latest applied event itself.
    Duplicate,
}

// =========================================================================
// Target resolution
// =========================================================================

/// Explicit payload ID, else `subjects[0]`.
fn holon_target(event: &Event, explicit: Option<&String>) -> Option<HolonId> {
    explicit
        .map(String::as_str)
        .or_else(|| event.primary_subject())
        .map(HolonId::from)
}

fn relationship_target(event: &Event, explicit: Option<&String>) -> Option<RelationshipId> {
    explicit
        .map(String::as_str)
        .or_else(|| event.primary_subject())
        .map(RelationshipId::from)
}

fn merge(properties: &mut PropertyMap, changes: &PropertyMap) {
    for (key, value) in changes {
        properties.insert(key.clone(), value.clone());
    }
}

fn touch_holon(entry: &mut HolonState, event: &Event) {
    entry.last_modified = event.occurred_at;
    entry.modification_events.push(event.id);
    if let Some(document) = &event.source_document {
        if !entry.holon.source_documents.contains(document) {
            entry.holon.source_documents.push(document.clone());
        }
    }
}

fn touch_relationship(entry: &mut RelationshipState, event: &Event) {
    entry.last_modified = event.occurred_at;
    entry.modification_events.push(event.id);
}

// =========================================================================
// Holon handlers
// =========================================================================

fn create_holon(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    let EventPayload::HolonCreation(creation) = payload else {
        return;
    };
    let Some(id) = holon_target(event, creation.holon_id.as_ref()) else {
        tracing::debug!(event_id = %event.id, "Creation without target holon, skipped");
        return;
    };

    // Re-creation merges properties; deactivation stays terminal.
    if let Some(existing) = snapshot.state.holons.get_mut(&id) {
        merge(&mut existing.holon.properties, &creation.properties);
        touch_holon(existing, event);
        return;
    }

    let holon_type = event
        .event_type
        .implied_holon_type()
        .or_else(|| creation.holon_type.clone())
        .unwrap_or_else(|| HolonType::Custom(UNTYPED_HOLON.to_owned()));

    let mut entry = HolonState {
        holon: Holon {
            id: id.clone(),
            holon_type,
            properties: creation.properties.clone(),
            status: HolonStatus::Active,
            created_at: event.occurred_at,
            created_by: event.id,
            source_documents: Vec::new(),
        },
        last_modified: event.occurred_at,
        modification_events: Vec::new(),
    };
    touch_holon(&mut entry, event);
    snapshot.state.holons.insert(id, entry);
}

fn modify_holon(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    let EventPayload::HolonModification(patch) = payload else {
        return;
    };
    let Some(entry) = holon_target(event, patch.holon_id.as_ref())
        .and_then(|id| snapshot.state.holons.get_mut(&id))
    else {
        tracing::debug!(event_id = %event.id, "Modification of unknown holon ignored");
        return;
    };
    merge(&mut entry.holon.properties, &patch.changes);
    touch_holon(entry, event);
}

fn deactivate_holon(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    let EventPayload::HolonDeactivation(target) = payload else {
        return;
    };
    let Some(entry) = holon_target(event, target.holon_id.as_ref())
        .and_then(|id| snapshot.state.holons.get_mut(&id))
    else {
        return;
    };
    entry.holon.status = HolonStatus::Inactive;
    touch_holon(entry, event);
}

// =========================================================================
// Relationship handlers
// =========================================================================

fn start_relationship(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    let EventPayload::RelationshipStart(start) = payload else {
        return;
    };
    let Some(id) = start.relationship_id.as_deref().map(RelationshipId::from) else {
        tracing::warn!(event_id = %event.id, "Relationship start without relationshipId, skipped");
        return;
    };
    if snapshot.state.relationships.contains_key(&id) {
        tracing::debug!(event_id = %event.id, relationship_id = %id, "Relationship already started");
        return;
    }

    let source = start
        .source_holon_id
        .as_deref()
        .or_else(|| event.subjects.first().map(String::as_str));
    let target = start
        .target_holon_id
        .as_deref()
        .or_else(|| event.subjects.get(1).map(String::as_str));
    let (Some(source), Some(target)) = (source, target) else {
        tracing::warn!(event_id = %event.id, relationship_id = %id, "Relationship start without endpoints, skipped");
        return;
    };

    let relationship_type = start
        .relationship_type
        .clone()
        .or_else(|| event.event_type.implied_relationship_type().map(str::to_owned))
        .unwrap_or_else(|| UNTYPED_RELATIONSHIP.to_owned());

    snapshot.state.relationships.insert(
        id.clone(),
        RelationshipState {
            relationship: Relationship {
                id,
                relationship_type,
                source_holon_id: HolonId::from(source),
                target_holon_id: HolonId::from(target),
                properties: start.properties.clone(),
                effective_start: event.occurred_at,
                effective_end: None,
                authority_level: start.authority_level.unwrap_or(AuthorityLevel::Authoritative),
                confidence_score: start.confidence_score,
                source_system: event.source_system.clone(),
                created_by: event.id,
            },
            last_modified: event.occurred_at,
            modification_events: vec![event.id],
        },
    );
}

fn end_relationship(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    let EventPayload::RelationshipEnd(target) = payload else {
        return;
    };
    let Some(entry) = relationship_target(event, target.relationship_id.as_ref())
        .and_then(|id| snapshot.state.relationships.get_mut(&id))
    else {
        return;
    };
    if entry.relationship.effective_end.is_some() {
        tracing::debug!(event_id = %event.id, "Relationship already ended");
        return;
    }
    entry.relationship.effective_end = Some(event.occurred_at);
    touch_relationship(entry, event);
}

fn correct_relationship(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    let EventPayload::RelationshipCorrection(patch) = payload else {
        return;
    };
    let Some(entry) = relationship_target(event, patch.relationship_id.as_ref())
        .and_then(|id| snapshot.state.relationships.get_mut(&id))
    else {
        return;
    };
    merge(&mut entry.relationship.properties, &patch.changes);
    touch_relationship(entry, event);
}

// =========================================================================
// Calendar and ignored
// =========================================================================

fn apply_calendar(snapshot: &mut ProjectionSnapshot, event: &Event, payload: &EventPayload) {
    snapshot.calendar.apply(event, payload);
}

fn ignore(_: &mut ProjectionSnapshot, event: &Event, _: &EventPayload) {
    tracing::debug!(event_id = %event.id, event_type = %event.event_type, "No projection handler");
}
