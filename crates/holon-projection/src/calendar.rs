//! Calendar index: a narrow projection over calendar event types.
//!
//! Entries are keyed by the ID of the event that created them. Modification
//! and cancellation events name the original through
//! `payload.calendarEventId`, falling back to `subjects[0]`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use holon_types::payloads::{CalendarCreation, CalendarPatch, CalendarTarget};
use holon_types::{CalendarEventView, CalendarStatus, Event, EventId, EventPayload, Participant};
use serde::{Deserialize, Serialize};

/// Entry kind used when a creation payload does not name one.
const DEFAULT_ENTRY_TYPE: &str = "meeting";

/// Calendar entries keyed by creating event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarIndex {
    entries: BTreeMap<EventId, CalendarEventView>,
}

impl CalendarIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded calendar payload. Non-calendar payloads are ignored.
    pub fn apply(&mut self, event: &Event, payload: &EventPayload) {
        match payload {
            EventPayload::CalendarCreation(creation) => self.create(event, creation),
            EventPayload::CalendarModification(patch) => self.modify(event, patch),
            EventPayload::CalendarCancellation(target) => self.cancel(event, target),
            _ => {}
        }
    }

    fn create(&mut self, event: &Event, creation: &CalendarCreation) {
        let (Some(start_time), Some(end_time)) = (creation.start_time, creation.end_time) else {
            tracing::debug!(event_id = %event.id, "Calendar entry without start/end, skipped");
            return;
        };

        let participants = creation.participants.clone().unwrap_or_else(|| {
            event
                .subjects
                .iter()
                .map(|id| Participant {
                    id: id.clone(),
                    participant_type: String::new(),
                    role: "participant".to_owned(),
                })
                .collect()
        });

        self.entries.insert(
            event.id,
            CalendarEventView {
                id: event.id,
                title: creation.title.clone().unwrap_or_default(),
                start_time,
                end_time,
                event_type: creation
                    .event_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENTRY_TYPE.to_owned()),
                classification: creation.classification.clone(),
                participants,
                status: CalendarStatus::Active,
            },
        );
    }

    fn modify(&mut self, event: &Event, patch: &CalendarPatch) {
        let Some(entry) = self.target_mut(event, patch.calendar_event_id.as_deref()) else {
            return;
        };
        let fields = &patch.fields;
        if let Some(title) = &fields.title {
            entry.title.clone_from(title);
        }
        if let Some(start) = fields.start_time {
            entry.start_time = start;
        }
        if let Some(end) = fields.end_time {
            entry.end_time = end;
        }
        if let Some(kind) = &fields.event_type {
            entry.event_type.clone_from(kind);
        }
        if fields.classification.is_some() {
            entry.classification.clone_from(&fields.classification);
        }
        if let Some(participants) = &fields.participants {
            entry.participants.clone_from(participants);
        }
    }

    fn cancel(&mut self, event: &Event, target: &CalendarTarget) {
        if let Some(entry) = self.target_mut(event, target.calendar_event_id.as_deref()) {
            entry.status = CalendarStatus::Cancelled;
        }
    }

    fn target_mut(
        &mut self,
        event: &Event,
        explicit: Option<&str>,
    ) -> Option<&mut CalendarEventView> {
        let id: EventId = explicit
            .or_else(|| event.primary_subject())
            .and_then(|raw| raw.parse().ok())?;
        let entry = self.entries.get_mut(&id);
        if entry.is_none() {
            tracing::debug!(event_id = %event.id, target = %id, "Calendar target not found");
        }
        entry
    }

    /// One entry.
    pub fn get(&self, id: &EventId) -> Option<&CalendarEventView> {
        self.entries.get(id)
    }

    /// All entries in creation-event order.
    pub fn iter(&self) -> impl Iterator<Item = &CalendarEventView> {
        self.entries.values()
    }

    /// Number of entries, including cancelled ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active entries naming `participant` that overlap `[start, end]`.
    pub fn active_overlapping(
        &self,
        participant: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<CalendarEventView> {
        self.entries
            .values()
            .filter(|entry| entry.status == CalendarStatus::Active)
            .filter(|entry| entry.has_participant(participant))
            .filter(|entry| entry.overlaps(start, end))
            .cloned()
            .collect()
    }
}
