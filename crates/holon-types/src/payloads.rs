//! Typed views over event payloads.
//!
//! Payloads are stored as free-form JSON. Replay decodes them into the
//! [`EventPayload`] union according to the event's [`HandlerKind`]. Decoding
//! never fails: a field that is missing or has the wrong shape is treated as
//! absent. Only the property bags stay generic JSON maps.
//!
//! Keys are read in camelCase with `snake_case` aliases.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::enums::{AuthorityLevel, HandlerKind, HolonType};
use crate::structs::{Participant, PropertyMap};

/// Payload keys that describe the event itself rather than holon properties.
pub const STRUCTURAL_KEYS: [&str; 7] = [
    "holonId",
    "holon_id",
    "holonType",
    "holon_type",
    "type",
    "id",
    "properties",
];

/// Keys that may carry a property patch, in priority order.
pub const PATCH_KEYS: [&str; 3] = ["properties", "updates", "diff"];

/// A decoded event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Holon creation.
    HolonCreation(HolonCreation),
    /// Holon property modification.
    HolonModification(PropertyPatch),
    /// Holon deactivation.
    HolonDeactivation(HolonTarget),
    /// Relationship start.
    RelationshipStart(RelationshipStart),
    /// Relationship end.
    RelationshipEnd(RelationshipTarget),
    /// Relationship property correction.
    RelationshipCorrection(RelationshipPatch),
    /// Calendar entry creation.
    CalendarCreation(CalendarCreation),
    /// Calendar entry modification.
    CalendarModification(CalendarPatch),
    /// Calendar entry cancellation.
    CalendarCancellation(CalendarTarget),
    /// No typed view (ignored event types).
    Opaque,
}

/// Payload of a holon creation event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HolonCreation {
    /// Explicit target; falls back to `subjects[0]`.
    pub holon_id: Option<String>,
    /// Explicit type for generic creation events.
    pub holon_type: Option<HolonType>,
    /// Every non-structural key, plus the contents of a nested `properties`
    /// object.
    pub properties: PropertyMap,
}

/// Payload of a holon modification event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyPatch {
    /// Explicit target; falls back to `subjects[0]`.
    pub holon_id: Option<String>,
    /// Keys to shallow-merge.
    pub changes: PropertyMap,
}

/// Payload naming a holon.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HolonTarget {
    /// Explicit target; falls back to `subjects[0]`.
    pub holon_id: Option<String>,
}

/// Payload of a relationship start event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationshipStart {
    /// Relationship key; required for the event to have an effect.
    pub relationship_id: Option<String>,
    /// Relationship type.
    pub relationship_type: Option<String>,
    /// Edge source; falls back to `subjects[0]`.
    pub source_holon_id: Option<String>,
    /// Edge target; falls back to `subjects[1]`.
    pub target_holon_id: Option<String>,
    /// Edge properties.
    pub properties: PropertyMap,
    /// Provenance classification.
    pub authority_level: Option<AuthorityLevel>,
    /// Confidence score.
    pub confidence_score: Option<f64>,
}

/// Payload naming a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipTarget {
    /// Relationship key; falls back to `subjects[0]`.
    pub relationship_id: Option<String>,
}

/// Payload of a relationship correction event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationshipPatch {
    /// Relationship key; falls back to `subjects[0]`.
    pub relationship_id: Option<String>,
    /// Keys to shallow-merge.
    pub changes: PropertyMap,
}

/// Payload of a calendar creation event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarCreation {
    /// Display title.
    pub title: Option<String>,
    /// Start; the entry is not indexed without it.
    pub start_time: Option<DateTime<Utc>>,
    /// End; the entry is not indexed without it.
    pub end_time: Option<DateTime<Utc>>,
    /// Entry kind.
    pub event_type: Option<String>,
    /// Sensitivity classification.
    pub classification: Option<String>,
    /// Named participants; falls back to the event subjects.
    pub participants: Option<Vec<Participant>>,
}

/// Payload of a calendar modification event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarPatch {
    /// Entry being modified; falls back to `subjects[0]`.
    pub calendar_event_id: Option<String>,
    /// Replacement fields. Read from an `updates` object when present,
    /// otherwise from the top level.
    pub fields: CalendarCreation,
}

/// Payload naming a calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarTarget {
    /// Entry; falls back to `subjects[0]`.
    pub calendar_event_id: Option<String>,
}

impl EventPayload {
    /// Decode `payload` for the given handler.
    pub fn decode(kind: HandlerKind, payload: &Value) -> Self {
        let empty = Map::new();
        let obj = payload.as_object().unwrap_or(&empty);
        match kind {
            HandlerKind::HolonCreation => Self::HolonCreation(HolonCreation::decode(obj)),
            HandlerKind::HolonModification => Self::HolonModification(PropertyPatch {
                holon_id: string_field(obj, &["holonId", "holon_id"]),
                changes: patch_field(obj),
            }),
            HandlerKind::HolonDeactivation => Self::HolonDeactivation(HolonTarget {
                holon_id: string_field(obj, &["holonId", "holon_id"]),
            }),
            HandlerKind::RelationshipStart => {
                Self::RelationshipStart(RelationshipStart::decode(obj))
            }
            HandlerKind::RelationshipEnd => Self::RelationshipEnd(RelationshipTarget {
                relationship_id: string_field(obj, &["relationshipId", "relationship_id"]),
            }),
            HandlerKind::RelationshipCorrection => Self::RelationshipCorrection(RelationshipPatch {
                relationship_id: string_field(obj, &["relationshipId", "relationship_id"]),
                changes: patch_field(obj),
            }),
            HandlerKind::CalendarCreation => {
                Self::CalendarCreation(CalendarCreation::decode(obj))
            }
            HandlerKind::CalendarModification => {
                let fields = obj
                    .get("updates")
                    .and_then(Value::as_object)
                    .map_or_else(|| CalendarCreation::decode(obj), CalendarCreation::decode);
                Self::CalendarModification(CalendarPatch {
                    calendar_event_id: string_field(obj, &["calendarEventId", "calendar_event_id"]),
                    fields,
                })
            }
            HandlerKind::CalendarCancellation => Self::CalendarCancellation(CalendarTarget {
                calendar_event_id: string_field(obj, &["calendarEventId", "calendar_event_id"]),
            }),
            HandlerKind::Ignored => Self::Opaque,
        }
    }
}

impl HolonCreation {
    fn decode(obj: &Map<String, Value>) -> Self {
        let mut properties: PropertyMap = obj
            .iter()
            .filter(|(key, _)| !STRUCTURAL_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(nested) = obj.get("properties").and_then(Value::as_object) {
            for (key, value) in nested {
                properties.insert(key.clone(), value.clone());
            }
        }
        Self {
            holon_id: string_field(obj, &["holonId", "holon_id", "id"]),
            holon_type: string_field(obj, &["holonType", "holon_type", "type"])
                .map(|name| HolonType::parse(&name)),
            properties,
        }
    }
}

impl RelationshipStart {
    fn decode(obj: &Map<String, Value>) -> Self {
        Self {
            relationship_id: string_field(obj, &["relationshipId", "relationship_id"]),
            relationship_type: string_field(
                obj,
                &["relationshipType", "relationship_type", "type"],
            ),
            source_holon_id: string_field(
                obj,
                &["sourceHolonId", "source_holon_id", "sourceId", "source"],
            ),
            target_holon_id: string_field(
                obj,
                &["targetHolonId", "target_holon_id", "targetId", "target"],
            ),
            properties: map_field(obj, "properties"),
            authority_level: string_field(obj, &["authorityLevel", "authority_level"])
                .and_then(|name| AuthorityLevel::parse(&name)),
            confidence_score: obj
                .get("confidenceScore")
                .or_else(|| obj.get("confidence_score"))
                .and_then(Value::as_f64),
        }
    }
}

impl CalendarCreation {
    fn decode(obj: &Map<String, Value>) -> Self {
        Self {
            title: string_field(obj, &["title"]),
            start_time: time_field(obj, &["startTime", "start_time", "start"]),
            end_time: time_field(obj, &["endTime", "end_time", "end"]),
            event_type: string_field(obj, &["eventType", "event_type", "type"]),
            classification: string_field(obj, &["classification"]),
            participants: obj
                .get("participants")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(participant).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerant field readers
// ---------------------------------------------------------------------------

/// First key in `keys` holding a non-empty string.
fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .map(str::to_owned)
}

/// First key in `keys` holding an RFC 3339 timestamp.
fn time_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find_map(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// The object at `key`, or an empty map.
fn map_field(obj: &Map<String, Value>, key: &str) -> PropertyMap {
    obj.get(key)
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// The first object among `properties`, `updates`, `diff`.
fn patch_field(obj: &Map<String, Value>) -> PropertyMap {
    PATCH_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_object))
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn participant(value: &Value) -> Option<Participant> {
    let obj = value.as_object()?;
    Some(Participant {
        id: string_field(obj, &["id", "holonId", "holon_id"])?,
        participant_type: string_field(obj, &["type", "participantType"]).unwrap_or_default(),
        role: string_field(obj, &["role"]).unwrap_or_else(|| "participant".to_owned()),
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn creation_strips_structural_keys_and_flattens_properties() {
        let payload = json!({
            "holonId": "org-1",
            "holonType": "Organization",
            "name": "Acme",
            "properties": { "region": "EU" }
        });
        let EventPayload::HolonCreation(creation) =
            EventPayload::decode(HandlerKind::HolonCreation, &payload)
        else {
            panic!("unexpected payload variant");
        };
        assert_eq!(creation.holon_id.as_deref(), Some("org-1"));
        assert_eq!(creation.holon_type, Some(HolonType::Organization));
        assert_eq!(creation.properties.get("name"), Some(&json!("Acme")));
        assert_eq!(creation.properties.get("region"), Some(&json!("EU")));
        assert!(!creation.properties.contains_key("holonId"));
        assert!(!creation.properties.contains_key("properties"));
    }

    #[test]
    fn patch_prefers_properties_then_updates_then_diff() {
        let payload = json!({
            "updates": { "a": 1 },
            "diff": { "b": 2 }
        });
        let EventPayload::HolonModification(patch) =
            EventPayload::decode(HandlerKind::HolonModification, &payload)
        else {
            panic!("unexpected payload variant");
        };
        assert_eq!(patch.changes.get("a"), Some(&json!(1)));
        assert!(!patch.changes.contains_key("b"));
    }

    #[test]
    fn malformed_fields_decode_as_absent() {
        let payload = json!({
            "relationshipId": 42,
            "confidenceScore": "high",
            "properties": "not-an-object"
        });
        let decoded = EventPayload::decode(HandlerKind::RelationshipStart, &payload);
        assert_eq!(
            decoded,
            EventPayload::RelationshipStart(RelationshipStart::default())
        );
    }

    #[test]
    fn non_object_payload_decodes_to_defaults() {
        let decoded = EventPayload::decode(HandlerKind::HolonDeactivation, &json!(null));
        assert_eq!(decoded, EventPayload::HolonDeactivation(HolonTarget::default()));
    }

    #[test]
    fn calendar_modification_reads_updates_object() {
        let payload = json!({
            "calendarEventId": "abc",
            "updates": { "title": "Moved" }
        });
        let EventPayload::CalendarModification(patch) =
            EventPayload::decode(HandlerKind::CalendarModification, &payload)
        else {
            panic!("unexpected payload variant");
        };
        assert_eq!(patch.calendar_event_id.as_deref(), Some("abc"));
        assert_eq!(patch.fields.title.as_deref(), Some("Moved"));
    }

    #[test]
    fn participants_without_id_are_dropped() {
        let payload = json!({
            "title": "Standup",
            "participants": [{ "id": "team-1", "type": "Team" }, { "role": "x" }]
        });
        let EventPayload::CalendarCreation(creation) =
            EventPayload::decode(HandlerKind::CalendarCreation, &payload)
        else {
            panic!("unexpected payload variant");
        };
        let participants = creation.participants.unwrap_or_default();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants.first().map(|p| p.role.as_str()), Some("participant"));
    }
}
