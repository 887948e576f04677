//! Enumeration types for events, holons, relationships, and calendar entries.
//!
//! [`EventType`] is the closed set of domain event kinds. Tags the running
//! binary does not know are preserved as [`EventType::Unrecognized`] so they
//! round-trip through the store and are ignored by replay instead of
//! failing it.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// The category of a domain event.
///
/// Serialized as its `snake_case` tag (see [`EventType::as_str`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    // --- Holon creation ---
    /// A holon of the type named in the payload was created.
    HolonCreated,
    /// An organization was founded.
    OrganizationCreated,
    /// A team was formed.
    TeamCreated,
    /// A position was established.
    PositionCreated,
    /// A person joined the organization's records.
    PersonCreated,
    /// A mission was declared.
    MissionCreated,
    /// An objective was set.
    ObjectiveCreated,
    /// A task was created.
    TaskCreated,
    /// A document was registered.
    DocumentCreated,

    // --- Holon modification ---
    /// Generic property modification.
    HolonModified,
    /// A task moved to a different status.
    TaskStatusChanged,
    /// An objective's progress was updated.
    ObjectiveProgressUpdated,
    /// A document was revised.
    DocumentRevised,

    // --- Holon deactivation ---
    /// Generic deactivation.
    HolonDeactivated,
    /// A position was eliminated.
    PositionEliminated,
    /// An organization was dissolved.
    OrganizationDissolved,
    /// A person left the organization.
    PersonDeparted,

    // --- Relationships ---
    /// A typed relationship between two holons came into force.
    RelationshipStarted,
    /// A person was assigned to a position.
    AssignmentStarted,
    /// A relationship stopped being in force.
    RelationshipEnded,
    /// A person's assignment to a position ended.
    AssignmentEnded,
    /// A relationship's properties were corrected.
    RelationshipCorrected,

    // --- Calendar ---
    /// A calendar entry was scheduled.
    CalendarEventCreated,
    /// A calendar entry was rescheduled or edited.
    CalendarEventModified,
    /// A calendar entry was cancelled.
    CalendarEventCancelled,

    /// A tag this binary does not understand. Ignored by replay.
    Unrecognized(String),
}

/// The projection handler an [`EventType`] dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Upsert a holon with `status = active`.
    HolonCreation,
    /// Shallow-merge a property patch into an existing holon.
    HolonModification,
    /// Flip a holon's status to inactive.
    HolonDeactivation,
    /// Create a relationship keyed by the payload's `relationshipId`.
    RelationshipStart,
    /// Set a relationship's `effective_end`.
    RelationshipEnd,
    /// Patch a relationship's properties.
    RelationshipCorrection,
    /// Add an entry to the calendar index.
    CalendarCreation,
    /// Patch an existing calendar entry.
    CalendarModification,
    /// Mark a calendar entry cancelled.
    CalendarCancellation,
    /// No projection effect.
    Ignored,
}

impl HandlerKind {
    /// Whether this handler only affects the calendar index.
    pub const fn is_calendar(self) -> bool {
        matches!(
            self,
            Self::CalendarCreation | Self::CalendarModification | Self::CalendarCancellation
        )
    }

    /// Whether this handler touches a relationship.
    pub const fn is_relationship(self) -> bool {
        matches!(
            self,
            Self::RelationshipStart | Self::RelationshipEnd | Self::RelationshipCorrection
        )
    }
}

impl EventType {
    /// Every known event type, in declaration order.
    pub const KNOWN: [Self; 25] = [
        Self::HolonCreated,
        Self::OrganizationCreated,
        Self::TeamCreated,
        Self::PositionCreated,
        Self::PersonCreated,
        Self::MissionCreated,
        Self::ObjectiveCreated,
        Self::TaskCreated,
        Self::DocumentCreated,
        Self::HolonModified,
        Self::TaskStatusChanged,
        Self::ObjectiveProgressUpdated,
        Self::DocumentRevised,
        Self::HolonDeactivated,
        Self::PositionEliminated,
        Self::OrganizationDissolved,
        Self::PersonDeparted,
        Self::RelationshipStarted,
        Self::AssignmentStarted,
        Self::RelationshipEnded,
        Self::AssignmentEnded,
        Self::RelationshipCorrected,
        Self::CalendarEventCreated,
        Self::CalendarEventModified,
        Self::CalendarEventCancelled,
    ];

    /// The persisted tag for this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::HolonCreated => "holon_created",
            Self::OrganizationCreated => "organization_created",
            Self::TeamCreated => "team_created",
            Self::PositionCreated => "position_created",
            Self::PersonCreated => "person_created",
            Self::MissionCreated => "mission_created",
            Self::ObjectiveCreated => "objective_created",
            Self::TaskCreated => "task_created",
            Self::DocumentCreated => "document_created",
            Self::HolonModified => "holon_modified",
            Self::TaskStatusChanged => "task_status_changed",
            Self::ObjectiveProgressUpdated => "objective_progress_updated",
            Self::DocumentRevised => "document_revised",
            Self::HolonDeactivated => "holon_deactivated",
            Self::PositionEliminated => "position_eliminated",
            Self::OrganizationDissolved => "organization_dissolved",
            Self::PersonDeparted => "person_departed",
            Self::RelationshipStarted => "relationship_started",
            Self::AssignmentStarted => "assignment_started",
            Self::RelationshipEnded => "relationship_ended",
            Self::AssignmentEnded => "assignment_ended",
            Self::RelationshipCorrected => "relationship_corrected",
            Self::CalendarEventCreated => "calendar_event_created",
            Self::CalendarEventModified => "calendar_event_modified",
            Self::CalendarEventCancelled => "calendar_event_cancelled",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Parse a persisted tag. Unknown tags become [`EventType::Unrecognized`].
    pub fn from_tag(tag: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| Self::Unrecognized(tag.to_owned()))
    }

    /// The projection handler this event type dispatches to.
    pub const fn handler_kind(&self) -> HandlerKind {
        match self {
            Self::HolonCreated
            | Self::OrganizationCreated
            | Self::TeamCreated
            | Self::PositionCreated
            | Self::PersonCreated
            | Self::MissionCreated
            | Self::ObjectiveCreated
            | Self::TaskCreated
            | Self::DocumentCreated => HandlerKind::HolonCreation,
            Self::HolonModified
            | Self::TaskStatusChanged
            | Self::ObjectiveProgressUpdated
            | Self::DocumentRevised => HandlerKind::HolonModification,
            Self::HolonDeactivated
            | Self::PositionEliminated
            | Self::OrganizationDissolved
            | Self::PersonDeparted => HandlerKind::HolonDeactivation,
            Self::RelationshipStarted | Self::AssignmentStarted => HandlerKind::RelationshipStart,
            Self::RelationshipEnded | Self::AssignmentEnded => HandlerKind::RelationshipEnd,
            Self::RelationshipCorrected => HandlerKind::RelationshipCorrection,
            Self::CalendarEventCreated => HandlerKind::CalendarCreation,
            Self::CalendarEventModified => HandlerKind::CalendarModification,
            Self::CalendarEventCancelled => HandlerKind::CalendarCancellation,
            Self::Unrecognized(_) => HandlerKind::Ignored,
        }
    }

    /// The holon type a creation event implies, if it is type-specific.
    ///
    /// [`EventType::HolonCreated`] returns `None`; its payload names the type.
    pub const fn implied_holon_type(&self) -> Option<HolonType> {
        match self {
            Self::OrganizationCreated => Some(HolonType::Organization),
            Self::TeamCreated => Some(HolonType::Team),
            Self::PositionCreated => Some(HolonType::Position),
            Self::PersonCreated => Some(HolonType::Person),
            Self::MissionCreated => Some(HolonType::Mission),
            Self::ObjectiveCreated => Some(HolonType::Objective),
            Self::TaskCreated => Some(HolonType::Task),
            Self::DocumentCreated => Some(HolonType::Document),
            _ => None,
        }
    }

    /// The relationship type an assignment event implies.
    pub const fn implied_relationship_type(&self) -> Option<&'static str> {
        match self {
            Self::AssignmentStarted => Some(crate::relationship_types::OCCUPIES),
            _ => None,
        }
    }

    /// All known event types that feed the calendar index.
    pub fn calendar_types() -> Vec<Self> {
        Self::KNOWN
            .iter()
            .filter(|t| t.handler_kind().is_calendar())
            .cloned()
            .collect()
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_owned()
    }
}

// ---------------------------------------------------------------------------
// Holon types
// ---------------------------------------------------------------------------

/// The kind of organizational entity a holon represents.
///
/// Free-text types outside the known set are kept verbatim in
/// [`HolonType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HolonType {
    /// A legal or operational organization.
    Organization,
    /// A team inside an organization.
    Team,
    /// A position (role slot) that a person can occupy.
    Position,
    /// A person.
    Person,
    /// A mission statement.
    Mission,
    /// An objective derived from a mission.
    Objective,
    /// A unit of work.
    Task,
    /// A source document.
    Document,
    /// Any other caller-defined type.
    Custom(String),
}

impl HolonType {
    /// The canonical name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Organization => "Organization",
            Self::Team => "Team",
            Self::Position => "Position",
            Self::Person => "Person",
            Self::Mission => "Mission",
            Self::Objective => "Objective",
            Self::Task => "Task",
            Self::Document => "Document",
            Self::Custom(name) => name,
        }
    }

    /// Parse a type name, matching known types case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "organization" => Self::Organization,
            "team" => Self::Team,
            "position" => Self::Position,
            "person" => Self::Person,
            "mission" => Self::Mission,
            "objective" => Self::Objective,
            "task" => Self::Task,
            "document" => Self::Document,
            _ => Self::Custom(name.to_owned()),
        }
    }
}

impl core::fmt::Display for HolonType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for HolonType {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<HolonType> for String {
    fn from(holon_type: HolonType) -> Self {
        holon_type.as_str().to_owned()
    }
}

// ---------------------------------------------------------------------------
// Status and classification enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a holon. Deactivation is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum HolonStatus {
    /// In force.
    #[default]
    Active,
    /// Deactivated; still queryable.
    Inactive,
}

/// Provenance classification of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum AuthorityLevel {
    /// Asserted by a system of record.
    #[default]
    Authoritative,
    /// Computed from other authoritative facts.
    Derived,
    /// Guessed with some confidence score.
    Inferred,
}

impl AuthorityLevel {
    /// Parse a level name case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "authoritative" => Some(Self::Authoritative),
            "derived" => Some(Self::Derived),
            "inferred" => Some(Self::Inferred),
            _ => None,
        }
    }
}

/// Status of a calendar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum CalendarStatus {
    /// Scheduled and in force.
    #[default]
    Active,
    /// Cancelled; never produces conflicts.
    Cancelled,
}

/// Traversal direction for relationship queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Direction {
    /// Edges whose source is the holon.
    #[default]
    Outgoing,
    /// Edges whose target is the holon.
    Incoming,
    /// Both.
    Both,
}

/// Why a calendar entry conflicts with a requested slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ConflictReason {
    /// The holon itself is a participant.
    Direct,
    /// An organizational ancestor is a participant.
    Inherited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_roundtrip() {
        for event_type in EventType::KNOWN {
            assert_eq!(EventType::from_tag(event_type.as_str()), event_type);
        }
    }

    #[test]
    fn unknown_tags_are_preserved_and_ignored() {
        let event_type = EventType::from_tag("budget_allocated");
        assert_eq!(event_type.as_str(), "budget_allocated");
        assert_eq!(event_type.handler_kind(), HandlerKind::Ignored);
    }

    #[test]
    fn event_type_serializes_as_tag() {
        let json = serde_json::to_string(&EventType::AssignmentStarted).ok();
        assert_eq!(json.as_deref(), Some("\"assignment_started\""));
    }

    #[test]
    fn holon_type_parse_is_case_insensitive() {
        assert_eq!(HolonType::parse("organization"), HolonType::Organization);
        assert_eq!(
            HolonType::parse("Working Group"),
            HolonType::Custom("Working Group".to_owned())
        );
    }

    #[test]
    fn calendar_types_are_exactly_three() {
        assert_eq!(EventType::calendar_types().len(), 3);
    }
}
