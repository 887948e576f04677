//! Shared type definitions for the Holon semantic operating model.
//!
//! This crate is the single source of truth for the types that flow between
//! the event store, the projection engine, the graph layer, and the service
//! facade. Types flow downstream to `TypeScript` via `ts-rs` for the editor
//! applications.
//!
//! # Modules
//!
//! - [`ids`] -- Event UUIDs and caller-chosen holon / relationship keys
//! - [`enums`] -- Event types, holon types, statuses, traversal direction
//! - [`structs`] -- Events, projected entities, projected state, calendar views
//! - [`payloads`] -- Tolerant typed views over event payload JSON
//! - [`relationship_types`] -- Well-known relationship type names

pub mod enums;
pub mod ids;
pub mod payloads;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AuthorityLevel, CalendarStatus, ConflictReason, Direction, EventType, HandlerKind,
    HolonStatus, HolonType,
};
pub use ids::{EventId, HolonId, RelationshipId};
pub use payloads::EventPayload;
pub use structs::{
    AvailabilityReport, CalendarEventView, CausalLinks, Conflict, Event, Holon, HolonState,
    NewEvent, Participant, ProjectedState, PropertyMap, Relationship, RelationshipState,
    ValidityWindow,
};

/// Well-known relationship type names.
///
/// Relationship types are free text; these are the ones the core itself
/// interprets.
pub mod relationship_types {
    /// A person occupies a position.
    pub const OCCUPIES: &str = "occupies";
    /// A unit is part of a larger unit.
    pub const PART_OF: &str = "part_of";
    /// An entity belongs to an organization.
    pub const BELONGS_TO: &str = "belongs_to";
    /// A person or team is a member of a unit.
    pub const MEMBER_OF: &str = "member_of";
    /// A position reports to another position.
    pub const REPORTS_TO: &str = "reports_to";
    /// A unit is the child of another unit.
    pub const CHILD_OF: &str = "child_of";

    /// Relationship types that denote organizational hierarchy, traversed
    /// outward when resolving inherited availability conflicts.
    pub const HIERARCHY: [&str; 5] = [PART_OF, BELONGS_TO, MEMBER_OF, REPORTS_TO, CHILD_OF];
}
