//! Direct and inherited availability over a synchronized graph.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use holon_db::{EventStore, MemoryEventStore};
use holon_graph::{
    AvailabilityConfig, AvailabilityResolver, GraphError, GraphSynchronizer, HolonGraph,
    MemoryGraph,
};
use holon_projection::{DEFAULT_QUEUE_CAPACITY, ProjectionCoordinator, ProjectionEngine};
use holon_types::{ConflictReason, EventType, HolonId, NewEvent};
use serde_json::{Value, json};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

fn created(event_type: EventType, id: &str) -> NewEvent {
    NewEvent::new(event_type, at(1, 0), "seed").with_subjects([id])
}

fn link(id: &str, kind: &str, source: &str, target: &str) -> NewEvent {
    NewEvent::new(EventType::RelationshipStarted, at(1, 0), "seed")
        .with_subjects([source, target])
        .with_payload(json!({ "relationshipId": id, "relationshipType": kind }))
}

fn booking(participant: &str, title: &str, start: &str, end: &str) -> NewEvent {
    NewEvent::new(EventType::CalendarEventCreated, at(1, 0), "cal").with_payload(json!({
        "title": title,
        "startTime": start,
        "endTime": end,
        "participants": [{ "id": participant, "type": "", "role": "attendee" }]
    }))
}

async fn resolver(events: Vec<NewEvent>, config: AvailabilityConfig) -> AvailabilityResolver {
    let store = Arc::new(MemoryEventStore::new());
    for event in events {
        store.append(event).await.unwrap();
    }
    let handle =
        ProjectionCoordinator::spawn(ProjectionEngine::new(store.clone()), DEFAULT_QUEUE_CAPACITY);
    let reader = handle.reader().clone();
    let graph = GraphSynchronizer::new(Arc::new(MemoryGraph::new()), handle);
    graph.initialize().await.unwrap();
    AvailabilityResolver::new(Arc::new(graph), Arc::new(reader), config)
}

fn team_in_org() -> Vec<NewEvent> {
    vec![
        created(EventType::OrganizationCreated, "org"),
        created(EventType::TeamCreated, "team"),
        link("team-in-org", "part_of", "team", "org"),
    ]
}

#[tokio::test]
async fn organization_event_blocks_its_teams() {
    let mut events = team_in_org();
    events.push(booking(
        "org",
        "All hands",
        "2024-06-01T00:00:00Z",
        "2024-06-02T00:00:00Z",
    ));
    let resolver = resolver(events, AvailabilityConfig::default()).await;

    let report = resolver
        .check_availability(&HolonId::from("team"), at(1, 12), at(1, 13))
        .await
        .unwrap();
    assert!(!report.available);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].reason, ConflictReason::Inherited);
    assert_eq!(report.conflicts[0].source_id, HolonId::from("org"));
    assert_eq!(report.conflicts[0].title, "All hands");
}

#[tokio::test]
async fn direct_conflicts_and_touching_endpoints() {
    let mut events = team_in_org();
    events.push(booking(
        "team",
        "Standup",
        "2024-06-03T09:00:00Z",
        "2024-06-03T09:15:00Z",
    ));
    let resolver = resolver(events, AvailabilityConfig::default()).await;
    let team = HolonId::from("team");

    let touching = resolver
        .check_availability(&team, at(3, 8), Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(touching.conflicts.len(), 1);
    assert_eq!(touching.conflicts[0].reason, ConflictReason::Direct);
    assert_eq!(touching.conflicts[0].source_id, team);

    let clear = resolver
        .check_availability(&team, at(3, 10), at(3, 11))
        .await
        .unwrap();
    assert!(clear.available);
    assert!(clear.conflicts.is_empty());
}

#[tokio::test]
async fn conflicts_are_ordered_and_deduplicated() {
    let mut events = team_in_org();
    events.push(booking(
        "org",
        "Offsite",
        "2024-06-05T08:00:00Z",
        "2024-06-05T18:00:00Z",
    ));
    events.push(booking(
        "team",
        "Retro",
        "2024-06-05T07:00:00Z",
        "2024-06-05T12:00:00Z",
    ));
    // Names both the team and the org: reported once, as direct.
    events.push(
        NewEvent::new(EventType::CalendarEventCreated, at(1, 0), "cal").with_payload(json!({
            "title": "Planning",
            "startTime": "2024-06-05T10:00:00Z",
            "endTime": "2024-06-05T11:00:00Z",
            "participants": [
                { "id": "org", "type": "Organization", "role": "host" },
                { "id": "team", "type": "Team", "role": "attendee" }
            ]
        })),
    );
    let resolver = resolver(events, AvailabilityConfig::default()).await;

    let report = resolver
        .check_availability(&HolonId::from("team"), at(5, 10), at(5, 11))
        .await
        .unwrap();
    let summary: Vec<(String, ConflictReason)> = report
        .conflicts
        .iter()
        .map(|c| (c.title.clone(), c.reason))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Retro".to_owned(), ConflictReason::Direct),
            ("Offsite".to_owned(), ConflictReason::Inherited),
            ("Planning".to_owned(), ConflictReason::Direct),
        ]
    );
}

#[tokio::test]
async fn cycles_terminate_and_depth_is_bounded() {
    let chain = ["h0", "h1", "h2", "h3", "h4", "h5", "h6", "h7"];
    let mut events: Vec<NewEvent> = chain
        .iter()
        .map(|id| created(EventType::TeamCreated, id))
        .collect();
    for pair in chain.windows(2) {
        events.push(link(&format!("{}-{}", pair[0], pair[1]), "part_of", pair[0], pair[1]));
    }
    // Bad data: the top of the chain points back at the bottom.
    events.push(link("h7-h0", "part_of", "h7", "h0"));
    events.push(booking(
        "h7",
        "Far away",
        "2024-06-01T00:00:00Z",
        "2024-06-30T00:00:00Z",
    ));
    let resolver = resolver(events, AvailabilityConfig::default()).await;

    let ancestors = resolver.ancestors(&HolonId::from("h0")).await.unwrap();
    let names: Vec<&str> = ancestors.iter().map(HolonId::as_str).collect();
    assert_eq!(names, ["h1", "h2", "h3", "h4", "h5"]);

    // h7 is seven levels up: out of reach.
    let report = resolver
        .check_availability(&HolonId::from("h0"), at(10, 9), at(10, 10))
        .await
        .unwrap();
    assert!(report.available);

    // From h3 the cycle wraps around without looping forever.
    let wrapped = resolver.ancestors(&HolonId::from("h3")).await.unwrap();
    let names: Vec<&str> = wrapped.iter().map(HolonId::as_str).collect();
    assert_eq!(names, ["h4", "h5", "h6", "h7", "h0"]);
}

#[tokio::test]
async fn ended_and_non_hierarchy_edges_do_not_inherit() {
    let mut events = vec![
        created(EventType::OrganizationCreated, "org"),
        created(EventType::TeamCreated, "team"),
        created(EventType::PersonCreated, "kim"),
        link("team-in-org", "part_of", "team", "org"),
        link("kim-mentors-team", "mentors", "kim", "team"),
        NewEvent::new(EventType::RelationshipEnded, at(2, 0), "seed")
            .with_payload(json!({ "relationshipId": "team-in-org" })),
    ];
    events.push(booking(
        "org",
        "Board",
        "2024-06-04T00:00:00Z",
        "2024-06-05T00:00:00Z",
    ));
    events.push(booking(
        "team",
        "Sprint review",
        "2024-06-04T00:00:00Z",
        "2024-06-05T00:00:00Z",
    ));
    let resolver = resolver(events, AvailabilityConfig::default()).await;

    let team = resolver
        .check_availability(&HolonId::from("team"), at(4, 9), at(4, 10))
        .await
        .unwrap();
    assert_eq!(team.conflicts.len(), 1);
    assert_eq!(team.conflicts[0].reason, ConflictReason::Direct);

    let kim = resolver
        .check_availability(&HolonId::from("kim"), at(4, 9), at(4, 10))
        .await
        .unwrap();
    assert!(kim.available);
}

#[tokio::test]
async fn hierarchy_types_are_configurable() {
    let mut events = vec![
        created(EventType::TeamCreated, "team"),
        created(EventType::PersonCreated, "kim"),
        link("kim-mentors-team", "mentors", "kim", "team"),
    ];
    events.push(booking(
        "team",
        "Sprint review",
        "2024-06-04T00:00:00Z",
        "2024-06-05T00:00:00Z",
    ));
    let config = AvailabilityConfig {
        hierarchy_types: vec!["mentors".to_owned()],
        max_depth: 1,
    };
    let resolver = resolver(events, config).await;

    let kim = resolver
        .check_availability(&HolonId::from("kim"), at(4, 9), at(4, 10))
        .await
        .unwrap();
    assert_eq!(kim.conflicts.len(), 1);
    assert_eq!(kim.conflicts[0].source_id, HolonId::from("team"));
}

#[tokio::test]
async fn inverted_window_is_rejected() {
    let resolver = resolver(team_in_org(), AvailabilityConfig::default()).await;
    let result = resolver
        .check_availability(&HolonId::from("team"), at(2, 10), at(2, 9))
        .await;
    assert!(matches!(result, Err(GraphError::InvalidQuery(_))));
}

#[test]
fn config_defaults_fill_missing_fields() {
    let config: AvailabilityConfig = serde_json::from_value(json!({ "max_depth": 2 })).unwrap();
    assert_eq!(config.max_depth, 2);
    assert_eq!(config.hierarchy_types.len(), 5);
    let partial: AvailabilityConfig =
        serde_json::from_value(Value::Object(serde_json::Map::new())).unwrap();
    assert_eq!(partial, AvailabilityConfig::default());
}
