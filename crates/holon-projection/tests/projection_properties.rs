//! Behavioural properties of the projection engine, exercised against the
//! in-memory event store.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use holon_db::{DbError, EventFilter, EventStore, MemoryEventStore};
use holon_projection::{
    DEFAULT_QUEUE_CAPACITY, FoldMode, ProjectionCoordinator, ProjectionEngine, ProjectionSnapshot,
};
use holon_types::{
    Event, EventId, EventType, HolonId, HolonStatus, NewEvent, ProjectedState, RelationshipId,
    ValidityWindow,
};
use serde_json::{Value, json};

fn t(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap()
}

/// A small organization history, deliberately listed out of business order.
fn history() -> Vec<NewEvent> {
    vec![
        NewEvent::new(EventType::HolonModified, t(3, 9), "hr")
            .with_subjects(["person-1"])
            .with_payload(json!({ "updates": { "title": "Staff Engineer" } })),
        NewEvent::new(EventType::OrganizationCreated, t(1, 9), "seed")
            .with_subjects(["org-1"])
            .with_payload(json!({ "name": "Acme" })),
        NewEvent::new(EventType::AssignmentStarted, t(2, 12), "hr")
            .with_subjects(["person-1", "pos-1"])
            .with_payload(json!({ "relationshipId": "rel-occ-1" })),
        NewEvent::new(EventType::PersonCreated, t(2, 9), "hr")
            .with_subjects(["person-1"])
            .with_payload(json!({ "name": "Kim", "title": "Engineer" })),
        NewEvent::new(EventType::PositionCreated, t(2, 10), "hr")
            .with_subjects(["pos-1"])
            .with_payload(json!({ "title": "Tech Lead" })),
        // Same business time as the position: ordered by recorded_at.
        NewEvent::new(EventType::HolonModified, t(2, 10), "hr")
            .with_subjects(["org-1"])
            .with_payload(json!({ "properties": { "size": 10 } })),
        NewEvent::new(EventType::from_tag("budget_approved"), t(2, 11), "finance")
            .with_subjects(["org-1"]),
    ]
}

async fn store_with(events: Vec<NewEvent>) -> Arc<MemoryEventStore> {
    let store = Arc::new(MemoryEventStore::new());
    for event in events {
        store.submit(event).await.unwrap();
    }
    store
}

async fn replayed(store: Arc<MemoryEventStore>) -> ProjectedState {
    let mut engine = ProjectionEngine::new(store);
    engine.replay_all().await.unwrap();
    engine.reader().state().await
}

/// State with event IDs stripped, for comparing stores that assigned
/// different IDs to the same facts.
fn shape(state: &ProjectedState) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (id, entry) in &state.holons {
        out.insert(
            format!("holon:{id}"),
            json!({
                "type": entry.holon.holon_type,
                "properties": entry.holon.properties,
                "status": entry.holon.status,
                "created_at": entry.holon.created_at,
                "last_modified": entry.last_modified,
                "touches": entry.modification_events.len(),
            }),
        );
    }
    for (id, entry) in &state.relationships {
        out.insert(
            format!("rel:{id}"),
            json!({
                "type": entry.relationship.relationship_type,
                "source": entry.relationship.source_holon_id,
                "target": entry.relationship.target_holon_id,
                "start": entry.relationship.effective_start,
                "end": entry.relationship.effective_end,
                "touches": entry.modification_events.len(),
            }),
        );
    }
    out
}

#[tokio::test]
async fn replay_is_independent_of_submission_order() {
    let forward = replayed(store_with(history()).await).await;
    let mut reversed_events = history();
    reversed_events.reverse();
    let reversed = replayed(store_with(reversed_events).await).await;

    assert_eq!(shape(&forward), shape(&reversed));
    let person = &forward.holons[&HolonId::from("person-1")];
    assert_eq!(person.holon.properties["title"], json!("Staff Engineer"));
}

#[tokio::test]
async fn replaying_the_same_log_twice_is_identical() {
    let store = store_with(history()).await;
    let first = replayed(store.clone()).await;
    let second = replayed(store).await;
    assert!(first.same_entities(&second));
}

#[tokio::test]
async fn incremental_apply_matches_full_replay() {
    let store = store_with(history()).await;
    let mut engine = ProjectionEngine::new(store.clone());
    engine.replay_all().await.unwrap();

    let next = store
        .append(
            NewEvent::new(EventType::PersonDeparted, t(4, 9), "hr").with_subjects(["person-1"]),
        )
        .await
        .unwrap();
    engine.apply_new(&next).await.unwrap();
    let incremental = engine.reader().state().await;

    let full = replayed(store).await;
    assert!(incremental.same_entities(&full));
}

#[tokio::test]
async fn back_dated_event_still_matches_full_replay() {
    let store = store_with(history()).await;
    let mut engine = ProjectionEngine::new(store.clone());
    engine.replay_all().await.unwrap();

    // Occurs before the modification already applied on day 3.
    let late = store
        .append(
            NewEvent::new(EventType::HolonModified, t(2, 15), "hr")
                .with_subjects(["person-1"])
                .with_payload(json!({ "updates": { "title": "Senior Engineer", "team": "core" } })),
        )
        .await
        .unwrap();
    engine.apply_new(&late).await.unwrap();
    let incremental = engine.reader().state().await;

    let full = replayed(store).await;
    assert!(incremental.same_entities(&full));
    let person = &incremental.holons[&HolonId::from("person-1")];
    assert_eq!(person.holon.properties["title"], json!("Staff Engineer"));
    assert_eq!(person.holon.properties["team"], json!("core"));
}

#[tokio::test]
async fn validity_window_bounds_visibility() {
    let store = store_with(vec![
        NewEvent::new(EventType::TeamCreated, t(1, 0), "ops")
            .with_subjects(["tiger-team"])
            .with_validity_window(ValidityWindow::between(t(10, 0), t(20, 0))),
    ])
    .await;
    let engine = ProjectionEngine::new(store);

    let team = HolonId::from("tiger-team");
    for (at, visible) in [
        (t(9, 23), false),
        (t(10, 0), true),
        (t(15, 0), true),
        (t(20, 0), true),
        (t(20, 1), false),
    ] {
        let state = engine.replay_as_of(at).await.unwrap();
        assert_eq!(state.holons.contains_key(&team), visible, "at {at}");
        assert_eq!(state.as_of_timestamp, at);
    }
}

#[tokio::test]
async fn as_of_excludes_later_events_without_touching_live_state() {
    let store = store_with(history()).await;
    let mut engine = ProjectionEngine::new(store);
    engine.replay_all().await.unwrap();

    let past = engine.replay_as_of(t(2, 9)).await.unwrap();
    assert!(past.holons.contains_key(&HolonId::from("person-1")));
    assert!(!past.holons.contains_key(&HolonId::from("pos-1")));
    assert_eq!(
        past.holons[&HolonId::from("person-1")].holon.properties["title"],
        json!("Engineer")
    );

    let live = engine.get_holon_state(&HolonId::from("pos-1")).await;
    assert!(live.is_some());
}

#[tokio::test]
async fn modification_trail_counts_creation_plus_modifications() {
    let mut events = vec![
        NewEvent::new(EventType::TaskCreated, t(1, 0), "pm")
            .with_subjects(["task-1"])
            .with_payload(json!({ "title": "Ship it" })),
    ];
    let n = 5;
    for i in 0..n {
        events.push(
            NewEvent::new(EventType::TaskStatusChanged, t(1, 1) + Duration::minutes(i), "pm")
                .with_subjects(["task-1"])
                .with_payload(json!({ "diff": { "step": i } })),
        );
    }
    let state = replayed(store_with(events).await).await;
    let task = &state.holons[&HolonId::from("task-1")];
    assert_eq!(task.modification_events.len(), usize::try_from(n).unwrap() + 1);
    assert_eq!(task.holon.properties["step"], json!(n - 1));
}

#[tokio::test]
async fn relationship_start_and_end_times_are_exact() {
    let start = t(5, 8);
    let end = t(6, 17);
    let store = store_with(vec![
        NewEvent::new(EventType::RelationshipStarted, start, "hr").with_payload(json!({
            "relationshipId": "rel-1",
            "relationshipType": "member_of",
            "sourceHolonId": "person-1",
            "targetHolonId": "team-1",
            "authorityLevel": "derived",
            "confidenceScore": 0.8
        })),
        NewEvent::new(EventType::RelationshipEnded, end, "hr")
            .with_payload(json!({ "relationshipId": "rel-1" })),
    ])
    .await;
    let mut engine = ProjectionEngine::new(store);
    engine.replay_all().await.unwrap();

    let rel = engine
        .get_relationship_state(&RelationshipId::from("rel-1"))
        .await
        .unwrap();
    assert_eq!(rel.relationship.effective_start, start);
    assert_eq!(rel.relationship.effective_end, Some(end));
    assert!(!rel.relationship.is_in_force());
    assert_eq!(rel.relationship.confidence_score, Some(0.8));
}

#[tokio::test]
async fn deactivation_is_terminal_and_keeps_properties() {
    let store = store_with(vec![
        NewEvent::new(EventType::PositionCreated, t(1, 0), "hr")
            .with_subjects(["pos-9"])
            .with_payload(json!({ "title": "Analyst" })),
        NewEvent::new(EventType::PositionEliminated, t(2, 0), "hr").with_subjects(["pos-9"]),
        NewEvent::new(EventType::PositionCreated, t(3, 0), "hr")
            .with_subjects(["pos-9"])
            .with_payload(json!({ "grade": "B" })),
    ])
    .await;
    let state = replayed(store).await;
    let pos = &state.holons[&HolonId::from("pos-9")];
    assert_eq!(pos.holon.status, HolonStatus::Inactive);
    assert_eq!(pos.holon.properties["title"], json!("Analyst"));
    assert_eq!(pos.holon.properties["grade"], json!("B"));
}

#[tokio::test]
async fn coordinator_serializes_concurrent_writers() {
    let store = Arc::new(MemoryEventStore::new());
    let handle = ProjectionCoordinator::spawn(
        ProjectionEngine::new(store.clone()),
        DEFAULT_QUEUE_CAPACITY,
    );
    handle.replay_all().await.unwrap();

    let created = store
        .append(NewEvent::new(EventType::ObjectiveCreated, t(1, 0), "pm").with_subjects(["obj-1"]))
        .await
        .unwrap();
    handle.apply(created).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20_i64 {
        let store = store.clone();
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let event = store
                .append(
                    NewEvent::new(
                        EventType::ObjectiveProgressUpdated,
                        t(2, 0) + Duration::seconds(i),
                        "pm",
                    )
                    .with_subjects(["obj-1"])
                    .with_payload(json!({ "updates": { format!("k{i}"): i } })),
                )
                .await
                .unwrap();
            handle.apply(event).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let history = handle
        .reader()
        .holon_history(&HolonId::from("obj-1"))
        .await
        .unwrap();
    assert_eq!(history.len(), 21);

    let full = replayed(store).await;
    assert!(handle.reader().state().await.same_entities(&full));
}

#[tokio::test]
async fn calendar_index_is_maintained_with_state() {
    let store = store_with(vec![
        NewEvent::new(EventType::CalendarEventCreated, t(1, 0), "cal").with_payload(json!({
            "title": "Board meeting",
            "startTime": "2024-04-10T09:00:00Z",
            "endTime": "2024-04-10T11:00:00Z",
            "participants": [{ "id": "org-1", "type": "Organization", "role": "host" }]
        })),
    ])
    .await;
    let events = store.get_all().await.unwrap();
    let mut engine = ProjectionEngine::new(store.clone());
    engine.replay_all().await.unwrap();

    let conflicts = engine
        .reader()
        .calendar_conflicts("org-1", t(10, 10), t(10, 12))
        .await;
    assert_eq!(conflicts.len(), 1);

    // The calendar alone rebuilds from calendar event types.
    let calendar_only = store
        .query(&EventFilter::default().with_types(EventType::calendar_types()))
        .await
        .unwrap();
    let rebuilt = ProjectionSnapshot::fold(&calendar_only, FoldMode::Current, t(11, 0));
    let folded = ProjectionSnapshot::fold(&events, FoldMode::Current, t(11, 0));
    assert_eq!(rebuilt.calendar, folded.calendar);
}

/// Memory store whose reads can be switched off while appends still work.
#[derive(Default)]
struct UnreadableStore {
    inner: MemoryEventStore,
    unreadable: AtomicBool,
}

#[async_trait]
impl EventStore for UnreadableStore {
    async fn append(&self, event: NewEvent) -> Result<Event, DbError> {
        self.inner.append(event).await
    }
    async fn get(&self, id: EventId) -> Result<Option<Event>, DbError> {
        self.inner.get(id).await
    }
    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, DbError> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(DbError::Config("store unreadable".to_owned()));
        }
        self.inner.query(filter).await
    }
    fn backend_name(&self) -> &'static str {
        "unreadable"
    }
}

#[tokio::test]
async fn failed_back_dated_replay_catches_up_on_next_apply() {
    let store = Arc::new(UnreadableStore::default());
    for event in history() {
        store.append(event).await.unwrap();
    }
    let mut engine = ProjectionEngine::new(store.clone());
    engine.replay_all().await.unwrap();

    store.unreadable.store(true, Ordering::SeqCst);
    let late = store
        .append(
            NewEvent::new(EventType::TeamCreated, t(1, 12), "hr")
                .with_subjects(["team-1"])
                .with_payload(json!({ "name": "Core" })),
        )
        .await
        .unwrap();
    assert!(engine.apply_new(&late).await.is_err());
    assert!(engine.reader().holon_state(&HolonId::from("team-1")).await.is_none());

    // The next event sorts last, but the engine still replays to catch up.
    store.unreadable.store(false, Ordering::SeqCst);
    let next = store
        .append(
            NewEvent::new(EventType::HolonModified, t(5, 9), "hr")
                .with_subjects(["team-1"])
                .with_payload(json!({ "updates": { "size": 4 } })),
        )
        .await
        .unwrap();
    engine.apply_new(&next).await.unwrap();

    let team = engine
        .reader()
        .holon_state(&HolonId::from("team-1"))
        .await
        .unwrap();
    assert_eq!(team.holon.properties["size"], json!(4));

    let mut full = ProjectionEngine::new(store);
    full.replay_all().await.unwrap();
    assert!(engine.reader().state().await.same_entities(&full.reader().state().await));
}
