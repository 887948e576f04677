//! Embedded store tests against a private in-memory `SQLite` database.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::{DateTime, TimeZone, Utc};
use holon_db::{DbError, EventFilter, EventStore, SqliteConfig, SqliteDatabase};
use holon_types::{EventType, NewEvent, ValidityWindow};
use serde_json::json;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, hour, minute, 0).unwrap()
}

async fn open() -> SqliteDatabase {
    SqliteDatabase::open_in_memory()
        .await
        .expect("open in-memory database")
}

#[tokio::test]
async fn append_then_get_roundtrips_every_field() {
    let db = open().await;
    let store = db.event_store();

    let cause = store
        .append(NewEvent::new(EventType::PositionCreated, at(9, 0), "hr"))
        .await
        .unwrap();
    let event = store
        .append(
            NewEvent::new(EventType::AssignmentStarted, at(9, 30), "hr")
                .with_subjects(["person-1", "pos-1"])
                .with_payload(json!({ "relationshipId": "rel-1" }))
                .with_source_system("hris")
                .with_source_document("offer.pdf")
                .with_validity_window(ValidityWindow::between(at(9, 0), at(17, 0)))
                .with_causal_link("follows", vec![cause.id]),
        )
        .await
        .unwrap();

    let fetched = store.get(event.id).await.unwrap();
    assert_eq!(fetched, Some(event));
}

#[tokio::test]
async fn unknown_id_is_none() {
    let db = open().await;
    let store = db.event_store();
    let missing = store.get(holon_types::EventId::new()).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn replay_order_ignores_submission_order() {
    let db = open().await;
    let store = db.event_store();

    let late = store
        .append(NewEvent::new(EventType::HolonModified, at(12, 0), "a").with_subjects(["late"]))
        .await
        .unwrap();
    let tie_first = store
        .append(NewEvent::new(EventType::HolonModified, at(10, 0), "a").with_subjects(["tie-1"]))
        .await
        .unwrap();
    let tie_second = store
        .append(NewEvent::new(EventType::HolonModified, at(10, 0), "a").with_subjects(["tie-2"]))
        .await
        .unwrap();

    let all = store.get_all().await.unwrap();
    let ids: Vec<_> = all.iter().map(|e| e.id).collect();
    // Equal occurred_at falls back to recorded_at, then id.
    assert_eq!(ids[2], late.id);
    assert!(ids[..2].contains(&tie_first.id));
    assert!(ids[..2].contains(&tie_second.id));
    assert!(all[0].replay_key() <= all[1].replay_key());
}

#[tokio::test]
async fn filters_combine() {
    let db = open().await;
    let store = db.event_store();

    store
        .submit(NewEvent::new(EventType::OrganizationCreated, at(8, 0), "alice").with_subjects(["org-1"]))
        .await
        .unwrap();
    store
        .submit(
            NewEvent::new(EventType::RelationshipStarted, at(9, 0), "bob")
                .with_subjects(["team-1", "org-1"]),
        )
        .await
        .unwrap();
    store
        .submit(NewEvent::new(EventType::TeamCreated, at(10, 0), "alice").with_subjects(["team-9"]))
        .await
        .unwrap();

    let by_subject = store
        .query(&EventFilter::default().with_subjects(["org-1"]))
        .await
        .unwrap();
    assert_eq!(by_subject.len(), 2);

    let by_actor_and_type = store
        .query(
            &EventFilter::default()
                .with_actor("alice")
                .with_types(vec![EventType::TeamCreated]),
        )
        .await
        .unwrap();
    assert_eq!(by_actor_and_type.len(), 1);
    assert_eq!(by_actor_and_type[0].subjects, vec!["team-9".to_owned()]);

    let in_range = store
        .query(&EventFilter::default().with_time_range(Some(at(9, 0)), Some(at(10, 0))))
        .await
        .unwrap();
    assert_eq!(in_range.len(), 2);

    let none = store
        .query(&EventFilter::default().with_subjects(Vec::<String>::new()))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn unknown_event_types_are_preserved() {
    let db = open().await;
    let store = db.event_store();
    let event = store
        .append(NewEvent::new(
            EventType::from_tag("budget_approved"),
            at(11, 0),
            "finance",
        ))
        .await
        .unwrap();
    let fetched = store.get(event.id).await.unwrap().unwrap();
    assert_eq!(fetched.event_type.as_str(), "budget_approved");
}

#[tokio::test]
async fn corrupt_row_fails_the_query() {
    let db = open().await;
    let store = db.event_store();
    store
        .submit(NewEvent::new(EventType::HolonModified, at(9, 0), "a"))
        .await
        .unwrap();

    sqlx::query(
        r"INSERT INTO events (id, event_type, occurred_at, recorded_at, actor, subjects, payload, source_system)
          VALUES ('0190a1b2-0000-7000-8000-000000000001', 'holon_modified', 0, 0, 'x', 'not json', '{}', '')",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let result = store.get_all().await;
    assert!(matches!(result, Err(DbError::CorruptEvent { .. })));
}

#[tokio::test]
async fn file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    let config = SqliteConfig::file(&path);

    let id = {
        let db = SqliteDatabase::connect(&config).await.unwrap();
        db.run_migrations().await.unwrap();
        let id = db
            .event_store()
            .submit(NewEvent::new(EventType::PersonCreated, at(9, 0), "hr").with_subjects(["p-1"]))
            .await
            .unwrap();
        db.close().await;
        id
    };

    let db = SqliteDatabase::connect(&config).await.unwrap();
    db.run_migrations().await.unwrap();
    let fetched = db.event_store().get(id).await.unwrap();
    assert!(fetched.is_some());
    db.close().await;
}
