//! Embedded `SQLite` implementation of [`EventStore`].
//!
//! Timestamps are stored as integer microseconds and IDs as hyphenated
//! UUID text. Subject containment is evaluated after the SQL filters since
//! `SQLite` has no JSON array index.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holon_types::{Event, EventId, NewEvent};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::{DbError, with_timeout};
use crate::event_store::{EventFilter, EventStore, RawEvent, decode_rows, stamp};

const SELECT_COLUMNS: &str = r"SELECT id, event_type, occurred_at, recorded_at, actor, subjects,
       payload, causal_links, source_system, source_document, validity_window
  FROM events";

/// Event store backed by the `events` table in an embedded database.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteEventStore {
    /// Create a store over `pool`; every call is bounded by `timeout`.
    pub const fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn insert(&self, event: &Event) -> Result<(), DbError> {
        let causal_links = event
            .causal_links
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let validity_window = event
            .validity_window
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r"INSERT INTO events (id, event_type, occurred_at, recorded_at, actor, subjects, payload,
                                  causal_links, source_system, source_document, validity_window)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.event_type.as_str())
        .bind(event.occurred_at.timestamp_micros())
        .bind(event.recorded_at.timestamp_micros())
        .bind(&event.actor)
        .bind(serde_json::to_string(&event.subjects)?)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(causal_links)
        .bind(&event.source_system)
        .bind(event.source_document.as_deref())
        .bind(validity_window)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn build_query(filter: &EventFilter) -> QueryBuilder<'_, Sqlite> {
        let mut builder = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(types) = &filter.types {
            builder.push(" AND event_type IN (");
            let mut separated = builder.separated(", ");
            for event_type in types {
                separated.push_bind(event_type.as_str().to_owned());
            }
            separated.push_unseparated(")");
        }
        if let Some(actor) = &filter.actor {
            builder.push(" AND actor = ");
            builder.push_bind(actor.as_str());
        }
        if let Some(range) = &filter.time_range {
            if let Some(start) = range.start {
                builder.push(" AND occurred_at >= ");
                builder.push_bind(start.timestamp_micros());
            }
            if let Some(end) = range.end {
                builder.push(" AND occurred_at <= ");
                builder.push_bind(end.timestamp_micros());
            }
        }

        builder.push(" ORDER BY occurred_at, recorded_at, id");
        builder
    }
}

#[derive(sqlx::FromRow)]
struct SqliteEventRow {
    id: String,
    event_type: String,
    occurred_at: i64,
    recorded_at: i64,
    actor: String,
    subjects: String,
    payload: String,
    causal_links: Option<String>,
    source_system: String,
    source_document: Option<String>,
    validity_window: Option<String>,
}

fn from_micros(id: &str, column: &str, micros: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DbError::corrupt(id, format!("{column} out of range: {micros}")))
}

impl TryFrom<SqliteEventRow> for RawEvent {
    type Error = DbError;

    fn try_from(row: SqliteEventRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DbError::corrupt(&row.id, format!("id: {e}")))?;
        Ok(Self {
            id,
            occurred_at: from_micros(&row.id, "occurred_at", row.occurred_at)?,
            recorded_at: from_micros(&row.id, "recorded_at", row.recorded_at)?,
            event_type: row.event_type,
            actor: row.actor,
            subjects: row.subjects,
            payload: row.payload,
            causal_links: row.causal_links,
            source_system: row.source_system,
            source_document: row.source_document,
            validity_window: row.validity_window,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event, DbError> {
        let event = stamp(event);
        with_timeout("event append", self.timeout, self.insert(&event)).await?;
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Appended event (sqlite)"
        );
        Ok(event)
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, DbError> {
        let query = format!("{SELECT_COLUMNS} WHERE id = ?");
        let row = with_timeout("event get", self.timeout, async {
            Ok(sqlx::query_as::<_, SqliteEventRow>(&query)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?)
        })
        .await?;
        row.map(|row| RawEvent::try_from(row).and_then(Event::try_from))
            .transpose()
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, DbError> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let rows = with_timeout("event query", self.timeout, async {
            let mut builder = Self::build_query(filter);
            Ok(builder
                .build_query_as::<SqliteEventRow>()
                .fetch_all(&self.pool)
                .await?)
        })
        .await?;
        let raw = rows
            .into_iter()
            .map(RawEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        decode_rows(raw, filter)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
