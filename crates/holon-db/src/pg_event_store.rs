//! `PostgreSQL` implementation of [`EventStore`].
//!
//! JSON columns are stored as `JSONB` and read back as text so that a
//! malformed row surfaces as [`DbError::CorruptEvent`] rather than a driver
//! decode failure.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holon_types::{Event, EventId, NewEvent};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{DbError, with_timeout};
use crate::event_store::{EventFilter, EventStore, RawEvent, decode_rows, stamp};

const SELECT_COLUMNS: &str = r"SELECT id, event_type, occurred_at, recorded_at, actor,
       subjects::TEXT AS subjects, payload::TEXT AS payload,
       causal_links::TEXT AS causal_links, source_system, source_document,
       validity_window::TEXT AS validity_window
  FROM events";

/// Event store backed by the `events` table in `PostgreSQL`.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgEventStore {
    /// Create a store over `pool`; every call is bounded by `timeout`.
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn insert(&self, event: &Event) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO events (id, event_type, occurred_at, recorded_at, actor, subjects, payload,
                                  causal_links, source_system, source_document, validity_window)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(event.id.into_inner())
        .bind(event.event_type.as_str())
        .bind(event.occurred_at)
        .bind(event.recorded_at)
        .bind(&event.actor)
        .bind(Json(&event.subjects))
        .bind(Json(&event.payload))
        .bind(event.causal_links.as_ref().map(Json))
        .bind(&event.source_system)
        .bind(event.source_document.as_deref())
        .bind(event.validity_window.as_ref().map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn build_query(filter: &EventFilter) -> QueryBuilder<'_, Postgres> {
        let mut builder = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE TRUE");

        if let Some(types) = &filter.types {
            builder.push(" AND event_type = ANY(");
            builder.push_bind(
                types
                    .iter()
                    .map(|t| t.as_str().to_owned())
                    .collect::<Vec<_>>(),
            );
            builder.push(")");
        }
        if let Some(actor) = &filter.actor {
            builder.push(" AND actor = ");
            builder.push_bind(actor.as_str());
        }
        if let Some(range) = &filter.time_range {
            if let Some(start) = range.start {
                builder.push(" AND occurred_at >= ");
                builder.push_bind(start);
            }
            if let Some(end) = range.end {
                builder.push(" AND occurred_at <= ");
                builder.push_bind(end);
            }
        }
        if let Some(subjects) = &filter.subjects {
            builder.push(" AND subjects ?| ");
            builder.push_bind(subjects.clone());
        }

        builder.push(" ORDER BY occurred_at, recorded_at, id");
        builder
    }
}

#[derive(sqlx::FromRow)]
struct PgEventRow {
    id: Uuid,
    event_type: String,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    actor: String,
    subjects: String,
    payload: String,
    causal_links: Option<String>,
    source_system: String,
    source_document: Option<String>,
    validity_window: Option<String>,
}

impl From<PgEventRow> for RawEvent {
    fn from(row: PgEventRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            occurred_at: row.occurred_at,
            recorded_at: row.recorded_at,
            actor: row.actor,
            subjects: row.subjects,
            payload: row.payload,
            causal_links: row.causal_links,
            source_system: row.source_system,
            source_document: row.source_document,
            validity_window: row.validity_window,
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event, DbError> {
        let event = stamp(event);
        with_timeout("event append", self.timeout, self.insert(&event)).await?;
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Appended event (postgres)"
        );
        Ok(event)
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, DbError> {
        let query = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = with_timeout("event get", self.timeout, async {
            Ok(sqlx::query_as::<_, PgEventRow>(&query)
                .bind(id.into_inner())
                .fetch_optional(&self.pool)
                .await?)
        })
        .await?;
        row.map(|row| Event::try_from(RawEvent::from(row)))
            .transpose()
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, DbError> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }
        let rows = with_timeout("event query", self.timeout, async {
            let mut builder = Self::build_query(filter);
            Ok(builder
                .build_query_as::<PgEventRow>()
                .fetch_all(&self.pool)
                .await?)
        })
        .await?;
        decode_rows(rows.into_iter().map(RawEvent::from), filter)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
