//! The operating model facade.
//!
//! [`OperatingModel`] owns every layer and is the only thing collaborators
//! talk to. A submission flows through the layers in order and returns once
//! each has seen it:
//!
//! ```text
//! submit_event
//!     |
//!     +-- EventValidator ------ reject? nothing is written
//!     |
//!     +== write lock =====================================
//!     +-- EventStore.append --- durable from here on
//!     +-- ProjectionHandle.apply   (read-your-writes)
//!     +-- HolonGraph.update_from_new_event   (cache invalidated around it)
//!     +===================================================
//! ```
//!
//! Submissions and recovery hold one write lock, so graph upserts land in
//! the order events were applied. Reads never take it.
//!
//! Once an event is durable, projection, graph and cache failures no longer
//! fail the submission. They mark the model degraded instead: reads are
//! answered from the projection until [`OperatingModel::recover`] rebuilds
//! it and the graph.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use holon_db::{CacheBackend, EventFilter, EventStore};
use holon_graph::{
    AvailabilityConfig, AvailabilityResolver, CachedGraph, GraphBackend, GraphError,
    GraphSynchronizer, HolonFilter, HolonGraph, MemoryGraph, PathMatch, Pattern,
    RelationshipFilter, SyncSummary,
};
use holon_projection::{
    DEFAULT_QUEUE_CAPACITY, ProjectionCoordinator, ProjectionEngine, ProjectionHandle,
};
use holon_types::{
    AvailabilityReport, CalendarEventView, Direction, Event, EventId, Holon, HolonId, HolonState,
    HolonType, NewEvent, ProjectedState, Relationship, RelationshipId, RelationshipState,
};
use tokio::sync::{Mutex, broadcast};

use crate::error::CoreError;
use crate::projected::ProjectedGraph;
use crate::validator::{AcceptAll, EventValidator};

/// Run a graph read, falling back to the projection when the model is
/// degraded or the graph fails.
macro_rules! read_with_fallback {
    ($model:expr, $operation:literal, |$graph:ident| $call:expr) => {{
        let primary = if $model.is_degraded() {
            None
        } else {
            let $graph: &dyn HolonGraph = $model.graph.as_ref();
            match $call.await {
                Ok(value) => Some(value),
                Err(err) => {
                    $model.degrade($operation, &err);
                    None
                }
            }
        };
        match primary {
            Some(value) => value,
            None => {
                let $graph: &dyn HolonGraph = &$model.fallback;
                $call.await?
            }
        }
    }};
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    ttl: Duration,
}

/// Assembles an [`OperatingModel`] around an event store.
pub struct OperatingModelBuilder {
    store: Arc<dyn EventStore>,
    graph_backend: Arc<dyn GraphBackend>,
    cache: Option<CacheLayer>,
    validator: Arc<dyn EventValidator>,
    availability: AvailabilityConfig,
    queue_capacity: usize,
    interrupt: Option<Arc<AtomicBool>>,
}

impl OperatingModelBuilder {
    /// Store graph nodes and edges in `backend` instead of a fresh
    /// [`MemoryGraph`].
    #[must_use]
    pub fn graph_backend(mut self, backend: Arc<dyn GraphBackend>) -> Self {
        self.graph_backend = backend;
        self
    }

    /// Front graph reads with a cache-aside layer.
    #[must_use]
    pub fn cache(mut self, backend: Arc<dyn CacheBackend>, namespace: &str, ttl: Duration) -> Self {
        self.cache = Some(CacheLayer {
            backend,
            namespace: namespace.to_owned(),
            ttl,
        });
        self
    }

    /// Run `validator` before every submission.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn EventValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Ancestor traversal settings for availability checks.
    #[must_use]
    pub fn availability(mut self, config: AvailabilityConfig) -> Self {
        self.availability = config;
        self
    }

    /// Abort a running graph rebuild at the next entity once `flag` is set.
    #[must_use]
    pub fn interrupt_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Depth of the projection command queue.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Start the projection, build the graph from the full log, and return
    /// the running model.
    ///
    /// A graph that cannot be built leaves the model degraded rather than
    /// failing startup. A log that cannot be replayed is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] or [`CoreError::Deserialization`] if
    /// the event log cannot be replayed.
    pub async fn build(self) -> Result<OperatingModel, CoreError> {
        let projection = ProjectionCoordinator::spawn(
            ProjectionEngine::new(Arc::clone(&self.store)),
            self.queue_capacity,
        );
        let mut synchronizer = GraphSynchronizer::new(self.graph_backend, projection.clone());
        if let Some(flag) = self.interrupt {
            synchronizer = synchronizer.with_interrupt(flag);
        }
        let graph: Arc<dyn HolonGraph> = match self.cache {
            Some(layer) => Arc::new(
                CachedGraph::new(synchronizer, layer.backend, &layer.namespace)
                    .with_ttl(layer.ttl),
            ),
            None => Arc::new(synchronizer),
        };
        let fallback = ProjectedGraph::new(projection.clone());
        let calendar = Arc::new(projection.reader().clone());

        let model = OperatingModel {
            store: self.store,
            availability: AvailabilityResolver::new(
                Arc::clone(&graph),
                calendar.clone(),
                self.availability.clone(),
            ),
            fallback_availability: AvailabilityResolver::new(
                Arc::new(fallback.clone()),
                calendar,
                self.availability,
            ),
            graph,
            fallback,
            projection,
            validator: self.validator,
            writes: Mutex::new(()),
            degraded: AtomicBool::new(false),
        };

        match model.graph.initialize().await {
            Ok(summary) => {
                tracing::info!(
                    nodes = summary.nodes,
                    edges = summary.edges,
                    skipped_edges = summary.skipped_edges,
                    "Operating model ready"
                );
            }
            Err(GraphError::Projection(e)) => return Err(e.into()),
            Err(e) => {
                model.degrade("initialize", &e);
                // The graph may have failed before the projection replayed.
                let replay = model.projection.replay_all().await?;
                tracing::warn!(events = replay.events, "Operating model started degraded");
            }
        }
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// OperatingModel
// ---------------------------------------------------------------------------

/// Event log, projection, graph, cache, and availability behind one API.
pub struct OperatingModel {
    store: Arc<dyn EventStore>,
    projection: ProjectionHandle,
    graph: Arc<dyn HolonGraph>,
    fallback: ProjectedGraph,
    availability: AvailabilityResolver,
    fallback_availability: AvailabilityResolver,
    validator: Arc<dyn EventValidator>,
    writes: Mutex<()>,
    degraded: AtomicBool,
}

impl OperatingModel {
    /// Start assembling a model over `store`.
    pub fn builder(store: Arc<dyn EventStore>) -> OperatingModelBuilder {
        OperatingModelBuilder {
            store,
            graph_backend: Arc::new(MemoryGraph::new()),
            cache: None,
            validator: Arc::new(AcceptAll),
            availability: AvailabilityConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            interrupt: None,
        }
    }

    /// Whether reads are currently served from the projection because the
    /// projection, graph or cache fell behind.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, operation: &'static str, err: &dyn Display) {
        if self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(operation, error = %err, "Derived state still failing");
        } else {
            tracing::error!(
                operation,
                error = %err,
                "Derived state fell behind the log, serving reads from the projection until recovery"
            );
        }
    }

    // -- Writes --------------------------------------------------------------

    /// Validate, persist, and apply one event.
    ///
    /// Returns after the projection and graph reflect the event, so an
    /// immediate read sees it. Once the event is persisted, a projection,
    /// graph or cache failure is logged and degrades the model; the
    /// submission still succeeds, so a retry never writes the event twice.
    /// A projection left behind catches up on the next submission or on
    /// [`Self::recover`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the validator rejects the event
    /// (nothing is written), or [`CoreError::Storage`] if the store fails.
    pub async fn submit_event(&self, event: NewEvent) -> Result<EventId, CoreError> {
        self.validator
            .validate(&event)
            .await
            .map_err(|rejection| CoreError::Validation(rejection.reason))?;

        let _writer = self.writes.lock().await;
        let event = self.store.append(event).await?;
        let id = event.id;
        if let Err(e) = self.projection.apply(event.clone()).await {
            self.degrade("submit_event", &e);
            return Ok(id);
        }

        match self.graph.update_from_new_event(&event).await {
            Ok(summary) => {
                tracing::debug!(
                    event_id = %id,
                    event_type = %event.event_type,
                    nodes = summary.nodes,
                    edges = summary.edges,
                    "Event submitted"
                );
            }
            Err(e) => self.degrade("submit_event", &e),
        }
        Ok(id)
    }

    /// Rebuild the graph from a full replay and flush the cache.
    ///
    /// Clears the degraded flag on success.
    ///
    /// # Errors
    ///
    /// Returns the rebuild's error; the model stays degraded.
    pub async fn recover(&self) -> Result<SyncSummary, CoreError> {
        let _writer = self.writes.lock().await;
        let summary = self.graph.rebuild_indices().await.inspect_err(|e| {
            tracing::error!(error = %e, "Recovery failed");
        })?;
        let was_degraded = self.degraded.swap(false, Ordering::AcqRel);
        tracing::info!(
            was_degraded,
            nodes = summary.nodes,
            edges = summary.edges,
            skipped_edges = summary.skipped_edges,
            "Graph recovered"
        );
        Ok(summary)
    }

    /// Receive every event applied to the projection from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.projection.subscribe()
    }

    // -- Event log -----------------------------------------------------------

    /// One event by ID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such event exists.
    pub async fn get_event(&self, id: EventId) -> Result<Event, CoreError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("event", id))
    }

    /// Events matching `filter`, in replay order.
    pub async fn query_events(&self, filter: &EventFilter) -> Result<Vec<Event>, CoreError> {
        Ok(self.store.query(filter).await?)
    }

    // -- Holons and relationships -------------------------------------------

    /// The current state of one holon.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the holon was never created.
    pub async fn get_holon(&self, id: &HolonId) -> Result<Holon, CoreError> {
        read_with_fallback!(self, "get_holon", |graph| graph.get_holon(id))
            .ok_or_else(|| CoreError::not_found("holon", id))
    }

    /// One holon as it stood at `at`, by replaying the log up to then.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the holon did not exist at `at`.
    pub async fn get_holon_as_of(
        &self,
        id: &HolonId,
        at: DateTime<Utc>,
    ) -> Result<HolonState, CoreError> {
        self.projection
            .holon_as_of(id, at)
            .await?
            .ok_or_else(|| CoreError::not_found("holon", id))
    }

    /// The whole projected state as it stood at `at`.
    pub async fn state_as_of(&self, at: DateTime<Utc>) -> Result<ProjectedState, CoreError> {
        Ok(self.projection.replay_as_of(at).await?)
    }

    /// Holons of one type passing `filter`, ordered by ID.
    pub async fn query_holons_by_type(
        &self,
        holon_type: &HolonType,
        filter: &HolonFilter,
    ) -> Result<Vec<Holon>, CoreError> {
        Ok(read_with_fallback!(self, "query_holons_by_type", |graph| {
            graph.query_holons_by_type(holon_type, filter)
        }))
    }

    /// Relationships incident on `id`, ordered by ID.
    pub async fn traverse_relationships(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Relationship>, CoreError> {
        Ok(read_with_fallback!(self, "traverse_relationships", |graph| {
            graph.traverse_relationships(id, relationship_type, direction, filter)
        }))
    }

    /// Holons at the other end of the relationships
    /// [`Self::traverse_relationships`] would return, each once.
    pub async fn get_connected_holons(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Holon>, CoreError> {
        Ok(read_with_fallback!(self, "get_connected_holons", |graph| {
            graph.get_connected_holons(id, relationship_type, direction, filter)
        }))
    }

    /// Multi-hop structural match.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an unanchored or overlong
    /// pattern.
    pub async fn match_pattern(&self, pattern: &Pattern) -> Result<Vec<PathMatch>, CoreError> {
        pattern.validate()?;
        Ok(read_with_fallback!(self, "match_pattern", |graph| {
            graph.match_pattern(pattern)
        }))
    }

    /// The current state of one relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the relationship was never started.
    pub async fn get_relationship(&self, id: &RelationshipId) -> Result<RelationshipState, CoreError> {
        self.projection
            .reader()
            .relationship_state(id)
            .await
            .ok_or_else(|| CoreError::not_found("relationship", id))
    }

    /// Every event that changed one holon, in the order applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the holon was never created.
    pub async fn get_holon_history(&self, id: &HolonId) -> Result<Vec<Event>, CoreError> {
        let trail = self
            .projection
            .reader()
            .holon_history(id)
            .await
            .ok_or_else(|| CoreError::not_found("holon", id))?;
        self.load_trail(trail).await
    }

    /// Every event that changed one relationship, in the order applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the relationship was never started.
    pub async fn get_relationship_history(
        &self,
        id: &RelationshipId,
    ) -> Result<Vec<Event>, CoreError> {
        let trail = self
            .projection
            .reader()
            .relationship_history(id)
            .await
            .ok_or_else(|| CoreError::not_found("relationship", id))?;
        self.load_trail(trail).await
    }

    async fn load_trail(&self, trail: Vec<EventId>) -> Result<Vec<Event>, CoreError> {
        let store = self.store.as_ref();
        let loaded = try_join_all(trail.iter().map(|id| store.get(*id))).await?;
        let mut events = Vec::with_capacity(loaded.len());
        for (id, event) in trail.iter().zip(loaded) {
            match event {
                Some(event) => events.push(event),
                None => tracing::warn!(event_id = %id, "Projected event missing from the store"),
            }
        }
        Ok(events)
    }

    /// One calendar entry, keyed by the event that created it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no calendar entry has that ID.
    pub async fn get_calendar_event(&self, id: EventId) -> Result<CalendarEventView, CoreError> {
        self.projection
            .reader()
            .calendar_entry(&id)
            .await
            .ok_or_else(|| CoreError::not_found("calendar event", id))
    }

    // -- Availability --------------------------------------------------------

    /// Direct and inherited conflicts for `holon_id` over `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `end` precedes `start`.
    pub async fn check_availability(
        &self,
        holon_id: &HolonId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AvailabilityReport, CoreError> {
        if !self.is_degraded() {
            match self.availability.check_availability(holon_id, start, end).await {
                Ok(report) => return Ok(report),
                Err(GraphError::InvalidQuery(message)) => {
                    return Err(CoreError::Validation(message));
                }
                Err(e) => self.degrade("check_availability", &e),
            }
        }
        Ok(self
            .fallback_availability
            .check_availability(holon_id, start, end)
            .await?)
    }
}
