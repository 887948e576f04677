//! Cache-aside decorator over a [`HolonGraph`].
//!
//! - **Reads**: `get_holon` checks the cache first; on a miss or an
//!   undecodable entry it reads the inner graph and repopulates with a TTL.
//!   A failing cache degrades to the inner graph.
//! - **Writes**: cache entries for every affected holon are deleted before
//!   the inner graph is updated and again after it. A write generation is
//!   bumped between the update and the second delete; a reader whose graph
//!   read straddled a bump drops the entry it just cached, so a miss racing
//!   a write can never pin the old holon in the cache.
//! - **Rebuilds**: the whole namespace is flushed.
//!
//! Every other read passes straight through.
//!
//! # Key Patterns
//!
//! | Pattern | Description |
//! |---------|-------------|
//! | `{ns}:holon:{id}` | One holon, JSON |

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use holon_db::cache::{get_json, set_json};
use holon_db::{CacheBackend, DbError};
use holon_types::{Direction, Event, Holon, HolonId, HolonType, Relationship};

use crate::error::GraphError;
use crate::filter::{HolonFilter, RelationshipFilter};
use crate::graph::{HolonGraph, SyncSummary};
use crate::pattern::{PathMatch, Pattern};
use crate::synchronizer::affected_holons;

/// Default time-to-live for cached holons.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// A [`HolonGraph`] with a read-through holon cache in front.
pub struct CachedGraph<G> {
    inner: G,
    cache: Arc<dyn CacheBackend>,
    namespace: String,
    ttl: Duration,
    generation: AtomicU64,
}

impl<G: HolonGraph> CachedGraph<G> {
    /// Wrap `inner`, keying entries under `namespace`.
    pub fn new(inner: G, cache: Arc<dyn CacheBackend>, namespace: &str) -> Self {
        Self {
            inner,
            cache,
            namespace: namespace.to_owned(),
            ttl: DEFAULT_TTL,
            generation: AtomicU64::new(0),
        }
    }

    /// Override the entry TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The wrapped graph.
    pub const fn inner(&self) -> &G {
        &self.inner
    }

    /// The cache key for one holon.
    pub fn holon_key(&self, id: &HolonId) -> String {
        format!("{}:holon:{id}", self.namespace)
    }

    async fn flush(&self) -> Result<u64, DbError> {
        let removed = self.cache.flush_namespace().await?;
        tracing::debug!(namespace = %self.namespace, removed, "Cache namespace flushed");
        Ok(removed)
    }

    /// Flush, run `rebuild`, flush again. The second flush drops anything
    /// readers cached from the half-written graph.
    async fn with_flush<F>(&self, rebuild: F) -> Result<SyncSummary, GraphError>
    where
        F: Future<Output = Result<SyncSummary, GraphError>> + Send,
    {
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "Cache flush before rebuild failed");
        }
        let summary = rebuild.await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.flush().await?;
        Ok(summary)
    }
}

#[async_trait]
impl<G: HolonGraph> HolonGraph for CachedGraph<G> {
    async fn initialize(&self) -> Result<SyncSummary, GraphError> {
        self.with_flush(self.inner.initialize()).await
    }

    async fn rebuild_indices(&self) -> Result<SyncSummary, GraphError> {
        self.with_flush(self.inner.rebuild_indices()).await
    }

    async fn update_from_new_event(&self, event: &Event) -> Result<SyncSummary, GraphError> {
        let keys: Vec<String> = affected_holons(event)
            .iter()
            .map(|id| self.holon_key(id))
            .collect();
        let invalidated = self.cache.delete(&keys).await;
        if let Err(e) = &invalidated {
            tracing::warn!(event_id = %event.id, error = %e, "Cache invalidation failed");
        }

        let summary = self.inner.update_from_new_event(event).await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        // Drops anything a reader cached from the graph mid-update.
        let reinvalidated = self.cache.delete(&keys).await;
        if let Err(e) = &reinvalidated {
            tracing::warn!(event_id = %event.id, error = %e, "Cache invalidation after update failed");
        }
        invalidated?;
        reinvalidated?;
        Ok(summary)
    }

    async fn get_holon(&self, id: &HolonId) -> Result<Option<Holon>, GraphError> {
        let key = self.holon_key(id);
        match get_json::<Holon>(self.cache.as_ref(), &key).await {
            Ok(Some(holon)) => {
                tracing::debug!(%key, "Cache hit");
                return Ok(Some(holon));
            }
            Ok(None) => {}
            Err(DbError::Serialization(e)) => {
                tracing::warn!(%key, error = %e, "Undecodable cache entry, refetching");
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cache read failed, serving from graph");
            }
        }

        let seen = self.generation.load(Ordering::Acquire);
        let holon = self.inner.get_holon(id).await?;
        if let Some(holon) = &holon {
            if let Err(e) = set_json(self.cache.as_ref(), &key, holon, self.ttl).await {
                tracing::warn!(%key, error = %e, "Cache write failed");
            } else if self.generation.load(Ordering::Acquire) != seen {
                tracing::debug!(%key, "Graph changed during read, dropping cached entry");
                if let Err(e) = self.cache.delete(std::slice::from_ref(&key)).await {
                    tracing::warn!(%key, error = %e, "Cache write-back rollback failed");
                }
            }
        }
        Ok(holon)
    }

    async fn query_holons_by_type(
        &self,
        holon_type: &HolonType,
        filter: &HolonFilter,
    ) -> Result<Vec<Holon>, GraphError> {
        self.inner.query_holons_by_type(holon_type, filter).await
    }

    async fn traverse_relationships(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Relationship>, GraphError> {
        self.inner
            .traverse_relationships(id, relationship_type, direction, filter)
            .await
    }

    async fn get_connected_holons(
        &self,
        id: &HolonId,
        relationship_type: Option<&str>,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Holon>, GraphError> {
        self.inner
            .get_connected_holons(id, relationship_type, direction, filter)
            .await
    }

    async fn match_pattern(&self, pattern: &Pattern) -> Result<Vec<PathMatch>, GraphError> {
        self.inner.match_pattern(pattern).await
    }
}
