//! Single-owner coordinator for the projection engine.
//!
//! The engine moves into one tokio task. Writers talk to it over a bounded
//! command queue and wait for a oneshot reply, so incremental applies and
//! full replays are serialized by construction. Readers bypass the queue
//! entirely through the shared [`ProjectionReader`].
//!
//! ```text
//! ProjectionHandle --Apply/ReplayAll--> [mpsc] --> task (owns ProjectionEngine)
//!        |                                                   |
//!        +------------- ProjectionReader <---- RwLock<ProjectionSnapshot>
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use holon_db::EventStore;
use holon_types::{Event, HolonId, HolonState, ProjectedState, RelationshipId, RelationshipState};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::engine::{ProjectionEngine, ProjectionReader, ReplaySummary, replay_as_of};
use crate::error::ProjectionError;

/// Default depth of the command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum Command {
    Apply {
        event: Box<Event>,
        reply: oneshot::Sender<Result<(), ProjectionError>>,
    },
    ReplayAll {
        reply: oneshot::Sender<Result<ReplaySummary, ProjectionError>>,
    },
}

/// Spawns the coordinator task.
pub struct ProjectionCoordinator;

impl ProjectionCoordinator {
    /// Move `engine` into a new task and return a handle to it.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn(engine: ProjectionEngine, capacity: usize) -> ProjectionHandle {
        let (commands, rx) = mpsc::channel(capacity.max(1));
        let handle = ProjectionHandle {
            commands,
            reader: engine.reader(),
            store: engine.store(),
            applied: engine.applied_sender(),
        };
        tokio::spawn(run(engine, rx));
        handle
    }
}

async fn run(mut engine: ProjectionEngine, mut rx: mpsc::Receiver<Command>) {
    tracing::info!("Projection coordinator started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::Apply { event, reply } => {
                let result = engine.apply_new(&event).await;
                if let Err(e) = &result {
                    tracing::error!(event_id = %event.id, error = %e, "Projection apply failed");
                }
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            Command::ReplayAll { reply } => {
                let result = engine.replay_all().await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Projection replay failed");
                }
                let _ = reply.send(result);
            }
        }
    }
    tracing::info!("Projection coordinator stopped");
}

/// Cloneable handle to a running coordinator.
#[derive(Clone)]
pub struct ProjectionHandle {
    commands: mpsc::Sender<Command>,
    reader: ProjectionReader,
    store: Arc<dyn EventStore>,
    applied: broadcast::Sender<Event>,
}

impl ProjectionHandle {
    /// Fold a persisted event into the current projection and wait for it
    /// to be visible to readers.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::CoordinatorClosed`] if the task has
    /// stopped, or the engine's error.
    pub async fn apply(&self, event: Event) -> Result<(), ProjectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Apply {
                event: Box::new(event),
                reply,
            })
            .await
            .map_err(|_| ProjectionError::CoordinatorClosed)?;
        rx.await.map_err(|_| ProjectionError::CoordinatorClosed)?
    }

    /// Reset and fold the whole log.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::CoordinatorClosed`] if the task has
    /// stopped, or the engine's error.
    pub async fn replay_all(&self) -> Result<ReplaySummary, ProjectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::ReplayAll { reply })
            .await
            .map_err(|_| ProjectionError::CoordinatorClosed)?;
        rx.await.map_err(|_| ProjectionError::CoordinatorClosed)?
    }

    /// Historical state at `at`. Runs on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails or an event is corrupt.
    pub async fn replay_as_of(&self, at: DateTime<Utc>) -> Result<ProjectedState, ProjectionError> {
        Ok(replay_as_of(self.store.as_ref(), at).await?.state)
    }

    /// One holon as it stood at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails or an event is corrupt.
    pub async fn holon_as_of(
        &self,
        id: &HolonId,
        at: DateTime<Utc>,
    ) -> Result<Option<HolonState>, ProjectionError> {
        let mut state = self.replay_as_of(at).await?;
        Ok(state.holons.remove(id))
    }

    /// One relationship as it stood at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the store fails or an event is corrupt.
    pub async fn relationship_as_of(
        &self,
        id: &RelationshipId,
        at: DateTime<Utc>,
    ) -> Result<Option<RelationshipState>, ProjectionError> {
        let mut state = self.replay_as_of(at).await?;
        Ok(state.relationships.remove(id))
    }

    /// Read access to the current projection.
    pub const fn reader(&self) -> &ProjectionReader {
        &self.reader
    }

    /// Receive every event applied from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.applied.subscribe()
    }
}
