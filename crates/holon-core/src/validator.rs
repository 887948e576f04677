//! Pre-persistence validation hook.
//!
//! Schema, constraint, and governance checks live outside the model. They
//! plug in here and run before an event reaches the store. A rejected event
//! is never written.

use async_trait::async_trait;
use holon_types::NewEvent;

/// Why an event was turned away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejection {
    /// Human-readable explanation returned to the submitter.
    pub reason: String,
}

impl Rejection {
    /// Build a rejection.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Decides whether an event may be persisted.
#[async_trait]
pub trait EventValidator: Send + Sync {
    /// Accept or reject `event`.
    async fn validate(&self, event: &NewEvent) -> Result<(), Rejection>;
}

/// Accepts every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl EventValidator for AcceptAll {
    async fn validate(&self, _event: &NewEvent) -> Result<(), Rejection> {
        Ok(())
    }
}

/// Runs several validators in order and stops at the first rejection.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn EventValidator>>,
}

impl ValidatorChain {
    /// An empty chain, which accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator.
    #[must_use]
    pub fn with(mut self, validator: impl EventValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

#[async_trait]
impl EventValidator for ValidatorChain {
    async fn validate(&self, event: &NewEvent) -> Result<(), Rejection> {
        for validator in &self.validators {
            validator.validate(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use holon_types::EventType;

    use super::*;

    struct RequireActor;

    #[async_trait]
    impl EventValidator for RequireActor {
        async fn validate(&self, event: &NewEvent) -> Result<(), Rejection> {
            if event.actor.is_empty() {
                return Err(Rejection::new("actor is required"));
            }
            Ok(())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl EventValidator for RejectAll {
        async fn validate(&self, _event: &NewEvent) -> Result<(), Rejection> {
            Err(Rejection::new("closed"))
        }
    }

    #[tokio::test]
    async fn chain_stops_at_first_rejection() {
        let chain = ValidatorChain::new().with(AcceptAll).with(RequireActor).with(RejectAll);

        let anonymous = NewEvent::new(EventType::TeamCreated, Utc::now(), "");
        assert_eq!(
            chain.validate(&anonymous).await,
            Err(Rejection::new("actor is required"))
        );

        let named = NewEvent::new(EventType::TeamCreated, Utc::now(), "kim");
        assert_eq!(chain.validate(&named).await, Err(Rejection::new("closed")));
    }

    #[tokio::test]
    async fn empty_chain_accepts() {
        let event = NewEvent::new(EventType::TeamCreated, Utc::now(), "kim");
        assert!(ValidatorChain::new().validate(&event).await.is_ok());
        assert!(AcceptAll.validate(&event).await.is_ok());
    }
}
