//! Read-through cache backends.
//!
//! Keys are namespaced strings, values are JSON text. The graph layer keeps
//! its query results here and invalidates by key after every write; a full
//! rebuild flushes the whole namespace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::error::DbError;

/// A key/value cache with per-entry time-to-live.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// The value at `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>, DbError>;

    /// Store `value` at `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DbError>;

    /// Remove the given keys. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), DbError>;

    /// Remove every key in this cache's namespace, returning how many
    /// were removed.
    async fn flush_namespace(&self) -> Result<u64, DbError>;
}

/// Read and deserialize a JSON value.
///
/// # Errors
///
/// Returns [`DbError`] if the read or deserialization fails.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheBackend,
    key: &str,
) -> Result<Option<T>, DbError> {
    match cache.get(key).await? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value.
///
/// # Errors
///
/// Returns [`DbError`] if serialization or the write fails.
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn CacheBackend,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), DbError> {
    let text = serde_json::to_string(value)?;
    cache.set(key, &text, ttl).await
}

type Entries = HashMap<String, (String, Instant)>;

/// In-process cache with lazy expiry.
///
/// An unscoped cache flushes every entry it holds. A namespaced one, like
/// [`crate::DragonflyCache`], flushes only keys under `{namespace}:`, and
/// [`MemoryCache::scoped`] hands out further namespaces over the same
/// entries.
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<Entries>>,
    namespace: Option<String>,
}

impl MemoryCache {
    /// Create an empty, unscoped cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache whose flushes only touch `namespace`.
    pub fn namespaced(namespace: &str) -> Self {
        Self::new().scoped(namespace)
    }

    /// A handle on the same entries, flushing only `namespace`.
    #[must_use]
    pub fn scoped(&self, namespace: &str) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            namespace: Some(namespace.to_owned()),
        }
    }

    fn owns(&self, key: &str) -> bool {
        self.namespace.as_deref().is_none_or(|ns| {
            key.strip_prefix(ns)
                .is_some_and(|rest| rest.starts_with(':'))
        })
    }

    /// Number of live entries in this cache's namespace.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .iter()
            .filter(|(key, (_, expires))| *expires > now && self.owns(key))
            .count()
    }

    /// Whether there are no live entries in this cache's namespace.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DbError> {
        let expires = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_owned(), (value.to_owned(), expires));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), DbError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn flush_namespace(&self) -> Result<u64, DbError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !self.owns(key));
        let removed = before.saturating_sub(entries.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
