//! `Dragonfly` (Redis-compatible) query cache.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{ns}:holon:{id}` | JSON | A cached holon lookup |
//! | `{ns}:__keys` | Set | Every key written under the namespace |
//!
//! The `__keys` set lets a rebuild flush the namespace without `SCAN`. A
//! miss drops the key from it, so expired entries do not pile up there.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use fred::types::Expiration;

use crate::cache::CacheBackend;
use crate::error::DbError;

/// Cache handle to a `Dragonfly` instance, scoped to one key namespace.
#[derive(Clone)]
pub struct DragonflyCache {
    client: Client,
    namespace: String,
}

impl DragonflyCache {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, namespace: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!(namespace, "Connected to Dragonfly");
        Ok(Self {
            client,
            namespace: namespace.to_owned(),
        })
    }

    /// The key namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn index_key(&self) -> String {
        format!("{}:__keys", self.namespace)
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the quit command fails.
    pub async fn close(&self) -> Result<(), DbError> {
        self.client.quit().await?;
        tracing::info!("Dragonfly connection closed");
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for DragonflyCache {
    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        if value.is_none() {
            // Expired entries linger in the index until removed.
            let _: u32 = self.client.srem(self.index_key(), key).await?;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DbError> {
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        let _: () = self
            .client
            .set(key, value, Some(Expiration::EX(seconds)), None, false)
            .await?;
        let _: u32 = self.client.sadd(self.index_key(), key).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), DbError> {
        if keys.is_empty() {
            return Ok(());
        }
        let _: u32 = self.client.del(keys.to_vec()).await?;
        let _: u32 = self.client.srem(self.index_key(), keys.to_vec()).await?;
        Ok(())
    }

    async fn flush_namespace(&self) -> Result<u64, DbError> {
        let index = self.index_key();
        let keys: Vec<String> = self.client.smembers(index.as_str()).await?;
        let removed = if keys.is_empty() {
            0
        } else {
            self.client.del::<u64, _>(keys).await?
        };
        let _: u32 = self.client.del(index.as_str()).await?;
        tracing::info!(namespace = %self.namespace, removed, "Flushed cache namespace");
        Ok(removed)
    }
}
