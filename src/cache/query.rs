//! Read-through query cache.
//!
//! Values are stored as JSON. A miss (or an unavailable cache) runs the
//! producer; its result is written back best-effort. Concurrent misses on
//! the same key are not de-duplicated: each caller runs its own producer
//! and the last write wins.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheClient;
use crate::error::Result;

/// Get-or-compute wrapper over a [`CacheClient`].
#[derive(Clone)]
pub struct QueryCache {
    client: CacheClient,
}

impl QueryCache {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    /// Returns the cached value for `key`, or runs `producer` and caches its result.
    ///
    /// Producer errors propagate unchanged and nothing is cached.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use std::time::Duration;
    /// # use market_cache::cache::{CacheClient, ClientOptions, MemoryBackend, QueryCache};
    /// # #[tokio::main]
    /// # async fn main() -> market_cache::error::Result<()> {
    /// let client = CacheClient::new(Arc::new(MemoryBackend::new()), ClientOptions::default());
    /// client.connect().await?;
    /// let cache = QueryCache::new(client);
    ///
    /// let total: u64 = cache
    ///     .get_or_fetch("count:tools", || async { Ok(55) }, Duration::from_secs(300))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, producer: F, ttl: Duration) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.lookup(key).await {
            debug!(key, "Query cache hit");
            return Ok(cached);
        }

        debug!(key, "Query cache miss");
        let value = producer().await?;
        self.put(key, &value, ttl).await;
        Ok(value)
    }

    /// Reads and decodes a cached value.
    ///
    /// A payload that no longer decodes as `T` is deleted and reported as a miss.
    pub async fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.client.get(key).await?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cached value");
                self.client.delete(key).await;
                None
            }
        }
    }

    /// Encodes and stores a value; failures are logged and dropped.
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(raw) => self.client.set(key, &raw, ttl).await,
            Err(e) => warn!(key, error = %e, "Result not cacheable, returning uncached"),
        }
    }

    /// Drops a cached value.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.client.delete(key).await
    }
}
