//! Memory Backend Module
//!
//! In-process key-value store with TTL expiration. Serves as the test double
//! for the remote cache and as a single-node production backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{current_timestamp_ms, CacheBackend, CacheEntry};
use crate::error::{MarketError, Result};

// == Memory Backend ==
/// In-memory cache backend with lazy expiry and outage simulation.
#[derive(Debug)]
pub struct MemoryBackend {
    /// Key-value storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// When false every operation fails as if the store were unreachable
    available: AtomicBool,
    /// Artificial delay applied before every operation, in milliseconds
    latency_ms: AtomicU64,
}

impl MemoryBackend {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Simulates the store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns whether the store is currently reachable.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    async fn check(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.is_available() {
            Ok(())
        } else {
            Err(MarketError::Connection(
                "memory backend is unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<()> {
        self.check().await
    }

    async fn disconnect(&self) {}

    // == Get ==
    /// Expired entries are removed on read and reported as absent.
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check().await?;

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check under the write lock; a concurrent set may have refreshed it
        if entries.get(key).is_some_and(|entry| entry.is_expired()) {
            entries.remove(key);
        }
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    // == Set ==
    /// Overwrites any existing value and resets its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check().await?;

        let entry = CacheEntry::new(value.to_string(), ttl);
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> Result<bool> {
        self.check().await?;

        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired()))
    }

    async fn ping(&self) -> Result<()> {
        self.check().await
    }

    async fn key_count(&self) -> Result<u64> {
        self.check().await?;
        self.cleanup_expired().await;
        Ok(self.entries.read().await.len() as u64)
    }
}
