//! Cache Backend Trait
//!
//! The minimal key-value surface the cache client is built on:
//! `GET`, `SET ... EX`, `DEL`, `PING` and a key count.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A key-value store reachable by the cache client.
///
/// Implementations report failures as errors; the client decides how to
/// absorb them.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Establishes (or re-establishes) the connection.
    async fn connect(&self) -> Result<()>;

    /// Drops the connection, if any.
    async fn disconnect(&self);

    /// Reads a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Removes a key, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Round-trips a liveness check.
    async fn ping(&self) -> Result<()>;

    /// Number of keys currently held.
    async fn key_count(&self) -> Result<u64>;
}
