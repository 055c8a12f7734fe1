//! Redis Backend Module
//!
//! Remote key-value store reached over a multiplexed async connection.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::CacheBackend;
use crate::config::CacheSettings;
use crate::error::{MarketError, Result};

// == Redis Backend ==
/// Cache backend speaking the Redis protocol.
pub struct RedisBackend {
    client: Client,
    /// Present while connected; cloned per operation
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Creates a backend for the given URL without connecting.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| MarketError::Connection(format!("invalid cache url: {}", e)))?;

        Ok(Self {
            client,
            conn: RwLock::new(None),
        })
    }

    /// Creates a backend from the cache settings.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        Self::new(&settings.url())
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| MarketError::Connection("not connected".to_string()))
    }
}

/// Converts a TTL to whole seconds for `SET ... EX`, rounding up, at least 1.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<()> {
        let conn = self.client.get_multiplexed_async_connection().await?;

        let mut check = conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut check).await?;

        *self.conn.write().await = Some(conn);
        debug!("Redis connection established");
        Ok(())
    }

    async fn disconnect(&self) {
        self.conn.write().await.take();
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn key_count(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        let count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(count)
    }
}
