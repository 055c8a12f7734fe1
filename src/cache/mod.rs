//! Cache Module
//!
//! Key derivation, the connection-managing cache client with its backends,
//! and the read-through query cache built on top of them.

mod backend;
mod client;
mod entry;
mod keys;
mod memory;
mod query;
mod remote;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::CacheBackend;
pub use client::{
    CacheClient, CacheInfo, ClientOptions, ConnectionState, ReconnectOutcome, RetryPolicy,
    WeakCacheClient,
};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use keys::{canonicalize, generate_key, KeyGenerator, QueryKey};
pub use memory::MemoryBackend;
pub use query::QueryCache;
pub use remote::{ttl_seconds, RedisBackend};
pub use stats::{CacheStats, StatsRecorder};
