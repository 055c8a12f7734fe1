//! Market Cache - cache-backed query aggregation for a listings marketplace
//!
//! Derives deterministic cache keys from filter parameters, wraps a remote
//! cache with connection-state management, and serves paginated listings
//! with statistics that stay consistent whether cached or fresh.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod market;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheClient, KeyGenerator, QueryCache};
pub use config::Config;
pub use error::{MarketError, Result};
pub use market::AggregationEngine;
