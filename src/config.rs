//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.
//! Resolved once at startup and passed down explicitly.

use std::env;
use std::str::FromStr;
use std::time::Duration;

// == Cache Backend Kind ==
/// Which cache backend the client is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Remote key-value store speaking the Redis protocol
    Redis,
    /// In-process store
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

// == Cache Settings ==
/// Connection and retry parameters for the cache client.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Backend implementation to use
    pub backend: CacheBackendKind,
    /// Cache host
    pub host: String,
    /// Cache port
    pub port: u16,
    /// Store index selected after connecting
    pub db: u32,
    /// Prefix prepended to every generated key
    pub key_prefix: String,
    /// Retries made by `connect()` after the first failed attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_backoff: Duration,
    /// Upper bound on a single backoff delay
    pub max_backoff: Duration,
    /// Timeout applied to every individual cache operation
    pub op_timeout: Duration,
    /// Timeout applied to a single connection attempt
    pub connect_timeout: Duration,
}

impl CacheSettings {
    /// Returns the connection URL for the Redis backend.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis,
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            key_prefix: "market".to_string(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            op_timeout: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

// == TTL Policy ==
/// The logical sub-query a cached value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// One page of listings
    Page,
    /// Total matching item count
    TotalCount,
    /// Distinct seller count
    SellerCount,
}

/// Expiration policy per aggregate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// TTL for volatile page data
    pub page: Duration,
    /// TTL for slowly changing aggregates
    pub stats: Duration,
}

impl TtlPolicy {
    /// Returns the TTL that applies to the given query kind.
    pub fn ttl_for(&self, kind: QueryKind) -> Duration {
        match kind {
            QueryKind::Page => self.page,
            QueryKind::TotalCount | QueryKind::SellerCount => self.stats,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            page: Duration::from_secs(60),
            stats: Duration::from_secs(300),
        }
    }
}

// == Data Source Settings ==
/// Where listings come from.
#[derive(Debug, Clone)]
pub struct DataSourceSettings {
    /// Base URL of the REST interface; `None` selects the in-memory catalog
    pub base_url: Option<String>,
    /// API key sent with every REST request
    pub api_key: Option<String>,
    /// Request timeout against the data source
    pub timeout: Duration,
    /// JSON file used to seed the in-memory catalog
    pub listings_file: Option<String>,
}

impl Default for DataSourceSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: Duration::from_millis(5000),
            listings_file: None,
        }
    }
}

// == Pagination Settings ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    /// Page size used when the request does not specify one
    pub default_page_size: u32,
    /// Largest page size a request may ask for
    pub max_page_size: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    pub cache: CacheSettings,
    pub ttl: TtlPolicy,
    pub data_source: DataSourceSettings,
    pub pagination: PaginationSettings,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_BACKEND` - `redis` or `memory` (default: redis)
    /// - `CACHE_HOST` / `CACHE_PORT` / `CACHE_DB` - cache location (default: 127.0.0.1:6379/0)
    /// - `CACHE_KEY_PREFIX` - key prefix (default: market)
    /// - `CACHE_MAX_RETRIES` - connect retries (default: 3)
    /// - `CACHE_RETRY_BACKOFF_MS` - backoff base (default: 100)
    /// - `CACHE_MAX_BACKOFF_MS` - backoff cap (default: 30000)
    /// - `CACHE_OP_TIMEOUT_MS` - per-operation timeout (default: 50)
    /// - `CACHE_CONNECT_TIMEOUT_MS` - per-attempt connect timeout (default: 2000)
    /// - `CACHE_PAGE_TTL_SECS` - page TTL (default: 60)
    /// - `CACHE_STATS_TTL_SECS` - count TTL (default: 300)
    /// - `DATA_SOURCE_URL` / `DATA_SOURCE_API_KEY` - REST data source (default: unset)
    /// - `DATA_SOURCE_TIMEOUT_MS` - data source timeout (default: 5000)
    /// - `LISTINGS_FILE` - seed file for the in-memory catalog (default: unset)
    /// - `DEFAULT_PAGE_SIZE` / `MAX_PAGE_SIZE` - pagination bounds (default: 20 / 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env_parse("SERVER_PORT").unwrap_or(defaults.server_port),
            cache: CacheSettings {
                backend: env_parse("CACHE_BACKEND").unwrap_or(defaults.cache.backend),
                host: env_string("CACHE_HOST").unwrap_or(defaults.cache.host),
                port: env_parse("CACHE_PORT").unwrap_or(defaults.cache.port),
                db: env_parse("CACHE_DB").unwrap_or(defaults.cache.db),
                key_prefix: env_string("CACHE_KEY_PREFIX").unwrap_or(defaults.cache.key_prefix),
                max_retries: env_parse("CACHE_MAX_RETRIES").unwrap_or(defaults.cache.max_retries),
                retry_backoff: env_millis("CACHE_RETRY_BACKOFF_MS")
                    .unwrap_or(defaults.cache.retry_backoff),
                max_backoff: env_millis("CACHE_MAX_BACKOFF_MS")
                    .unwrap_or(defaults.cache.max_backoff),
                op_timeout: env_millis("CACHE_OP_TIMEOUT_MS").unwrap_or(defaults.cache.op_timeout),
                connect_timeout: env_millis("CACHE_CONNECT_TIMEOUT_MS")
                    .unwrap_or(defaults.cache.connect_timeout),
            },
            ttl: TtlPolicy {
                page: env_parse("CACHE_PAGE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.ttl.page),
                stats: env_parse("CACHE_STATS_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.ttl.stats),
            },
            data_source: DataSourceSettings {
                base_url: env_string("DATA_SOURCE_URL"),
                api_key: env_string("DATA_SOURCE_API_KEY"),
                timeout: env_millis("DATA_SOURCE_TIMEOUT_MS")
                    .unwrap_or(defaults.data_source.timeout),
                listings_file: env_string("LISTINGS_FILE"),
            },
            pagination: PaginationSettings {
                default_page_size: env_parse("DEFAULT_PAGE_SIZE")
                    .filter(|size| *size > 0)
                    .unwrap_or(defaults.pagination.default_page_size),
                max_page_size: env_parse("MAX_PAGE_SIZE")
                    .filter(|size| *size > 0)
                    .unwrap_or(defaults.pagination.max_page_size),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheSettings::default(),
            ttl: TtlPolicy::default(),
            data_source: DataSourceSettings::default(),
            pagination: PaginationSettings::default(),
        }
    }
}

// == Env Helpers ==
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.port, 6379);
        assert_eq!(config.cache.max_retries, 3);
        assert_eq!(config.cache.op_timeout, Duration::from_millis(50));
        assert_eq!(config.ttl.page, Duration::from_secs(60));
        assert_eq!(config.ttl.stats, Duration::from_secs(300));
        assert_eq!(config.pagination.default_page_size, 20);
        assert!(config.data_source.base_url.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "SERVER_PORT",
            "CACHE_BACKEND",
            "CACHE_HOST",
            "CACHE_PORT",
            "CACHE_PAGE_TTL_SECS",
            "DATA_SOURCE_URL",
            "DEFAULT_PAGE_SIZE",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cache.host, "127.0.0.1");
        assert_eq!(config.cache.url(), "redis://127.0.0.1:6379/0");
        assert_eq!(config.ttl.page, Duration::from_secs(60));
        assert_eq!(config.pagination.default_page_size, 20);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("memory".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Memory));
        assert_eq!(" Redis ".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Redis));
        assert!("memcached".parse::<CacheBackendKind>().is_err());
    }

    #[test]
    fn test_ttl_policy_per_kind() {
        let policy = TtlPolicy {
            page: Duration::from_secs(10),
            stats: Duration::from_secs(600),
        };
        assert_eq!(policy.ttl_for(QueryKind::Page), Duration::from_secs(10));
        assert_eq!(policy.ttl_for(QueryKind::TotalCount), Duration::from_secs(600));
        assert_eq!(policy.ttl_for(QueryKind::SellerCount), Duration::from_secs(600));
    }
}
