//! Cache Client Module
//!
//! Sole owner of the connection to the key-value store. Tracks connection
//! state, bounds every operation with a timeout and absorbs failures: a
//! failing store moves the client to `Degraded`, where reads miss and
//! writes are dropped until the background reconnect loop succeeds.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, MemoryBackend, RedisBackend, StatsRecorder};
use crate::config::{CacheBackendKind, CacheSettings};
use crate::error::{MarketError, Result};
use crate::tasks::spawn_reconnect_task;

// == Connection State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Store unreachable; operations short-circuit while reconnecting
    Degraded,
}

// == Retry Policy ==
/// Exponential backoff parameters for connecting and reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed connection attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub backoff_base: Duration,
    /// Cap on any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

// == Client Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub retry: RetryPolicy,
    /// Bound on every get/set/delete/ping/info call
    pub op_timeout: Duration,
    /// Bound on a single connection attempt
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            op_timeout: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&CacheSettings> for ClientOptions {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                backoff_base: settings.retry_backoff,
                max_backoff: settings.max_backoff,
            },
            op_timeout: settings.op_timeout,
            connect_timeout: settings.connect_timeout,
        }
    }
}

// == Cache Info ==
/// Health and introspection snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub backend: &'static str,
    pub state: ConnectionState,
    pub connected: bool,
    pub key_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Outcome of a single reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Connected,
    Failed,
    /// The client is no longer degraded (disconnected or already healthy)
    Stopped,
}

struct ClientInner {
    backend: Arc<dyn CacheBackend>,
    options: ClientOptions,
    state: Mutex<ConnectionState>,
    stats: StatsRecorder,
    reconnect: Mutex<ReconnectSlot>,
}

/// The running reconnect loop, tagged so a stale loop cannot release a newer one.
#[derive(Default)]
struct ReconnectSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.reconnect).handle.take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// == Cache Client ==
/// Shared handle to the cache; clones share one connection and state.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
}

/// Non-owning handle held by the reconnect task.
#[derive(Clone)]
pub struct WeakCacheClient {
    inner: Weak<ClientInner>,
}

impl WeakCacheClient {
    pub fn upgrade(&self) -> Option<CacheClient> {
        self.inner.upgrade().map(|inner| CacheClient { inner })
    }
}

impl CacheClient {
    // == Constructors ==
    /// Creates a disconnected client over the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend,
                options,
                state: Mutex::new(ConnectionState::Disconnected),
                stats: StatsRecorder::new(),
                reconnect: Mutex::new(ReconnectSlot::default()),
            }),
        }
    }

    /// Builds the backend selected by the settings and wraps it.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match settings.backend {
            CacheBackendKind::Redis => Arc::new(RedisBackend::from_settings(settings)?),
            CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(Self::new(backend, ClientOptions::from(settings)))
    }

    pub fn downgrade(&self) -> WeakCacheClient {
        WeakCacheClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// True only while connected; every other state short-circuits.
    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    // == Connect ==
    /// Connects with bounded retries and exponential backoff.
    ///
    /// On exhaustion the client is left `Degraded` with a reconnect loop
    /// running, and `Connection` is returned. Callers may ignore it: the
    /// client keeps serving misses in the meantime.
    pub async fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let retry = self.inner.options.retry;
        let mut last_error = String::new();

        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry.delay_for(attempt - 1)).await;
            }

            match self.try_backend_connect().await {
                Ok(()) => {
                    if !self.transition(ConnectionState::Connecting, ConnectionState::Connected) {
                        // disconnect() ran while the attempt was in flight
                        self.inner.backend.disconnect().await;
                        return Err(MarketError::Connection("connect cancelled".to_string()));
                    }
                    info!(
                        backend = self.inner.backend.name(),
                        attempts = attempt + 1,
                        "Cache connected"
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "Cache connect attempt failed");
                    last_error = e.to_string();
                }
            }

            if self.state() == ConnectionState::Disconnected {
                return Err(MarketError::Connection("connect cancelled".to_string()));
            }
        }

        if !self.transition(ConnectionState::Connecting, ConnectionState::Degraded) {
            return Err(MarketError::Connection("connect cancelled".to_string()));
        }
        warn!(
            backend = self.inner.backend.name(),
            attempts = retry.max_retries + 1,
            error = %last_error,
            "Cache unreachable, running degraded"
        );
        self.ensure_reconnecting();

        Err(MarketError::Connection(last_error))
    }

    // == Disconnect ==
    /// Stops reconnecting and closes the connection.
    pub async fn disconnect(&self) {
        self.set_state(ConnectionState::Disconnected);
        if let Some(handle) = lock(&self.inner.reconnect).handle.take() {
            handle.abort();
        }
        self.inner.backend.disconnect().await;
        info!(backend = self.inner.backend.name(), "Cache disconnected");
    }

    // == Get ==
    /// Returns the cached value, or `None` on miss, expiry or unavailability.
    pub async fn get(&self, key: &str) -> Option<String> {
        let value = if self.is_available() {
            self.run("GET", self.inner.backend.get(key)).await.flatten()
        } else {
            None
        };

        if value.is_some() {
            self.inner.stats.record_hit();
        } else {
            self.inner.stats.record_miss();
        }
        value
    }

    // == Set ==
    /// Stores a value with a TTL; a no-op while unavailable.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if !self.is_available() {
            return;
        }

        if self
            .run("SET", self.inner.backend.set(key, value, ttl))
            .await
            .is_some()
        {
            self.inner.stats.record_set();
        }
    }

    // == Delete ==
    /// Removes a key; `false` when absent or unavailable.
    pub async fn delete(&self, key: &str) -> bool {
        if !self.is_available() {
            return false;
        }
        self.run("DEL", self.inner.backend.delete(key))
            .await
            .unwrap_or(false)
    }

    // == Ping ==
    pub async fn ping(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        self.run("PING", self.inner.backend.ping()).await.is_some()
    }

    // == Info ==
    pub async fn info(&self) -> CacheInfo {
        let key_count = if self.is_available() {
            self.run("INFO", self.inner.backend.key_count())
                .await
                .unwrap_or(0)
        } else {
            0
        };

        let stats = self.inner.stats.snapshot();
        let state = self.state();
        CacheInfo {
            backend: self.inner.backend.name(),
            state,
            connected: state == ConnectionState::Connected,
            key_count,
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            errors: stats.errors,
        }
    }

    // == Reconnect ==
    /// One reconnect attempt, used by the background loop.
    pub async fn reconnect_once(&self) -> ReconnectOutcome {
        if self.state() != ConnectionState::Degraded {
            return ReconnectOutcome::Stopped;
        }

        match self.try_backend_connect().await {
            Ok(()) => {
                if self.transition(ConnectionState::Degraded, ConnectionState::Connected) {
                    info!(backend = self.inner.backend.name(), "Cache connection restored");
                    ReconnectOutcome::Connected
                } else {
                    ReconnectOutcome::Stopped
                }
            }
            Err(e) => {
                debug!(error = %e, "Cache reconnect attempt failed");
                ReconnectOutcome::Failed
            }
        }
    }

    async fn try_backend_connect(&self) -> Result<()> {
        match tokio::time::timeout(
            self.inner.options.connect_timeout,
            self.inner.backend.connect(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MarketError::Connection("connect timed out".to_string())),
        }
    }

    /// Runs a backend call under the operation timeout, absorbing failures.
    async fn run<T>(&self, op: &'static str, call: impl Future<Output = Result<T>>) -> Option<T> {
        let error = match tokio::time::timeout(self.inner.options.op_timeout, call).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.inner.options.op_timeout),
        };

        self.inner.stats.record_error();
        self.mark_degraded(op, &error);
        None
    }

    /// Moves Connected -> Degraded, logging only on the transition.
    fn mark_degraded(&self, op: &'static str, error: &str) {
        if self.transition(ConnectionState::Connected, ConnectionState::Degraded) {
            warn!(
                backend = self.inner.backend.name(),
                op,
                error,
                "Cache operation failed, switching to degraded mode"
            );
            self.ensure_reconnecting();
        } else {
            debug!(op, error, "Cache operation failed while not connected");
        }
    }

    /// Starts the reconnect loop unless one is still running.
    ///
    /// A running loop re-checks the state under the slot lock before it
    /// exits, so a client that degrades again is never left without one.
    fn ensure_reconnecting(&self) {
        let mut slot = lock(&self.inner.reconnect);
        if slot
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }
        slot.generation += 1;
        slot.handle = Some(spawn_reconnect_task(
            self.downgrade(),
            self.inner.options.retry,
            slot.generation,
        ));
    }

    /// Asked by the reconnect loop of `generation` before it exits.
    ///
    /// Returns `true` while the client is degraded, so the loop keeps going.
    /// Otherwise the loop's slot is released and it must stop.
    pub(crate) fn reconnect_still_needed(&self, generation: u64) -> bool {
        let mut slot = lock(&self.inner.reconnect);
        if slot.generation != generation {
            return false;
        }
        if self.state() == ConnectionState::Degraded {
            return true;
        }
        slot.handle = None;
        false
    }

    fn set_state(&self, next: ConnectionState) {
        *lock(&self.inner.state) = next;
    }

    /// Moves `from -> to` atomically; `false` if the state was not `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut state = lock(&self.inner.state);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}
