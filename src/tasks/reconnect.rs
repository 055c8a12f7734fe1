//! Cache Reconnect Task
//!
//! Background task that re-establishes the cache connection after the
//! client has fallen into degraded mode.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{ReconnectOutcome, RetryPolicy, WeakCacheClient};

/// Spawns a task that retries the cache connection with exponential backoff.
///
/// The task sleeps `policy.delay_for(n)` before attempt `n`, so delays grow
/// from the backoff base up to the configured cap. It exits when the
/// connection is restored, when the client leaves degraded mode (for
/// example after `disconnect()`), or when the last client handle is dropped.
/// Before exiting it checks in with the client under `generation`; if the
/// client degraded again in the meantime the loop starts over instead.
///
/// # Returns
/// A JoinHandle owned by the client, aborted on `disconnect()`.
pub fn spawn_reconnect_task(
    client: WeakCacheClient,
    policy: RetryPolicy,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Starting cache reconnect task");
        let mut attempt: u32 = 0;

        loop {
            tokio::time::sleep(policy.delay_for(attempt)).await;

            let Some(client) = client.upgrade() else {
                debug!("Cache client dropped, reconnect task exiting");
                return;
            };

            match client.reconnect_once().await {
                ReconnectOutcome::Connected => {
                    info!(attempts = attempt + 1, "Cache reconnect succeeded");
                }
                ReconnectOutcome::Stopped => {
                    debug!("Cache no longer degraded, reconnect task exiting");
                }
                ReconnectOutcome::Failed => {
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            }

            if !client.reconnect_still_needed(generation) {
                return;
            }
            debug!("Cache degraded again, reconnect task continuing");
            attempt = 0;
        }
    })
}
