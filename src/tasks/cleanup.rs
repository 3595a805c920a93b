//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of the
//! local tier. Reads already ignore expired entries; the sweep only frees
//! memory held by keys nobody reads anymore.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LocalTier;

/// Spawns a background task that removes expired local entries every
/// `cleanup_interval_secs` seconds.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let local = Arc::new(LocalTier::new(10_000));
/// let cleanup_handle = spawn_cleanup_task(local.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(local: Arc<LocalTier>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = local.cleanup_expired();

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
