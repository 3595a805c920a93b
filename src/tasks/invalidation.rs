//! Invalidation Listener Task
//!
//! Consumes the invalidation bus and applies every message to this
//! instance's local tier. A lost subscription is re-established with
//! exponential backoff; since messages published in the gap are gone, the
//! local tier is flushed after every resubscribe.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{InvalidationBus, InvalidationStream, TieredCacheCoordinator};
use crate::error::Result;

/// First resubscribe delay
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Resubscribe delay ceiling: 5 minutes
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Subscribes to the coordinator's bus and spawns the listener loop.
///
/// The subscription is established before this returns, so messages
/// published afterwards are never missed by a fresh listener.
pub async fn spawn_invalidation_listener(
    coordinator: Arc<TieredCacheCoordinator>,
) -> Result<JoinHandle<()>> {
    let bus = coordinator.bus().clone();
    let stream = bus.subscribe().await?;

    info!(
        backend = bus.backend_name(),
        instance_id = coordinator.instance_id(),
        "Starting invalidation listener"
    );

    Ok(tokio::spawn(listen(coordinator, bus, stream)))
}

async fn listen(
    coordinator: Arc<TieredCacheCoordinator>,
    bus: Arc<dyn InvalidationBus>,
    mut stream: InvalidationStream,
) {
    loop {
        while let Some(message) = stream.next().await {
            if !coordinator.apply_invalidation(&message) {
                debug!(namespace = %message.namespace, "Skipped own invalidation");
            }
        }

        warn!(backend = bus.backend_name(), "Invalidation stream ended, resubscribing");
        stream = resubscribe(bus.as_ref()).await;

        let flushed = coordinator.local().clear_all();
        info!(flushed, "Resubscribed to invalidation bus, local tier flushed");
    }
}

/// Retries `subscribe` until it succeeds, doubling the delay each time.
async fn resubscribe(bus: &dyn InvalidationBus) -> InvalidationStream {
    let mut delay = INITIAL_BACKOFF;
    loop {
        tokio::time::sleep(delay).await;
        match bus.subscribe().await {
            Ok(stream) => return stream,
            Err(e) => {
                delay = next_backoff(delay);
                warn!(
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "Invalidation resubscribe failed"
                );
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
