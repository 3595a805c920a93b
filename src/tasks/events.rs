//! Domain Event Consumer Task
//!
//! Drains aggregate-changed events from an mpsc channel and hands each one
//! to the [`DomainEventHandler`]. Producers (the admin API, an embedding
//! application's event bus adapter) only ever see the channel sender.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{AggregateChanged, DomainEventHandler};

/// Buffered events before producers start waiting
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Spawns the consumer loop. It ends when every sender is dropped.
pub fn spawn_event_consumer(
    handler: Arc<DomainEventHandler>,
    mut events: mpsc::Receiver<AggregateChanged>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting domain event consumer");

        while let Some(event) = events.recv().await {
            if let Err(e) = handler.handle(&event).await {
                warn!(
                    aggregate_type = %event.aggregate_type,
                    error = %e,
                    "Dropping domain event"
                );
            }
        }

        info!("Domain event channel closed, consumer stopped");
    })
}
