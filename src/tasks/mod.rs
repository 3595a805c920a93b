//! Background Tasks Module
//!
//! Contains the tasks that run alongside the admin server.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired local entries at configured intervals
//! - Invalidation Listener: Applies peer invalidations to the local tier
//! - Event Consumer: Turns domain events into namespace evictions

mod cleanup;
mod events;
mod invalidation;

pub use cleanup::spawn_cleanup_task;
pub use events::{spawn_event_consumer, EVENT_CHANNEL_CAPACITY};
pub use invalidation::{spawn_invalidation_listener, INITIAL_BACKOFF, MAX_BACKOFF};
