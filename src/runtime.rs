//! Cache Runtime
//!
//! Builds the coordinator and domain event handler from [`Config`].
//!
//! ## Backends
//!
//! - **`REDIS_URL` unset**: in-process [`InMemoryStore`] and [`BroadcastBus`]
//! - **`REDIS_URL` set**: [`RedisStore`] and [`RedisBus`]; if Redis cannot be
//!   reached at startup the runtime falls back to the in-process backends
//!   so the service still starts

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{
    BroadcastBus, DistributedStore, DomainEventHandler, InMemoryStore, InvalidationBus, LocalTier,
    RedisBus, RedisStore, TieredCacheCoordinator,
};
use crate::config::Config;
use crate::error::Result;

/// Fully wired cache subsystem for one process.
pub struct CacheRuntime {
    pub coordinator: Arc<TieredCacheCoordinator>,
    pub events: Arc<DomainEventHandler>,
}

impl CacheRuntime {
    /// Wires the cache from configuration. Fails only on invalid namespace
    /// names in the policy or event route settings.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (store, bus) = connect_backends(config).await;
        Self::with_backends(config, store, bus)
    }

    /// Wires the cache over caller-supplied backends.
    pub fn with_backends(
        config: &Config,
        store: Arc<dyn DistributedStore>,
        bus: Arc<dyn InvalidationBus>,
    ) -> Result<Self> {
        let local = Arc::new(LocalTier::new(config.local_max_entries));

        let coordinator = Arc::new(
            TieredCacheCoordinator::builder(local, store, bus)
                .instance_id(config.instance_id.clone())
                .policies(config.policy_registry()?)
                .distributed_timeout(config.distributed_timeout())
                .bulk_timeout(config.distributed_bulk_timeout())
                .apply_own_invalidations(config.apply_own_invalidations)
                .build(),
        );

        let events = config
            .resolved_event_routes()?
            .into_iter()
            .fold(
                DomainEventHandler::new(coordinator.clone()),
                |handler, (aggregate_type, namespaces)| handler.with_route(aggregate_type, namespaces),
            );

        Ok(Self {
            coordinator,
            events: Arc::new(events),
        })
    }
}

async fn connect_backends(config: &Config) -> (Arc<dyn DistributedStore>, Arc<dyn InvalidationBus>) {
    let Some(url) = config.redis_url.as_deref() else {
        info!("Redis not configured, using in-process distributed tier and bus");
        return in_process_backends();
    };

    info!("Connecting to Redis");
    let connected = tokio::try_join!(
        RedisStore::connect(url, config.redis_key_prefix.as_str()),
        RedisBus::connect(url, &config.redis_key_prefix),
    );

    match connected {
        Ok((store, bus)) => {
            info!("Connected to Redis successfully");
            (Arc::new(store), Arc::new(bus))
        }
        Err(e) => {
            warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process tiers."
            );
            in_process_backends()
        }
    }
}

fn in_process_backends() -> (Arc<dyn DistributedStore>, Arc<dyn InvalidationBus>) {
    (
        Arc::new(InMemoryStore::new()),
        Arc::new(BroadcastBus::default()),
    )
}
