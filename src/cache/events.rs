//! Domain Event Consumer
//!
//! Maps "aggregate changed" events onto namespace-wide evictions. An event
//! for aggregate type `book` clears every namespace routed to it, in both
//! tiers, and tells every peer to clear its local copy.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::coordinator::{EvictionReport, TieredCacheCoordinator};
use crate::cache::key::CacheNamespace;
use crate::error::Result;

/// A change notification from the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateChanged {
    pub aggregate_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,
}

impl AggregateChanged {
    pub fn new(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.aggregate_id = Some(id.into());
        self
    }
}

/// Routes aggregate types to the namespaces caching them.
pub struct DomainEventHandler {
    coordinator: Arc<TieredCacheCoordinator>,
    routes: HashMap<String, Vec<CacheNamespace>>,
}

impl DomainEventHandler {
    pub fn new(coordinator: Arc<TieredCacheCoordinator>) -> Self {
        Self {
            coordinator,
            routes: HashMap::new(),
        }
    }

    /// Adds `namespaces` to the route for `aggregate_type`.
    pub fn with_route(
        mut self,
        aggregate_type: impl Into<String>,
        namespaces: impl IntoIterator<Item = CacheNamespace>,
    ) -> Self {
        self.routes
            .entry(aggregate_type.into())
            .or_default()
            .extend(namespaces);
        self
    }

    /// Namespaces an aggregate type maps to. Unrouted types map to the
    /// namespace of the same name.
    pub fn resolve(&self, aggregate_type: &str) -> Result<Vec<CacheNamespace>> {
        match self.routes.get(aggregate_type) {
            Some(namespaces) => Ok(namespaces.clone()),
            None => Ok(vec![CacheNamespace::new(aggregate_type)?]),
        }
    }

    /// Evicts every namespace the event maps to. Fails only when the
    /// aggregate type cannot name a namespace; tier failures degrade as
    /// usual and show up in the reports.
    pub async fn handle(&self, event: &AggregateChanged) -> Result<Vec<EvictionReport>> {
        let namespaces = self.resolve(&event.aggregate_type)?;
        let mut reports = Vec::with_capacity(namespaces.len());

        for namespace in &namespaces {
            reports.push(self.coordinator.evict_namespace(namespace).await);
        }

        info!(
            aggregate_type = %event.aggregate_type,
            aggregate_id = ?event.aggregate_id,
            namespaces = namespaces.len(),
            "Domain event applied"
        );
        Ok(reports)
    }
}
