//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tokio::sync::mpsc;

use crate::cache::{AggregateChanged, CacheKey, CacheNamespace, DomainEventHandler, TieredCacheCoordinator};
use crate::error::{CacheError, Result};
use crate::models::{
    BackendHealth, EventAcceptedResponse, EventRequest, EvictionResponse, HealthResponse,
    StatsResponse,
};
use crate::runtime::CacheRuntime;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TieredCacheCoordinator>,
    /// Used to reject events that map to no valid namespace before queueing
    pub events: Arc<DomainEventHandler>,
    /// Queue drained by the domain event consumer task
    pub event_tx: mpsc::Sender<AggregateChanged>,
}

impl AppState {
    /// Creates a new AppState over a wired runtime and the sender side of
    /// the event consumer's channel.
    pub fn new(runtime: &CacheRuntime, event_tx: mpsc::Sender<AggregateChanged>) -> Self {
        Self {
            coordinator: runtime.coordinator.clone(),
            events: runtime.events.clone(),
            event_tx,
        }
    }
}

/// Handler for DELETE /cache/:namespace
///
/// Clears a namespace in both tiers and tells every peer to follow.
pub async fn evict_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<EvictionResponse>> {
    let namespace = CacheNamespace::new(namespace)?;
    let report = state.coordinator.evict_namespace(&namespace).await;

    Ok(Json(EvictionResponse::namespace(namespace.as_str(), report)))
}

/// Handler for DELETE /cache/:namespace/:key
///
/// Evicts a single derived key from both tiers and every peer.
pub async fn evict_key_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<EvictionResponse>> {
    let namespace = CacheNamespace::new(namespace)?;
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }

    let cache_key = CacheKey::new(namespace.clone(), key.as_str());
    let report = state.coordinator.evict_key(&cache_key).await;

    Ok(Json(EvictionResponse::key(namespace.as_str(), key, report)))
}

/// Handler for POST /events
///
/// Queues an aggregate-changed event for the consumer task.
pub async fn event_handler(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<EventAcceptedResponse>)> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let event = req.into_event();
    state.events.resolve(&event.aggregate_type)?;

    let aggregate_type = event.aggregate_type.clone();
    state
        .event_tx
        .send(event)
        .await
        .map_err(|_| CacheError::Internal("Event consumer is not running".to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAcceptedResponse::new(aggregate_type)),
    ))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let coordinator = &state.coordinator;
    Json(StatsResponse::new(coordinator.instance_id(), coordinator.stats()))
}

/// Handler for GET /health
///
/// Always 200; reports "degraded" while the distributed tier is down,
/// since the cache keeps serving from the local tier.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;
    let distributed = BackendHealth {
        backend: coordinator.distributed().backend_name().to_string(),
        available: coordinator.distributed().is_available().await,
    };

    Json(HealthResponse::new(
        coordinator.instance_id(),
        distributed,
        coordinator.bus().backend_name(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BroadcastBus, InMemoryStore};
    use crate::config::Config;
    use std::time::Duration;

    fn test_state() -> (AppState, mpsc::Receiver<AggregateChanged>) {
        let runtime = CacheRuntime::with_backends(
            &Config::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(BroadcastBus::default()),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(8);
        (AppState::new(&runtime, tx), rx)
    }

    fn books_key(derived: &str) -> CacheKey {
        CacheKey::new(CacheNamespace::new("books").unwrap(), derived)
    }

    #[tokio::test]
    async fn test_evict_namespace_handler() {
        let (state, _rx) = test_state();
        state.coordinator.put(&books_key("1"), &"a").await;
        state.coordinator.put(&books_key("2"), &"b").await;

        let response = evict_namespace_handler(State(state.clone()), Path("books".to_string()))
            .await
            .unwrap();

        assert_eq!(response.local_removed, 2);
        assert_eq!(response.distributed_removed, Some(2));
        assert!(state.coordinator.local().is_empty());
    }

    #[tokio::test]
    async fn test_evict_namespace_invalid() {
        let (state, _rx) = test_state();
        let result = evict_namespace_handler(State(state), Path("bad ns".to_string())).await;
        assert!(matches!(result, Err(CacheError::InvalidNamespace(_))));
    }

    #[tokio::test]
    async fn test_evict_key_handler() {
        let (state, _rx) = test_state();
        state.coordinator.put(&books_key("findById:1"), &"a").await;

        let response = evict_key_handler(
            State(state.clone()),
            Path(("books".to_string(), "findById:1".to_string())),
        )
        .await
        .unwrap();

        assert_eq!(response.local_removed, 1);
        assert_eq!(response.key.as_deref(), Some("findById:1"));
        assert!(!state.coordinator.local().contains(&books_key("findById:1")));
    }

    #[tokio::test]
    async fn test_event_handler_queues_event() {
        let (state, mut rx) = test_state();
        let req = EventRequest {
            aggregate_type: "books".to_string(),
            aggregate_id: Some("7".to_string()),
        };

        let (status, _) = event_handler(State(state), Json(req)).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        let queued = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queued, AggregateChanged::new("books").with_id("7"));
    }

    #[tokio::test]
    async fn test_event_handler_rejects_unroutable_type() {
        let (state, _rx) = test_state();
        let req = EventRequest {
            aggregate_type: "not valid".to_string(),
            aggregate_id: None,
        };
        let result = event_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidNamespace(_))));
    }

    #[tokio::test]
    async fn test_event_handler_consumer_gone() {
        let (state, rx) = test_state();
        drop(rx);
        let req = EventRequest {
            aggregate_type: "books".to_string(),
            aggregate_id: None,
        };
        let result = event_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::Internal(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _rx) = test_state();
        let response = stats_handler(State(state)).await;
        assert_eq!(response.coordinator.lookups, 0);
        assert_eq!(response.hit_rate, 0.0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (state, _rx) = test_state();
        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.distributed.backend, "memory");
        assert_eq!(response.bus, "broadcast");
    }
}
