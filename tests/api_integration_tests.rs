//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tiered_cache::cache::{BroadcastBus, CacheKey, CacheNamespace, InMemoryStore};
use tiered_cache::tasks::EVENT_CHANNEL_CAPACITY;
use tiered_cache::{api::create_router, spawn_event_consumer, AppState, CacheRuntime, Config};
use tokio::sync::mpsc;
use tower::ServiceExt;

// == Helper Functions ==

struct TestApp {
    router: Router,
    runtime: CacheRuntime,
    store: InMemoryStore,
}

fn create_test_app() -> TestApp {
    let store = InMemoryStore::new();
    let config = Config {
        instance_id: "test-node".to_string(),
        ..Config::default()
    };
    let runtime = CacheRuntime::with_backends(
        &config,
        Arc::new(store.clone()),
        Arc::new(BroadcastBus::default()),
    )
    .unwrap();

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    spawn_event_consumer(runtime.events.clone(), event_rx);

    let router = create_router(AppState::new(&runtime, event_tx));
    TestApp {
        router,
        runtime,
        store,
    }
}

fn books_key(derived: &str) -> CacheKey {
    CacheKey::new(CacheNamespace::new("books").unwrap(), derived)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn event_request(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

// == Namespace Eviction Tests ==

#[tokio::test]
async fn test_evict_namespace_endpoint_success() {
    let app = create_test_app();
    let coordinator = &app.runtime.coordinator;
    coordinator.put(&books_key("findById:1"), &"Dune").await;
    coordinator.put(&books_key("findById:2"), &"Hyperion").await;

    let response = app
        .router
        .clone()
        .oneshot(delete_request("/cache/books"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["namespace"], "books");
    assert_eq!(json["local_removed"], 2);
    assert_eq!(json["distributed_removed"], 2);
    assert_eq!(json["published"], true);
    assert!(json["message"].as_str().unwrap().contains("books"));

    assert!(coordinator.local().is_empty());
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_evict_namespace_invalid_name() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(delete_request("/cache/bad*ns"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("bad*ns"));
}

// == Key Eviction Tests ==

#[tokio::test]
async fn test_evict_key_endpoint_success() {
    let app = create_test_app();
    let coordinator = &app.runtime.coordinator;
    coordinator.put(&books_key("findById:1"), &"Dune").await;
    coordinator.put(&books_key("findById:2"), &"Hyperion").await;

    let response = app
        .router
        .clone()
        .oneshot(delete_request("/cache/books/findById:1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["key"], "findById:1");
    assert_eq!(json["local_removed"], 1);
    assert_eq!(json["distributed_removed"], 1);

    assert!(!coordinator.local().contains(&books_key("findById:1")));
    assert!(coordinator.local().contains(&books_key("findById:2")));
    assert!(!app.store.contains("books:findById:1"));
}

#[tokio::test]
async fn test_evict_missing_key_is_noop() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(delete_request("/cache/books/nothing-here"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["local_removed"], 0);
    assert_eq!(json["distributed_removed"], 0);
}

// == Domain Event Tests ==

#[tokio::test]
async fn test_event_endpoint_clears_namespace() {
    let app = create_test_app();
    let coordinator = app.runtime.coordinator.clone();
    coordinator.put(&books_key("findAll"), &vec!["Dune"]).await;

    let response = app
        .router
        .oneshot(event_request(r#"{"aggregate_type":"books","aggregate_id":"1"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["aggregate_type"], "books");

    // Eviction happens on the consumer task.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!coordinator.local().contains(&books_key("findAll")));
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_event_endpoint_invalid_json() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(event_request(r#"{"aggregate":"books"}"#))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_event_endpoint_empty_type() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(event_request(r#"{"aggregate_type":"  "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("aggregate_type"));
}

// == STATS Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app();
    let coordinator = &app.runtime.coordinator;
    let key = books_key("count");

    let _: Result<u32, String> = coordinator.get_or_load(&key, || async { Ok(3) }).await;
    let _: Result<u32, String> = coordinator.get_or_load(&key, || async { Ok(3) }).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["instance_id"], "test-node");
    assert_eq!(json["coordinator"]["lookups"], 2);
    assert_eq!(json["coordinator"]["misses"], 1);
    assert_eq!(json["coordinator"]["loads"], 1);
    assert_eq!(json["local"]["hits"], 1);
    assert_eq!(json["local"]["entries"], 1);
    assert_eq!(json["hit_rate"], 0.5);
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["instance_id"], "test-node");
    assert_eq!(json["distributed"]["backend"], "memory");
    assert_eq!(json["distributed"]["available"], true);
    assert_eq!(json["bus"], "broadcast");
    assert!(json.get("timestamp").is_some());
}
