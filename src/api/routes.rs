//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    event_handler, evict_key_handler, evict_namespace_handler, health_handler, stats_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check, including distributed tier reachability
/// - `GET /stats` - Tier and coordinator statistics
/// - `DELETE /cache/:namespace` - Clear a namespace on every instance
/// - `DELETE /cache/:namespace/:key` - Evict one derived key on every instance
/// - `POST /events` - Submit an aggregate-changed event
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/cache/:namespace", delete(evict_namespace_handler))
        .route("/cache/:namespace/:key", delete(evict_key_handler))
        .route("/events", post(event_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
