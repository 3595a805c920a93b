//! API Module
//!
//! HTTP handlers and routing for the cache admin API. This is the
//! operational surface of the cache, not a business API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Get cache statistics
//! - `DELETE /cache/:namespace` - Clear a namespace
//! - `DELETE /cache/:namespace/:key` - Evict a single key
//! - `POST /events` - Submit a domain event

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
