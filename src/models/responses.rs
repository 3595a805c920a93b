//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, CoordinatorStats, EvictionReport, TierStats};

/// Response body for DELETE /cache/:namespace and DELETE /cache/:namespace/:key
#[derive(Debug, Clone, Serialize)]
pub struct EvictionResponse {
    /// Success message
    pub message: String,
    pub namespace: String,
    /// The evicted key, absent for namespace clears
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub local_removed: usize,
    /// `null` when the distributed tier could not be reached
    pub distributed_removed: Option<u64>,
    /// Whether peers were notified
    pub published: bool,
}

impl EvictionResponse {
    /// Creates a response for a namespace clear
    pub fn namespace(namespace: impl Into<String>, report: EvictionReport) -> Self {
        let namespace = namespace.into();
        Self {
            message: format!("Namespace '{}' cleared", namespace),
            namespace,
            key: None,
            local_removed: report.local_removed,
            distributed_removed: report.distributed_removed,
            published: report.published,
        }
    }

    /// Creates a response for a single key eviction
    pub fn key(namespace: impl Into<String>, key: impl Into<String>, report: EvictionReport) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' evicted", key),
            namespace: namespace.into(),
            key: Some(key),
            local_removed: report.local_removed,
            distributed_removed: report.distributed_removed,
            published: report.published,
        }
    }
}

/// Response body for POST /events
#[derive(Debug, Clone, Serialize)]
pub struct EventAcceptedResponse {
    pub message: String,
    pub aggregate_type: String,
}

impl EventAcceptedResponse {
    pub fn new(aggregate_type: impl Into<String>) -> Self {
        let aggregate_type = aggregate_type.into();
        Self {
            message: format!("Event for '{}' queued", aggregate_type),
            aggregate_type,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub instance_id: String,
    pub local: TierStats,
    pub distributed: TierStats,
    pub coordinator: CoordinatorStats,
    /// Share of lookups served from any tier
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a cache statistics snapshot
    pub fn new(instance_id: impl Into<String>, stats: CacheStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self {
            instance_id: instance_id.into(),
            local: stats.local,
            distributed: stats.distributed,
            coordinator: stats.coordinator,
            hit_rate,
        }
    }
}

/// Distributed tier section of the health response
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub backend: String,
    pub available: bool,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" while the distributed tier is unreachable
    pub status: String,
    pub instance_id: String,
    pub distributed: BackendHealth,
    /// Invalidation bus backend name
    pub bus: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn new(
        instance_id: impl Into<String>,
        distributed: BackendHealth,
        bus: impl Into<String>,
    ) -> Self {
        let status = if distributed.available {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            instance_id: instance_id.into(),
            distributed,
            bus: bus.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> EvictionReport {
        EvictionReport {
            local_removed: 2,
            distributed_removed: None,
            published: true,
        }
    }

    #[test]
    fn test_namespace_eviction_serialize() {
        let resp = EvictionResponse::namespace("books", report());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["namespace"], "books");
        assert_eq!(json["local_removed"], 2);
        assert!(json["distributed_removed"].is_null());
        assert!(json.get("key").is_none());
    }

    #[test]
    fn test_key_eviction_serialize() {
        let resp = EvictionResponse::key("books", "findById:1", report());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("findById:1"));
        assert!(json.contains("evicted"));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let mut stats = CacheStats::default();
        stats.coordinator.lookups = 10;
        stats.coordinator.misses = 2;
        let resp = StatsResponse::new("node-a", stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::new("node-a", CacheStats::default());
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_status() {
        let healthy = HealthResponse::new(
            "node-a",
            BackendHealth {
                backend: "memory".into(),
                available: true,
            },
            "broadcast",
        );
        assert_eq!(healthy.status, "healthy");

        let degraded = HealthResponse::new(
            "node-a",
            BackendHealth {
                backend: "redis".into(),
                available: false,
            },
            "redis",
        );
        assert_eq!(degraded.status, "degraded");
        let json = serde_json::to_string(&degraded).unwrap();
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
