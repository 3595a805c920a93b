//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::AggregateChanged;

/// Request body for POST /events
///
/// # Fields
/// - `aggregate_type`: The changed aggregate type ("book", "category", ...)
/// - `aggregate_id`: Optional id of the changed aggregate, logged only
#[derive(Debug, Clone, Deserialize)]
pub struct EventRequest {
    /// The changed aggregate type
    pub aggregate_type: String,
    /// Optional aggregate id
    #[serde(default)]
    pub aggregate_id: Option<String>,
}

impl EventRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.aggregate_type.trim().is_empty() {
            return Some("aggregate_type cannot be empty".to_string());
        }
        None
    }

    pub fn into_event(self) -> AggregateChanged {
        AggregateChanged {
            aggregate_type: self.aggregate_type.trim().to_string(),
            aggregate_id: self.aggregate_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_request_deserialize() {
        let json = r#"{"aggregate_type": "book", "aggregate_id": "42"}"#;
        let req: EventRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.aggregate_type, "book");
        assert_eq!(req.aggregate_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_event_request_without_id() {
        let json = r#"{"aggregate_type": "book"}"#;
        let req: EventRequest = serde_json::from_str(json).unwrap();
        assert!(req.aggregate_id.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_empty_type() {
        let req = EventRequest {
            aggregate_type: "  ".to_string(),
            aggregate_id: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_into_event_trims() {
        let req = EventRequest {
            aggregate_type: " book ".to_string(),
            aggregate_id: Some("1".to_string()),
        };
        assert_eq!(req.into_event(), AggregateChanged::new("book").with_id("1"));
    }
}
