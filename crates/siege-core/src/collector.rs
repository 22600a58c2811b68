//! The remote collector seam.
//!
//! The publish loop only ever talks to this trait, so tests can substitute an
//! in-memory collector and the HTTP client lives in its own crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CollectorError;

/// One periodic update: every schema serialization not yet acknowledged, a
/// metrics snapshot in Prometheus text format, and any extracted events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerUpdate {
    #[serde(rename = "listenerID")]
    pub listener_id: String,
    pub schemas: Vec<String>,
    pub metrics: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ApiEvent>,
}

/// Identifier-bearing values extracted from an observed response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEvent {
    #[serde(rename = "primaryID")]
    pub primary_id: Map<String, Value>,
    pub ids: Map<String, Value>,
    #[serde(rename = "operationName")]
    pub operation_name: String,
    pub timestamp: i64,
    pub data: Map<String, Value>,
    pub api: Map<String, Value>,
}

#[async_trait]
pub trait Collector: Send + Sync {
    /// Register this listener; returns the collector-assigned listener id.
    async fn startup(&self) -> Result<String, CollectorError>;

    /// Best-effort deregistration at shutdown.
    async fn shutdown(&self, listener_id: &str) -> Result<(), CollectorError>;

    /// Push one periodic update.
    async fn update(&self, update: &ListenerUpdate) -> Result<(), CollectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_omits_empty_events() {
        let update = ListenerUpdate {
            listener_id: "lst-1".to_string(),
            schemas: vec!["{}".to_string()],
            metrics: String::new(),
            events: Vec::new(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("events").is_none());
        assert_eq!(json["listenerID"], "lst-1");
    }

    #[test]
    fn test_update_keeps_nonempty_events() {
        let mut event = ApiEvent::default();
        event.operation_name = "GET /users/{arg1}".to_string();
        let update = ListenerUpdate {
            listener_id: "lst-1".to_string(),
            schemas: Vec::new(),
            metrics: String::new(),
            events: vec![event],
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["events"][0]["operationName"], "GET /users/{arg1}");
        assert!(json["events"][0].get("primaryID").is_some());
    }
}
