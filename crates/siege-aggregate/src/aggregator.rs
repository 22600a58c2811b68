//! Deduplicating schema store and metric sink.
//!
//! Each reassembled pair is parsed back into request and response, its path
//! normalized, and its metrics recorded. Pairs that describe API shape also
//! produce an OpenAPI-style `Paths` fragment; fragments are deduplicated by
//! content digest so the collector only ever sees a shape once.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use siege_core::collector::ApiEvent;
use siege_core::endpoint::{normalize_path, EndpointKey};
use siege_core::http1::{self, Status};
use siege_core::pair::HttpPair;
use siege_schema::{infer, paths_fragment, OperationParts};
use tracing::{debug, warn};

use crate::decode::decode_body;
use crate::event::extract_event;
use crate::metrics::MetricRegistry;

pub struct Aggregator {
    /// Digests of every schema serialization ever queued, for the process
    /// lifetime.
    schemas_seen: HashSet<[u8; 16]>,
    /// Serializations not yet acknowledged by the collector.
    schemas_to_send: Vec<String>,
    events_to_send: Vec<ApiEvent>,
    metrics: MetricRegistry,
}

impl Aggregator {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            schemas_seen: HashSet::new(),
            schemas_to_send: Vec::new(),
            events_to_send: Vec::new(),
            metrics: MetricRegistry::new()?,
        })
    }

    /// Fold one reassembled pair into metrics and, when it describes API
    /// shape, into the schema queue.
    pub fn ingest(&mut self, pair: &HttpPair) {
        let request = match http1::parse_request(&pair.request) {
            Ok(Status::Complete { message, .. }) => message,
            other => {
                // The framer validated this blob; anything else is a bug
                // upstream, not a capture artifact.
                warn!(?other, "dropping pair with unparseable request blob");
                return;
            }
        };
        let response = match http1::parse_response(&pair.response, Some(&request), true) {
            Ok(Status::Complete { message, .. }) => message,
            other => {
                warn!(?other, "dropping pair with unparseable response blob");
                return;
            }
        };

        let normalized = normalize_path(request.path());
        let key = EndpointKey {
            path: normalized.path.clone(),
            method: request.method.clone(),
            status: response.status,
        };
        debug!(endpoint = %key, "observed pair");

        let payload_mb = (pair.request.len() + pair.response.len()) as f64 / 1_000_000.0;
        self.metrics
            .observe(&key, pair.duration.as_secs_f64(), payload_mb);

        // Server errors say nothing about the intended API shape.
        if (500..600).contains(&response.status) {
            return;
        }

        // A rejected request body is not evidence of the endpoint's schema
        // either, so 400 responses only describe their response side.
        let request_json = if response.status == 400 {
            None
        } else {
            json_body(&request.headers, &request.body)
        };
        let response_json = json_body(&response.headers, &response.body);

        let request_schema = request_json.as_ref().map(infer);
        let response_schema = response_json.as_ref().map(infer);

        let fragment = paths_fragment(&OperationParts {
            method: &request.method,
            status: response.status,
            path: &normalized,
            request_header_names: &header_names(&request.headers),
            response_header_names: &header_names(&response.headers),
            request_schema: request_schema.as_ref(),
            response_schema: response_schema.as_ref(),
        });
        self.queue_schema(&fragment);

        if let Some(body) = &response_json {
            self.queue_event(body, &key);
        }
    }

    fn queue_schema(&mut self, fragment: &Value) {
        let serialized = fragment.to_string();
        let digest = md5::compute(serialized.as_bytes()).0;
        if self.schemas_seen.insert(digest) {
            self.schemas_to_send.push(serialized);
        }
    }

    fn queue_event(&mut self, body: &Value, key: &EndpointKey) {
        let mut api = Map::new();
        api.insert("path".to_string(), Value::String(key.path.clone()));
        api.insert("method".to_string(), Value::String(key.method.clone()));
        api.insert("status".to_string(), Value::from(key.status));

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let operation = format!("{} {}", key.method, key.path);
        if let Some(event) = extract_event(body, &operation, api, timestamp) {
            self.events_to_send.push(event);
        }
    }

    /// Hand the pending queues to a publish attempt. On failure the caller
    /// puts them back with [`restore_pending`][Self::restore_pending].
    pub fn take_pending(&mut self) -> (Vec<String>, Vec<ApiEvent>) {
        (
            std::mem::take(&mut self.schemas_to_send),
            std::mem::take(&mut self.events_to_send),
        )
    }

    /// Requeue a failed publish batch ahead of anything queued since.
    pub fn restore_pending(&mut self, mut schemas: Vec<String>, mut events: Vec<ApiEvent>) {
        schemas.append(&mut self.schemas_to_send);
        self.schemas_to_send = schemas;
        events.append(&mut self.events_to_send);
        self.events_to_send = events;
    }

    pub fn pending_schemas(&self) -> usize {
        self.schemas_to_send.len()
    }

    /// Current metric snapshot in Prometheus text format.
    pub fn metrics_text(&self) -> String {
        self.metrics.render()
    }
}

fn header_names(headers: &[(String, String)]) -> Vec<String> {
    headers.iter().map(|(k, _)| k.clone()).collect()
}

/// Decode and parse a JSON body, if there is one. Decompression failures and
/// invalid JSON are logged and treated as "no body"; the pair still counts
/// toward metrics.
fn json_body(headers: &[(String, String)], body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    let content_type = http1::header(headers, "content-type").unwrap_or("");
    if !content_type.contains("json") {
        return None;
    }
    let encoding = http1::header(headers, "content-encoding").unwrap_or("");
    let decoded = match decode_body(encoding, body) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "could not decode body, skipping schema");
            return None;
        }
    };
    match serde_json::from_slice(&decoded) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "body declared json but did not parse");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn pair(request: &[u8], response: &[u8]) -> HttpPair {
        HttpPair {
            request: request.to_vec(),
            response: response.to_vec(),
            duration: Duration::from_millis(20),
        }
    }

    fn widget_post() -> HttpPair {
        let body = br#"{"id":"1","title":"t","description":"d"}"#;
        let request = format!(
            "POST /widget HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let mut request = request.into_bytes();
        request.extend_from_slice(body);
        let response = format!(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let mut response = response.into_bytes();
        response.extend_from_slice(body);
        pair(&request, &response)
    }

    fn sample_value(text: &str, metric: &str, labels: &[&str]) -> Option<f64> {
        text.lines()
            .filter(|l| l.starts_with(metric) && labels.iter().all(|f| l.contains(f)))
            .find_map(|l| l.rsplit(' ').next()?.parse().ok())
    }

    #[test]
    fn test_simple_post_queues_one_schema_and_counts() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&widget_post());

        assert_eq!(agg.pending_schemas(), 1);
        let total = sample_value(
            &agg.metrics_text(),
            "siege_listener_http_response_total",
            &[r#"path="/widget""#, r#"method="POST""#, r#"status="201""#],
        );
        assert_eq!(total, Some(1.0));

        let schema = &agg.take_pending().0[0];
        assert!(schema.starts_with(r#"{"/widget":{"post":"#));
        assert!(schema.contains(r#""requestBody""#));
        assert!(schema.contains(r#""responses":{"201""#));
    }

    #[test]
    fn test_repeated_shape_not_requeued() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&widget_post());
        agg.ingest(&widget_post());
        assert_eq!(agg.pending_schemas(), 1);

        let total = sample_value(
            &agg.metrics_text(),
            "siege_listener_http_response_total",
            &[r#"path="/widget""#],
        );
        assert_eq!(total, Some(2.0));
    }

    #[test]
    fn test_dedup_survives_publish() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&widget_post());
        let _ = agg.take_pending();
        agg.ingest(&widget_post());
        assert_eq!(agg.pending_schemas(), 0);
    }

    #[test]
    fn test_numeric_and_uuid_paths_share_an_endpoint() {
        let mut agg = Aggregator::new().unwrap();
        let res = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
        agg.ingest(&pair(b"GET /users/7 HTTP/1.1\r\n\r\n", res));
        agg.ingest(&pair(
            b"GET /users/550e8400-e29b-41d4-a716-446655440000 HTTP/1.1\r\n\r\n",
            res,
        ));

        let total = sample_value(
            &agg.metrics_text(),
            "siege_listener_http_response_total",
            &[r#"path="/users/{arg1}""#, r#"method="GET""#],
        );
        assert_eq!(total, Some(2.0));
        // Same method and status but different parameter types, so the two
        // fragments differ and both queue.
        assert_eq!(agg.pending_schemas(), 2);
    }

    #[test]
    fn test_server_errors_record_metrics_but_no_schema() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&pair(
            b"GET /widget HTTP/1.1\r\n\r\n",
            b"HTTP/1.1 503 Unavailable\r\nContent-Length: 0\r\n\r\n",
        ));

        assert_eq!(agg.pending_schemas(), 0);
        let total = sample_value(
            &agg.metrics_text(),
            "siege_listener_http_response_total",
            &[r#"status="503""#],
        );
        assert_eq!(total, Some(1.0));
    }

    #[test]
    fn test_bad_request_omits_request_body_schema() {
        let mut agg = Aggregator::new().unwrap();
        let body = br#"{"bad":"input"}"#;
        let request = format!(
            "POST /widget HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let mut request = request.into_bytes();
        request.extend_from_slice(body);
        agg.ingest(&pair(
            &request,
            b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n",
        ));

        assert_eq!(agg.pending_schemas(), 1);
        let schema = &agg.take_pending().0[0];
        assert!(!schema.contains("requestBody"));
    }

    #[test]
    fn test_gzip_response_body_infers_schema() {
        let mut agg = Aggregator::new().unwrap();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(br#"{"ok":true}"#).unwrap();
        let gz = enc.finish().unwrap();

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
            gz.len()
        );
        let mut response = response.into_bytes();
        response.extend_from_slice(&gz);
        agg.ingest(&pair(b"GET /health HTTP/1.1\r\n\r\n", &response));

        let schema = &agg.take_pending().0[0];
        assert!(schema.contains(r#""ok":{"type":"boolean"}"#));
    }

    #[test]
    fn test_chunked_gzip_response_infers_schema() {
        let mut agg = Aggregator::new().unwrap();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(br#"{"ok":true}"#).unwrap();
        let gz = enc.finish().unwrap();

        // The gzip bytes arrive split over two chunks.
        let (a, b) = gz.split_at(gz.len() / 2);
        let mut response = Vec::new();
        response.extend_from_slice(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Encoding: gzip\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        for chunk in [a, b] {
            response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            response.extend_from_slice(chunk);
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"0\r\n\r\n");

        agg.ingest(&pair(b"GET /health HTTP/1.1\r\n\r\n", &response));

        let (schemas, _) = agg.take_pending();
        assert_eq!(schemas.len(), 1);
        let fragment: Value = serde_json::from_str(&schemas[0]).unwrap();
        let schema = &fragment["/health"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"];
        assert_eq!(
            schema,
            &serde_json::json!({
                "type": "object",
                "properties": { "ok": { "type": "boolean" } },
                "required": ["ok"],
            })
        );
    }

    #[test]
    fn test_non_json_body_still_counts() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&pair(
            b"GET /page HTTP/1.1\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 6\r\n\r\n<html>",
        ));

        assert_eq!(agg.pending_schemas(), 1);
        let schema = &agg.take_pending().0[0];
        assert!(!schema.contains("application/json"));
        let total = sample_value(
            &agg.metrics_text(),
            "siege_listener_http_response_total",
            &[r#"path="/page""#],
        );
        assert_eq!(total, Some(1.0));
    }

    #[test]
    fn test_invalid_json_body_still_counts() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&pair(
            b"GET /x HTTP/1.1\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\n\r\n{not json",
        ));
        let total = sample_value(
            &agg.metrics_text(),
            "siege_listener_http_response_total",
            &[r#"path="/x""#],
        );
        assert_eq!(total, Some(1.0));
        // Fragment queues without a schema for the unparseable body.
        assert_eq!(agg.pending_schemas(), 1);
    }

    #[test]
    fn test_response_ids_become_events() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&widget_post());
        let (_, events) = agg.take_pending();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation_name, "POST /widget");
        assert_eq!(events[0].primary_id["id"], serde_json::json!("1"));
        assert_eq!(events[0].api["path"], serde_json::json!("/widget"));
    }

    #[test]
    fn test_restore_pending_preserves_order() {
        let mut agg = Aggregator::new().unwrap();
        agg.ingest(&widget_post());
        let (schemas, events) = agg.take_pending();
        agg.ingest(&pair(
            b"GET /other HTTP/1.1\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
        ));
        agg.restore_pending(schemas, events);
        let (schemas, _) = agg.take_pending();
        assert_eq!(schemas.len(), 2);
        assert!(schemas[0].contains("/widget"));
        assert!(schemas[1].contains("/other"));
    }
}
