//! HTTP client for the remote collector.
//!
//! JSON over HTTPS with a bearer token. Registration is given a generous
//! timeout because it gates startup; deregistration gets a short one because
//! the process is already on its way out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use siege_core::collector::{Collector, ListenerUpdate};
use siege_core::error::CollectorError;
use tracing::debug;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(45);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CollectorClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StartupResponse {
    #[serde(rename = "listenerID")]
    listener_id: String,
}

impl CollectorClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, CollectorError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CollectorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, CollectorError> {
        let mut request = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CollectorError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CollectorError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Collector for CollectorClient {
    async fn startup(&self) -> Result<String, CollectorError> {
        let response = self
            .post("/api/v1/listener/startup", &json!({}), Some(STARTUP_TIMEOUT))
            .await?;
        let config: StartupResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::Malformed(e.to_string()))?;
        debug!(listener_id = %config.listener_id, "registered with collector");
        Ok(config.listener_id)
    }

    async fn shutdown(&self, listener_id: &str) -> Result<(), CollectorError> {
        self.post(
            "/api/v1/listener/shutdown",
            &json!({ "listenerID": listener_id }),
            Some(SHUTDOWN_TIMEOUT),
        )
        .await?;
        Ok(())
    }

    async fn update(&self, update: &ListenerUpdate) -> Result<(), CollectorError> {
        let body = serde_json::to_value(update)
            .map_err(|e| CollectorError::Malformed(e.to_string()))?;
        self.post("/api/v1/listener/update", &body, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let client = CollectorClient::new("key", "https://collector.example.com/").unwrap();
        assert_eq!(
            client.url("/api/v1/listener/update"),
            "https://collector.example.com/api/v1/listener/update"
        );
    }

    #[test]
    fn test_startup_response_field_name() {
        let parsed: StartupResponse =
            serde_json::from_str(r#"{"listenerID": "lst-42"}"#).unwrap();
        assert_eq!(parsed.listener_id, "lst-42");
    }
}
