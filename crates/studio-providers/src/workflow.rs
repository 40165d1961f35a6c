//! Event intake for the durable-workflow platform.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use studio_core::http::{check_response, client, read_json, transport_error};
use studio_core::{now_millis, Result, StudioError};

use crate::traits::EventSink;

const PROVIDER: &str = "inngest";

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    ids: Vec<String>,
}

/// Sends events to `{base}/e/{event_key}`.
pub struct WorkflowClient {
    http: Client,
    base_url: String,
    event_key: String,
}

impl WorkflowClient {
    pub fn new(base_url: &str, event_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: client(Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            event_key: event_key.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/e/{}", self.base_url, self.event_key)
    }
}

fn event_body(name: &str, data: Value, ts: u64) -> Value {
    json!({ "name": name, "data": data, "ts": ts })
}

#[async_trait]
impl EventSink for WorkflowClient {
    async fn send(&self, name: &str, data: Value) -> Result<Vec<String>> {
        if name.trim().is_empty() {
            return Err(StudioError::invalid_argument("Event name is required"));
        }

        let resp = self
            .http
            .post(self.url())
            .json(&event_body(name, data, now_millis()))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        let parsed: SendResponse = read_json(PROVIDER, resp).await?;

        info!("Sent event {} ({} ids)", name, parsed.ids.len());
        Ok(parsed.ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_url() {
        let client = WorkflowClient::new("https://inn.gs/", "key123").unwrap();
        assert_eq!(client.url(), "https://inn.gs/e/key123");
    }

    #[test]
    fn test_event_body() {
        let body = event_body("test/hello.world", json!({ "email": "a@b.c" }), 42);
        assert_eq!(body["name"], "test/hello.world");
        assert_eq!(body["data"]["email"], "a@b.c");
        assert_eq!(body["ts"], 42);
    }

    #[test]
    fn test_parse_ids() {
        let parsed: SendResponse =
            serde_json::from_str(r#"{"ids":["01HXYZ"],"status":200}"#).unwrap();
        assert_eq!(parsed.ids, vec!["01HXYZ"]);
    }

    #[tokio::test]
    async fn test_rejects_blank_name() {
        let client = WorkflowClient::new("http://127.0.0.1:9", "key").unwrap();
        let err = client.send("  ", json!({})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
