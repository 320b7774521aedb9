use crate::error::{BackendError, Result};
use crate::{GraphDefPayload, HostSummary, MetricsBackend};
use async_trait::async_trait;
use cwmon_common::types::MetricValue;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.mackerelio.com";

/// Maximum number of body characters carried into error messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Mackerel REST API client.
pub struct MackerelClient {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Deserialize)]
struct HostsResponse {
    #[serde(default)]
    hosts: Vec<HostSummary>,
}

#[derive(Serialize)]
struct CreateHostRequest<'a> {
    name: &'a str,
    meta: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct CreateHostResponse {
    id: String,
}

#[derive(Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

/// One element of a `/api/v0/tsdb` request.
#[derive(Debug, Serialize, PartialEq)]
struct HostMetricValue<'a> {
    #[serde(rename = "hostId")]
    host_id: &'a str,
    name: &'a str,
    time: i64,
    value: f64,
}

impl MackerelClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        if api_key.is_empty() {
            return Err(BackendError::ConfigError("Mackerel API key is required".to_string()));
        }
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(text) => truncate(&text, MAX_ERROR_BODY_CHARS),
            Err(e) => format!("[Failed to read response body: {}]", e),
        };
        Err(BackendError::HttpError {
            status: status.as_u16(),
            body,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        let response = self
            .client
            .post(self.url(path))
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn expect_success(response: Response, what: &str) -> Result<()> {
        let body: SuccessResponse = response.json().await?;
        if body.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(format!("{} returned success=false", what)))
        }
    }
}

#[async_trait]
impl MetricsBackend for MackerelClient {
    async fn find_hosts_by_name(&self, name: &str) -> Result<Vec<HostSummary>> {
        let url = format!("{}?name={}", self.url("/api/v0/hosts"), urlencoding::encode(name));
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: HostsResponse = response.json().await?;
        Ok(body.hosts)
    }

    async fn create_host(&self, name: &str) -> Result<String> {
        let request = CreateHostRequest {
            name,
            meta: serde_json::Map::new(),
        };
        let response = self.post_json("/api/v0/hosts", &request).await?;
        let body: CreateHostResponse = response.json().await?;
        if body.id.is_empty() {
            return Err(BackendError::Rejected("create host returned an empty id".to_string()));
        }
        Ok(body.id)
    }

    async fn post_metric_values(&self, host_id: &str, values: &[MetricValue]) -> Result<()> {
        let payload = tsdb_payload(host_id, values);
        let response = self.post_json("/api/v0/tsdb", &payload).await?;
        Self::expect_success(response, "tsdb").await
    }

    async fn create_graph_defs(&self, defs: &[GraphDefPayload]) -> Result<()> {
        let response = self.post_json("/api/v0/graph-defs/create", defs).await?;
        Self::expect_success(response, "graph-defs/create").await
    }
}

fn tsdb_payload<'a>(host_id: &'a str, values: &'a [MetricValue]) -> Vec<HostMetricValue<'a>> {
    values
        .iter()
        .map(|v| HostMetricValue {
            host_id,
            name: &v.name,
            time: v.timestamp,
            value: v.value,
        })
        .collect()
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsdb_payload_attaches_host_id() {
        let values = vec![MetricValue {
            name: "custom.elb.requestcount.RequestCount".to_string(),
            value: 57.0,
            timestamp: 1_700_000_000,
        }];
        let payload = serde_json::to_value(tsdb_payload("h-42", &values)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!([{
                "hostId": "h-42",
                "name": "custom.elb.requestcount.RequestCount",
                "time": 1_700_000_000,
                "value": 57.0,
            }])
        );
    }

    #[test]
    fn hosts_response_parses_created_at() {
        let body: HostsResponse = serde_json::from_value(serde_json::json!({
            "hosts": [
                {"id": "h-1", "name": "lb-1.example.com", "createdAt": 1_600_000_000, "status": "working"},
                {"id": "h-2", "name": "lb-1.example.com"}
            ]
        }))
        .unwrap();
        assert_eq!(body.hosts[0].created_at, Some(1_600_000_000));
        assert_eq!(body.hosts[1].created_at, None);
    }

    #[test]
    fn new_requires_api_key() {
        assert!(matches!(
            MackerelClient::new(DEFAULT_BASE_URL, "", 10),
            Err(BackendError::ConfigError(_))
        ));
    }

    #[test]
    fn url_strips_trailing_slash() {
        let client = MackerelClient::new("https://example.test/", "key", 10).unwrap();
        assert_eq!(client.url("/api/v0/tsdb"), "https://example.test/api/v0/tsdb");
    }

    #[test]
    fn truncate_respects_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo", 2), "h...");
    }
}
