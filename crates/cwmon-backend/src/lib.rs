//! Monitoring-backend side of the relay.
//!
//! The [`MetricsBackend`] trait abstracts the host and metric ingestion API.
//! [`reconciler`] binds discovered resources to backend hosts, [`poster`]
//! submits fetched values, and [`graphdefs`] registers the catalog's graph
//! definitions. [`mackerel::MackerelClient`] is the HTTP implementation.

pub mod error;
pub mod graphdefs;
pub mod mackerel;
pub mod poster;
pub mod reconciler;

use cwmon_common::types::MetricValue;
use serde::{Deserialize, Serialize};

/// A host record as returned by a host search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub id: String,
    pub name: String,
    /// Unix seconds; not every backend reports it.
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<i64>,
}

/// Graph definition payload registered with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefPayload {
    /// `custom.<graphKey>`
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub unit: String,
    pub metrics: Vec<GraphDefMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefMetric {
    /// `custom.<graphKey>.<metricName>`
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "isStacked")]
    pub is_stacked: bool,
}

/// Host and metric ingestion API of the monitoring backend.
#[async_trait::async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Hosts whose recorded name equals `name`.
    async fn find_hosts_by_name(&self, name: &str) -> error::Result<Vec<HostSummary>>;

    /// Create a host named `name` and return its id.
    async fn create_host(&self, name: &str) -> error::Result<String>;

    /// Submit a batch of values for one host.
    async fn post_metric_values(&self, host_id: &str, values: &[MetricValue]) -> error::Result<()>;

    /// Register (create or update) graph definitions.
    async fn create_graph_defs(&self, defs: &[GraphDefPayload]) -> error::Result<()>;
}
